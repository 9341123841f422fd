/// 标注窗口
pub const WINDOW_NAME: &str = "annotate";
pub const WINDOW_WIDTH: i32 = 800;
pub const WINDOW_HEIGHT: i32 = 600;

/// 标注点的显示参数
pub const MARKER_RADIUS: i32 = 7;
pub const LABEL_FONT_SCALE: f64 = 5.0;
pub const LABEL_THICKNESS: i32 = 10;

/// 接受的图像格式
pub const IMAGE_EXTENSIONS: [&str; 2] = ["jpg", "png"];

/// 标注文件，保存在图像目录下
pub const ANNOTATION_FILE: &str = "annotations.json";

/// 默认的3D参考形状
pub const DEFAULT_SHAPE: &str = "cube";

/// 单个数字标签 0-9，每张图最多10个点
pub const MAX_LABEL: u8 = 9;

/// SQPnP 需要的最少对应点数
pub const MIN_PNP_POINTS: usize = 4;

/// 事件轮询周期 (ms)
pub const POLL_INTERVAL_MS: i32 = 20;
