//! 图像数据集
//!
//! 按文件名顺序枚举目录下的图像
mod image_dir;

pub type DefaultDataset = image_dir::ImageDirDataset;
pub trait DatasetTrait {
    /// 读取图像列表
    /// 返回文件名和完整路径
    fn image_list(&self) -> &Vec<(String, String)>;
}
