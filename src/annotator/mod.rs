//! 标注会话
//!
//! 单一事件循环：鼠标回调只往队列里塞点击事件，
//! 主循环在 wait_key 轮询之间排空队列，避免在回调里阻塞等待键盘

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use opencv::core::{Mat, Point, Scalar};
use opencv::highgui;
use opencv::imgcodecs;
use opencv::imgproc;
use opencv::prelude::*;

use crate::annotation::{AnnotationError, AnnotationStore};
use crate::config::*;
use crate::dataset::{DatasetTrait, DefaultDataset};

/// 输入状态：空闲 / 已点下一个点等待标签
#[derive(Debug, Clone, Copy, PartialEq)]
enum InputMode {
    Idle,
    AwaitingLabel { x: i32, y: i32 },
}

#[derive(Debug, Clone, Copy)]
enum Click {
    Left(i32, i32),
    Right,
}

enum SessionAction {
    Continue,
    NextImage,
    Quit,
}

pub struct Annotator {
    dataset: DefaultDataset,
    store: AnnotationStore,
    output: PathBuf,
    clicks: Arc<Mutex<VecDeque<Click>>>,
    mode: InputMode,
}

impl Annotator {
    pub fn new(imgdir: &str) -> anyhow::Result<Self> {
        let dataset = DefaultDataset::new(imgdir)?;
        let image_ids: Vec<String> = dataset
            .image_list()
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        Ok(Self {
            dataset,
            store: AnnotationStore::new(&image_ids),
            output: PathBuf::from(imgdir).join(ANNOTATION_FILE),
            clicks: Arc::new(Mutex::new(VecDeque::new())),
            mode: InputMode::Idle,
        })
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        highgui::named_window(WINDOW_NAME, highgui::WINDOW_NORMAL)?;
        highgui::resize_window(WINDOW_NAME, WINDOW_WIDTH, WINDOW_HEIGHT)?;

        let clicks = self.clicks.clone();
        highgui::set_mouse_callback(
            WINDOW_NAME,
            Some(Box::new(move |event, x, y, _flags| {
                let mut clicks = clicks.lock().unwrap();
                if event == highgui::EVENT_LBUTTONDOWN {
                    clicks.push_back(Click::Left(x, y));
                } else if event == highgui::EVENT_RBUTTONDOWN {
                    clicks.push_back(Click::Right);
                }
            })),
        )?;

        let images = self.dataset.image_list().clone();
        'session: for (name, path) in &images {
            let orig = match imgcodecs::imread(path, imgcodecs::IMREAD_COLOR) {
                Ok(img) if !img.empty() => img,
                _ => {
                    // 读不出来的图像跳过，输出文件里保留 null
                    log::warn!("skip unreadable image {}", name);
                    continue;
                }
            };
            log::info!("annotating {} (space/enter to confirm, q to quit)", name);

            self.mode = InputMode::Idle;
            self.clicks.lock().unwrap().clear();
            self.redraw(&orig)?;

            loop {
                let key = highgui::wait_key(POLL_INTERVAL_MS)?;
                match self.handle_key(key, &orig)? {
                    SessionAction::Continue => {}
                    SessionAction::NextImage => {
                        self.store.finalize_image(name);
                        break;
                    }
                    SessionAction::Quit => {
                        // 退出时保留已确认的图像，剩下的保持未标注
                        log::info!("quit, saving finalized annotations");
                        break 'session;
                    }
                }
                self.drain_clicks(&orig)?;
            }
        }

        // 先收掉窗口，导出失败时也不会留下挂着的GUI
        highgui::destroy_all_windows()?;
        self.store.export(&self.output)?;
        log::info!("annotations saved to {:?}", self.output);
        Ok(())
    }

    fn handle_key(&mut self, key: i32, orig: &Mat) -> anyhow::Result<SessionAction> {
        if key < 0 {
            return Ok(SessionAction::Continue);
        }
        let key = (key & 0xff) as u8;
        match key {
            b'q' => Ok(SessionAction::Quit),
            b' ' | b'\r' | b'\n' => Ok(SessionAction::NextImage),
            b'0'..=b'9' => {
                if let InputMode::AwaitingLabel { x, y } = self.mode {
                    match self.store.add_point(x as f64, y as f64, key - b'0') {
                        Ok(()) => self.mode = InputMode::Idle,
                        // 重复标签拒绝输入，继续等待下一个数字键
                        Err(AnnotationError::DuplicateLabel(label)) => {
                            log::warn!("label {} already used, pick another", label);
                        }
                        Err(e) => log::warn!("{}", e),
                    }
                    self.redraw(orig)?;
                }
                Ok(SessionAction::Continue)
            }
            _ => Ok(SessionAction::Continue),
        }
    }

    fn drain_clicks(&mut self, orig: &Mat) -> anyhow::Result<()> {
        loop {
            let click = self.clicks.lock().unwrap().pop_front();
            let Some(click) = click else { break };
            match click {
                Click::Left(x, y) => {
                    // 已在等待标签时，左键重新定位待定点
                    self.mode = InputMode::AwaitingLabel { x, y };
                }
                Click::Right => {
                    if self.mode == InputMode::Idle {
                        self.store.remove_last();
                    } else {
                        self.mode = InputMode::Idle;
                    }
                }
            }
            self.redraw(orig)?;
        }
        Ok(())
    }

    /// 每次变更后从存储重画所有标注
    fn redraw(&self, orig: &Mat) -> anyhow::Result<()> {
        let mut img = orig.clone();
        for point in self.store.working_set() {
            Self::draw_marker(&mut img, point.x as i32, point.y as i32, Some(point.label))?;
        }
        if let InputMode::AwaitingLabel { x, y } = self.mode {
            Self::draw_marker(&mut img, x, y, None)?;
            imgproc::put_text(
                &mut img,
                "Enter number:",
                Point::new(500, 500),
                imgproc::FONT_HERSHEY_SIMPLEX,
                LABEL_FONT_SCALE,
                Scalar::new(0.0, 0.0, 255.0, 0.0),
                LABEL_THICKNESS,
                imgproc::LINE_8,
                false,
            )?;
        }
        highgui::imshow(WINDOW_NAME, &img)?;
        Ok(())
    }

    fn draw_marker(img: &mut Mat, x: i32, y: i32, label: Option<u8>) -> anyhow::Result<()> {
        let white = Scalar::new(255.0, 255.0, 255.0, 0.0);
        imgproc::circle(img, Point::new(x, y), MARKER_RADIUS, white, -1, imgproc::LINE_8, 0)?;
        if let Some(label) = label {
            imgproc::put_text(
                img,
                &label.to_string(),
                Point::new(x, y),
                imgproc::FONT_HERSHEY_SIMPLEX,
                LABEL_FONT_SCALE,
                white,
                LABEL_THICKNESS,
                imgproc::LINE_8,
                false,
            )?;
        }
        Ok(())
    }
}
