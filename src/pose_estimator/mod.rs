//! 位姿估计
//! 通过标注的2D点和3D参考形状求解每张图的相机位姿

mod correspondence;

pub use correspondence::build_correspondences;

use std::path::Path;

use opencv::calib3d;
use opencv::core::{Mat, Point2d, Point3d, Vector, CV_64F};
use opencv::prelude::*;
use thiserror::Error;

use crate::annotation::AnnotationCollection;
use crate::config::{ANNOTATION_FILE, DEFAULT_SHAPE, MIN_PNP_POINTS};
use crate::dataset::{DatasetTrait, DefaultDataset};
use crate::global_cast::{Matrix3d, Vector3d};
use crate::shape::{Shape3D, ShapeLibrary};

#[derive(Debug, Error, PartialEq)]
pub enum SolveError {
    /// 标注的标签在参考形状里没有对应的3D点
    #[error("annotated label {0} has no 3D point in the reference shape")]
    MissingCorrespondence(u8),
    #[error("PnP needs at least {required} correspondences, got {actual}")]
    InsufficientCorrespondences { required: usize, actual: usize },
    #[error("mismatched correspondence arrays: {points2d} 2D vs {points3d} 3D")]
    MismatchedLengths { points2d: usize, points3d: usize },
}

/// 由图像尺寸估计的内参：焦距取图像宽度，主点取图像中心。
/// 这是一个近似，不是标定结果。
#[derive(Debug, Clone, Default)]
pub struct CameraIntrinsics {
    pub matrix: nalgebra::Matrix3<f64>,
}

impl CameraIntrinsics {
    pub fn from_image_size(width: i32, height: i32) -> Self {
        let w = width as f64;
        let h = height as f64;
        let matrix = nalgebra::Matrix3::new(
            w, 0.0, w / 2.0, //
            0.0, w, h / 2.0, //
            0.0, 0.0, 1.0,
        );
        Self { matrix }
    }

    pub fn to_mat(&self) -> Mat {
        Matrix3d(self.matrix).into()
    }
}

/// 单张图的求解结果，旋转为 Rodrigues 向量
#[derive(Debug, Clone, Default)]
pub struct PoseResult {
    pub success: bool,
    pub rvec: nalgebra::Vector3<f64>,
    pub tvec: nalgebra::Vector3<f64>,
}

/// SQPnP 求解，零畸变。
/// 数值求解失败时返回 success=false，不报错。
pub fn solve(
    points2d: &Vector<Point2d>,
    points3d: &Vector<Point3d>,
    intrinsics: &CameraIntrinsics,
) -> Result<PoseResult, SolveError> {
    if points2d.len() != points3d.len() {
        return Err(SolveError::MismatchedLengths {
            points2d: points2d.len(),
            points3d: points3d.len(),
        });
    }
    if points2d.len() < MIN_PNP_POINTS {
        return Err(SolveError::InsufficientCorrespondences {
            required: MIN_PNP_POINTS,
            actual: points2d.len(),
        });
    }

    let k = intrinsics.to_mat();
    // 不建模镜头畸变
    let d = Mat::zeros(4, 1, CV_64F).unwrap().to_mat().unwrap();
    let mut rvec = Mat::default();
    let mut tvec = Mat::default();

    let solved = calib3d::solve_pnp(
        points3d,
        points2d,
        &k,
        &d,
        &mut rvec,
        &mut tvec,
        false,
        calib3d::SOLVEPNP_SQPNP,
    );

    match solved {
        Ok(true) => Ok(PoseResult {
            success: true,
            rvec: Vector3d::from(rvec).0,
            tvec: Vector3d::from(tvec).0,
        }),
        Ok(false) => Ok(PoseResult::default()),
        Err(e) => {
            // 退化输入（如共线的3D点）由 success=false 上报
            log::warn!("solve_pnp failed: {}", e);
            Ok(PoseResult::default())
        }
    }
}

/// 每张图的批处理结果
#[derive(Debug)]
pub enum BatchOutcome {
    Solved(PoseResult),
    Skipped(String),
}

/// 按图像枚举顺序逐张求解，单张失败不影响其他图
#[derive(Debug)]
pub struct PnpBatch {
    dataset: DefaultDataset,
    annotations: AnnotationCollection,
    shape: Shape3D,
    intrinsics: CameraIntrinsics,
}

impl PnpBatch {
    pub fn new(imgdir: &str, shapedir: &str) -> anyhow::Result<Self> {
        let dataset = DefaultDataset::new(imgdir)?;
        let intrinsics = Self::intrinsics_from_first_image(&dataset)?;

        let annotation_path = Path::new(imgdir).join(ANNOTATION_FILE);
        let annotations = AnnotationCollection::load(&annotation_path)?;

        // 参考形状在构造时解析好
        let shape = ShapeLibrary::load_dir(shapedir)?
            .get(DEFAULT_SHAPE)
            .cloned()
            .ok_or_else(|| {
                anyhow::anyhow!("reference shape {:?} not found in {:?}", DEFAULT_SHAPE, shapedir)
            })?;

        Ok(Self {
            dataset,
            annotations,
            shape,
            intrinsics,
        })
    }

    /// 用第一张能读取的图像确定内参，读不出来的跳过并告警
    fn intrinsics_from_first_image(dataset: &DefaultDataset) -> anyhow::Result<CameraIntrinsics> {
        for (name, path) in dataset.image_list() {
            match opencv::imgcodecs::imread(path, opencv::imgcodecs::IMREAD_COLOR) {
                Ok(img) if !img.empty() => {
                    return Ok(CameraIntrinsics::from_image_size(img.cols(), img.rows()));
                }
                _ => log::warn!("skip unreadable image {}", name),
            }
        }
        anyhow::bail!("no readable image found, cannot derive camera intrinsics")
    }

    pub fn run(&self) -> Vec<(String, BatchOutcome)> {
        let mut outcomes = vec![];
        for (name, _path) in self.dataset.image_list() {
            log::info!("running PnP for image {} ...", name);

            let set = match self.annotations.get(name) {
                Some(set) => set,
                None => {
                    log::warn!("{}: not annotated, skipped", name);
                    outcomes.push((name.clone(), BatchOutcome::Skipped("not annotated".into())));
                    continue;
                }
            };

            let outcome = match build_correspondences(set, &self.shape) {
                Ok((points2d, points3d)) => match solve(&points2d, &points3d, &self.intrinsics) {
                    Ok(result) => {
                        log::info!(
                            "{}: success: {}, rot: {:?}, trans: {:?}",
                            name,
                            result.success,
                            result.rvec.as_slice(),
                            result.tvec.as_slice()
                        );
                        BatchOutcome::Solved(result)
                    }
                    Err(e) => {
                        log::warn!("{}: {}", name, e);
                        BatchOutcome::Skipped(e.to_string())
                    }
                },
                Err(e) => {
                    log::warn!("{}: {}", name, e);
                    BatchOutcome::Skipped(e.to_string())
                }
            };
            outcomes.push((name.clone(), outcome));
        }
        outcomes
    }

    /// 最终汇总，方便重新标注失败的图像
    pub fn print_summary(outcomes: &[(String, BatchOutcome)]) {
        let solved = outcomes
            .iter()
            .filter(|(_, o)| matches!(o, BatchOutcome::Solved(r) if r.success))
            .count();
        log::info!("solved {}/{} images", solved, outcomes.len());
        for (name, outcome) in outcomes {
            match outcome {
                BatchOutcome::Solved(result) if result.success => {
                    log::info!("  {}: ok", name);
                }
                BatchOutcome::Solved(_) => {
                    log::info!("  {}: solver did not converge", name);
                }
                BatchOutcome::Skipped(reason) => {
                    log::info!("  {}: skipped ({})", name, reason);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intrinsics_640x480() {
        let k = CameraIntrinsics::from_image_size(640, 480).matrix;
        let expected = nalgebra::Matrix3::new(
            640.0, 0.0, 320.0, //
            0.0, 640.0, 240.0, //
            0.0, 0.0, 1.0,
        );
        assert_eq!(k, expected);
    }

    #[test]
    fn test_too_few_points() {
        let points2d: Vector<Point2d> = [(10.0, 20.0), (30.0, 40.0), (50.0, 60.0)]
            .iter()
            .map(|&(x, y)| Point2d::new(x, y))
            .collect();
        let points3d: Vector<Point3d> = [(0.0, 0.0, 0.0), (1.0, 0.0, 0.0), (1.0, 1.0, 0.0)]
            .iter()
            .map(|&(x, y, z)| Point3d::new(x, y, z))
            .collect();

        let err = solve(&points2d, &points3d, &CameraIntrinsics::from_image_size(640, 480))
            .unwrap_err();
        assert_eq!(
            err,
            SolveError::InsufficientCorrespondences { required: 4, actual: 3 }
        );
    }

    #[test]
    fn test_mismatched_lengths() {
        let points2d: Vector<Point2d> = (0..5).map(|i| Point2d::new(i as f64, 0.0)).collect();
        let points3d: Vector<Point3d> =
            (0..4).map(|i| Point3d::new(i as f64, 0.0, 0.0)).collect();

        let err = solve(&points2d, &points3d, &CameraIntrinsics::from_image_size(640, 480))
            .unwrap_err();
        assert_eq!(err, SolveError::MismatchedLengths { points2d: 5, points3d: 4 });
    }

    const CUBE_CORNERS: [(f64, f64, f64); 8] = [
        (0.0, 0.0, 0.0),
        (1.0, 0.0, 0.0),
        (1.0, 1.0, 0.0),
        (0.0, 1.0, 0.0),
        (0.0, 0.0, 1.0),
        (1.0, 0.0, 1.0),
        (1.0, 1.0, 1.0),
        (0.0, 1.0, 1.0),
    ];

    /// 单张图失败不中断批处理：
    /// 读不出来的图像跳过，缺3D对应点的图像跳过，正常的图像照常求解
    #[test]
    fn test_batch_continues_past_failures() {
        use opencv::core::{Scalar, CV_8UC3};

        use crate::annotation::LabeledPoint;

        let dir = std::env::temp_dir().join("pnp_rs_batch_test");
        let imgdir = dir.join("images");
        let shapedir = dir.join("shapes");
        std::fs::create_dir_all(&imgdir).unwrap();
        std::fs::create_dir_all(&shapedir).unwrap();

        // 排在最前的文件不是图像，内参应该由下一张图提供
        std::fs::write(imgdir.join("0_bad.jpg"), b"not an image").unwrap();
        let blank =
            Mat::new_rows_cols_with_default(480, 640, CV_8UC3, Scalar::all(0.0)).unwrap();
        let params = Vector::<i32>::new();
        for name in ["a.jpg", "b.jpg"] {
            opencv::imgcodecs::imwrite(imgdir.join(name).to_str().unwrap(), &blank, &params)
                .unwrap();
        }

        let mut cube = serde_json::Map::new();
        for (label, &(x, y, z)) in CUBE_CORNERS.iter().enumerate() {
            cube.insert(label.to_string(), serde_json::json!([x, y, z]));
        }
        std::fs::write(
            shapedir.join(format!("{}.json", DEFAULT_SHAPE)),
            serde_json::Value::Object(cube).to_string(),
        )
        .unwrap();

        // a.jpg：已知位姿投影的角点，可求解
        let k = CameraIntrinsics::from_image_size(640, 480).matrix;
        let good: Vec<LabeledPoint> = CUBE_CORNERS
            .iter()
            .enumerate()
            .map(|(label, &(x, y, z))| LabeledPoint {
                x: k[(0, 0)] * x / (z + 5.0) + k[(0, 2)],
                y: k[(1, 1)] * y / (z + 5.0) + k[(1, 2)],
                label: label as u8,
            })
            .collect();
        // b.jpg：标签9在参考形状里不存在
        let bad = vec![
            LabeledPoint { x: 1.0, y: 2.0, label: 9 },
            LabeledPoint { x: 3.0, y: 4.0, label: 0 },
            LabeledPoint { x: 5.0, y: 6.0, label: 1 },
            LabeledPoint { x: 7.0, y: 8.0, label: 2 },
        ];

        let mut collection = AnnotationCollection::default();
        collection.pre_register("0_bad.jpg");
        collection.set("a.jpg", good);
        collection.set("b.jpg", bad);
        collection.save(&imgdir.join(ANNOTATION_FILE)).unwrap();

        let batch =
            PnpBatch::new(imgdir.to_str().unwrap(), shapedir.to_str().unwrap()).unwrap();
        let outcomes = batch.run();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].0, "0_bad.jpg");
        assert!(
            matches!(&outcomes[0].1, BatchOutcome::Skipped(r) if r.contains("not annotated"))
        );
        assert!(matches!(&outcomes[1].1, BatchOutcome::Solved(r) if r.success));
        assert!(
            matches!(&outcomes[2].1, BatchOutcome::Skipped(r) if r.contains("no 3D point"))
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_default_shape() {
        use opencv::core::{Scalar, CV_8UC3};

        let dir = std::env::temp_dir().join("pnp_rs_no_shape_test");
        let imgdir = dir.join("images");
        let shapedir = dir.join("shapes");
        std::fs::create_dir_all(&imgdir).unwrap();
        std::fs::create_dir_all(&shapedir).unwrap();

        let blank =
            Mat::new_rows_cols_with_default(480, 640, CV_8UC3, Scalar::all(0.0)).unwrap();
        opencv::imgcodecs::imwrite(
            imgdir.join("a.jpg").to_str().unwrap(),
            &blank,
            &Vector::<i32>::new(),
        )
        .unwrap();

        let mut collection = AnnotationCollection::default();
        collection.pre_register("a.jpg");
        collection.save(&imgdir.join(ANNOTATION_FILE)).unwrap();
        std::fs::write(shapedir.join("pyramid.json"), r#"{"0": [0, 0, 0]}"#).unwrap();

        let err = PnpBatch::new(imgdir.to_str().unwrap(), shapedir.to_str().unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("reference shape"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    /// 已知位姿投影单位立方体的8个角点，再用求解结果反投影，
    /// 重投影误差应小于1个像素
    #[test]
    fn test_solve_recovers_known_pose() {
        let intrinsics = CameraIntrinsics::from_image_size(640, 480);
        let k = intrinsics.matrix;

        let corners = CUBE_CORNERS;
        let rotation = nalgebra::Rotation3::from_euler_angles(0.1, -0.2, 0.05);
        let translation = nalgebra::Vector3::new(-0.4, 0.3, 5.0);

        let project = |r: &nalgebra::Rotation3<f64>,
                       t: &nalgebra::Vector3<f64>,
                       p: &nalgebra::Vector3<f64>| {
            let cam = r * p + t;
            let u = k[(0, 0)] * cam.x / cam.z + k[(0, 2)];
            let v = k[(1, 1)] * cam.y / cam.z + k[(1, 2)];
            (u, v)
        };

        let mut points2d: Vector<Point2d> = Vector::new();
        let mut points3d: Vector<Point3d> = Vector::new();
        for &(x, y, z) in &corners {
            let p = nalgebra::Vector3::new(x, y, z);
            let (u, v) = project(&rotation, &translation, &p);
            points2d.push(Point2d::new(u, v));
            points3d.push(Point3d::new(x, y, z));
        }

        let result = solve(&points2d, &points3d, &intrinsics).unwrap();
        assert!(result.success);

        let recovered = nalgebra::Rotation3::new(result.rvec);
        for (i, &(x, y, z)) in corners.iter().enumerate() {
            let p = nalgebra::Vector3::new(x, y, z);
            let (u, v) = project(&recovered, &result.tvec, &p);
            let expected = points2d.get(i).unwrap();
            let err = ((u - expected.x).powi(2) + (v - expected.y).powi(2)).sqrt();
            assert!(err < 1.0, "reprojection error {} px at corner {}", err, i);
        }
    }
}
