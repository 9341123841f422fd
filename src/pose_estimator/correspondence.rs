//! 2D-3D对应点配对
//!
//! 标注点按标签升序排序后，在参考形状里查找同标签的3D点，
//! 输出两个下标对齐的点列表

use opencv::core::{Point2d, Point3d, Vector};

use super::SolveError;
use crate::annotation::AnnotationSet;
use crate::shape::Shape3D;

pub fn build_correspondences(
    set: &AnnotationSet,
    shape: &Shape3D,
) -> Result<(Vector<Point2d>, Vector<Point3d>), SolveError> {
    let mut sorted = set.clone();
    // 标签在一张图内唯一，排序是确定的
    sorted.sort_by_key(|p| p.label);

    let mut points2d: Vector<Point2d> = Vector::new();
    let mut points3d: Vector<Point3d> = Vector::new();
    for point in &sorted {
        // 缺少3D对应点必须上报，不能静默跳过
        let [x, y, z] = shape
            .point(point.label)
            .ok_or(SolveError::MissingCorrespondence(point.label))?;
        points2d.push(Point2d::new(point.x, point.y));
        points3d.push(Point3d::new(x, y, z));
    }
    Ok((points2d, points3d))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use opencv::prelude::VectorToVec;

    use super::*;
    use crate::annotation::LabeledPoint;

    fn unit_square_shape() -> Shape3D {
        let mut map = HashMap::new();
        map.insert("0".to_string(), [0.0, 0.0, 0.0]);
        map.insert("1".to_string(), [1.0, 0.0, 0.0]);
        map.insert("2".to_string(), [1.0, 1.0, 0.0]);
        map.insert("3".to_string(), [0.0, 1.0, 0.0]);
        Shape3D(map)
    }

    fn point(x: f64, y: f64, label: u8) -> LabeledPoint {
        LabeledPoint { x, y, label }
    }

    #[test]
    fn test_aligned_by_label() {
        // 乱序标注，输出按标签升序
        let set = vec![
            point(50.0, 60.0, 2),
            point(10.0, 20.0, 0),
            point(70.0, 80.0, 3),
            point(30.0, 40.0, 1),
        ];
        let (points2d, points3d) = build_correspondences(&set, &unit_square_shape()).unwrap();

        assert_eq!(points2d.len(), points3d.len());
        let expected2d = [(10.0, 20.0), (30.0, 40.0), (50.0, 60.0), (70.0, 80.0)];
        let expected3d = [
            (0.0, 0.0, 0.0),
            (1.0, 0.0, 0.0),
            (1.0, 1.0, 0.0),
            (0.0, 1.0, 0.0),
        ];
        for i in 0..4 {
            let p2 = points2d.get(i).unwrap();
            let p3 = points3d.get(i).unwrap();
            assert_eq!((p2.x, p2.y), expected2d[i]);
            assert_eq!((p3.x, p3.y, p3.z), expected3d[i]);
        }
    }

    #[test]
    fn test_sort_idempotent() {
        let set = vec![point(10.0, 20.0, 0), point(30.0, 40.0, 1), point(50.0, 60.0, 2)];
        let (first2d, _) = build_correspondences(&set, &unit_square_shape()).unwrap();
        let (second2d, _) = build_correspondences(&set, &unit_square_shape()).unwrap();
        assert_eq!(first2d.to_vec(), second2d.to_vec());
    }

    #[test]
    fn test_missing_3d_point() {
        let set = vec![point(10.0, 20.0, 0), point(30.0, 40.0, 5)];
        let err = build_correspondences(&set, &unit_square_shape()).unwrap_err();
        assert_eq!(err, SolveError::MissingCorrespondence(5));
    }
}
