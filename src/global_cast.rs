//! 全局类型转换
//!
//! nalgebra 类型与 opencv [Mat] 之间的转换，
//! 用于把内参矩阵和旋转平移向量送进 calib3d 接口

use nalgebra::{Matrix3, Vector3};
use opencv::core::{Mat, CV_64F};
use opencv::prelude::*;

#[derive(Debug, Clone, Default)]
pub struct Matrix3d(pub Matrix3<f64>);

/// 将 [Matrix3] 转换为 3x3 [Mat]
impl From<Matrix3d> for Mat {
    fn from(matrix: Matrix3d) -> Self {
        let mut mat = Mat::zeros_nd(&[3, 3], CV_64F).unwrap().to_mat().unwrap();
        for i in 0..3 {
            for j in 0..3 {
                *mat.at_2d_mut::<f64>(i as i32, j as i32).unwrap() = matrix.0[(i, j)];
            }
        }
        mat
    }
}

#[derive(Debug, Clone, Default)]
pub struct Vector3d(pub Vector3<f64>);

/// 将 3x1 [Mat] 转换为 [Vector3]
impl From<Mat> for Vector3d {
    fn from(mat: Mat) -> Self {
        assert!(mat.rows() == 3 && mat.cols() == 1);
        let mut vector = Vector3::<f64>::zeros();
        for i in 0..3 {
            vector[i] = *mat.at_2d::<f64>(i as i32, 0).unwrap();
        }
        Vector3d(vector)
    }
}

/// 将 [Vector3] 转换为 3x1 [Mat]
impl From<Vector3d> for Mat {
    fn from(vector: Vector3d) -> Self {
        let mut mat = Mat::zeros_nd(&[3, 1], CV_64F).unwrap().to_mat().unwrap();
        for i in 0..3 {
            *mat.at_2d_mut::<f64>(i as i32, 0).unwrap() = vector.0[i];
        }
        mat
    }
}

#[test]
fn test_matrix_to_mat() {
    let matrix = Matrix3d(Matrix3::new(640.0, 0.0, 320.0, 0.0, 640.0, 240.0, 0.0, 0.0, 1.0));
    let mat: Mat = matrix.into();
    assert_eq!(*mat.at_2d::<f64>(0, 0).unwrap(), 640.0);
    assert_eq!(*mat.at_2d::<f64>(1, 2).unwrap(), 240.0);
    assert_eq!(*mat.at_2d::<f64>(2, 2).unwrap(), 1.0);
}

#[test]
fn test_vector_round_trip() {
    let vector = Vector3d(Vector3::new(1.0, -2.0, 3.0));
    let mat: Mat = vector.clone().into();
    let back = Vector3d::from(mat);
    assert_eq!(back.0, vector.0);
}
