//! Pinhole camera with the 8-coefficient rational distortion model.

use nalgebra::{DVector, Matrix3, Point2, Point3, Vector2};
use serde::{Deserialize, Serialize};

use crate::Pose;

/// Focal lengths and principal point in pixels (zero skew).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`.
    pub fn to_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// Read fx, fy, cx, cy from a camera matrix; skew is ignored.
    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)])
    }

    /// Pixel position of a camera-frame point; `None` behind the camera.
    #[inline]
    pub fn project(&self, distortion: &Distortion, pc: &Point3<f64>) -> Option<Point2<f64>> {
        if pc.z <= 1e-12 {
            return None;
        }
        let d = distortion.distort(Vector2::new(pc.x / pc.z, pc.y / pc.z));
        Some(Point2::new(self.fx * d.x + self.cx, self.fy * d.y + self.cy))
    }
}

/// Lens distortion in OpenCV order `[k1, k2, p1, p2, k3, k4, k5, k6]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
    pub k4: f64,
    pub k5: f64,
    pub k6: f64,
}

impl Distortion {
    pub const LEN: usize = 8;

    /// Missing trailing coefficients are zero; extra ones are ignored.
    pub fn from_coeffs(c: &[f64]) -> Self {
        let at = |i: usize| c.get(i).copied().unwrap_or(0.0);
        Self {
            k1: at(0),
            k2: at(1),
            p1: at(2),
            p2: at(3),
            k3: at(4),
            k4: at(5),
            k5: at(6),
            k6: at(7),
        }
    }

    pub fn to_coeffs(&self) -> [f64; 8] {
        [
            self.k1, self.k2, self.p1, self.p2, self.k3, self.k4, self.k5, self.k6,
        ]
    }

    pub fn is_zero(&self) -> bool {
        self.to_coeffs().iter().all(|&c| c == 0.0)
    }

    /// Apply distortion to a normalized image point.
    pub fn distort(&self, p: Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = (1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6)
            / (1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6);
        let xy = x * y;
        Vector2::new(
            x * radial + 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x * x),
            y * radial + self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * xy,
        )
    }

    /// Invert [`Distortion::distort`] by fixed-point iteration.
    pub fn undistort(&self, distorted: Vector2<f64>) -> Vector2<f64> {
        if self.is_zero() {
            return distorted;
        }
        let (x0, y0) = (distorted.x, distorted.y);
        let (mut x, mut y) = (x0, y0);
        for _ in 0..20 {
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            let r6 = r4 * r2;
            let icdist = (1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6)
                / (1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6);
            if !icdist.is_finite() || icdist < 0.0 {
                return distorted;
            }
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            x = (x0 - dx) * icdist;
            y = (y0 - dy) * icdist;
        }
        Vector2::new(x, y)
    }
}

/// Camera matrix plus distortion vector, the unit persisted by the
/// calibration store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    pub camera_matrix: Matrix3<f64>,
    pub distortion: DVector<f64>,
}

impl Default for CameraCalibration {
    /// Identity matrix and eight zero coefficients: the "not calibrated yet" state.
    fn default() -> Self {
        Self {
            camera_matrix: Matrix3::identity(),
            distortion: DVector::zeros(Distortion::LEN),
        }
    }
}

impl CameraCalibration {
    pub fn new(camera_matrix: Matrix3<f64>, distortion: DVector<f64>) -> Self {
        Self {
            camera_matrix,
            distortion,
        }
    }

    pub fn from_parts(intrinsics: Intrinsics, distortion: Distortion) -> Self {
        Self::new(
            intrinsics.to_matrix(),
            DVector::from_row_slice(&distortion.to_coeffs()),
        )
    }

    pub fn intrinsics(&self) -> Intrinsics {
        Intrinsics::from_matrix(&self.camera_matrix)
    }

    pub fn distortion_model(&self) -> Distortion {
        Distortion::from_coeffs(self.distortion.as_slice())
    }

    /// Project a point given in the object frame of `pose`.
    /// `None` for points on or behind the image plane.
    pub fn project(&self, pose: &Pose, p: &Point3<f64>) -> Option<Point2<f64>> {
        let pc = pose.transform_point(p);
        if pc.z <= 1e-12 {
            return None;
        }
        let d = self
            .distortion_model()
            .distort(Vector2::new(pc.x / pc.z, pc.y / pc.z));
        let k = &self.camera_matrix;
        let u = k[(0, 0)] * d.x + k[(0, 1)] * d.y + k[(0, 2)];
        let v = k[(1, 1)] * d.y + k[(1, 2)];
        Some(Point2::new(u, v))
    }

    /// Pixel to undistorted normalized coordinates.
    pub fn undistort_point(&self, px: Point2<f64>) -> Option<Point2<f64>> {
        let k = &self.camera_matrix;
        let (fx, fy) = (k[(0, 0)], k[(1, 1)]);
        if fx.abs() < 1e-12 || fy.abs() < 1e-12 {
            return None;
        }
        let y = (px.y - k[(1, 2)]) / fy;
        let x = (px.x - k[(0, 2)] - k[(0, 1)] * y) / fx;
        let n = self.distortion_model().undistort(Vector2::new(x, y));
        Some(Point2::new(n.x, n.y))
    }
}
