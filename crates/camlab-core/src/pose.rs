use nalgebra::{Matrix3, Point3, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::Homography;

/// Rigid transform from an object frame into the camera frame,
/// `X_cam = R(rvec) * X_obj + tvec`. The rotation is a Rodrigues vector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
}

impl Pose {
    pub fn new(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self { rvec, tvec }
    }

    pub fn identity() -> Self {
        Self::new(Vector3::zeros(), Vector3::zeros())
    }

    /// Rodrigues vector through the quaternion, which stays defined at a
    /// half turn where the skew part of `R` vanishes.
    pub fn from_rotation(rotation: &Rotation3<f64>, tvec: Vector3<f64>) -> Self {
        Self::new(UnitQuaternion::from_rotation_matrix(rotation).scaled_axis(), tvec)
    }

    /// Project a near-rotation matrix onto SO(3) (closest in Frobenius norm).
    pub fn from_matrix(r: &Matrix3<f64>, tvec: Vector3<f64>) -> Option<Self> {
        let svd = r.svd(true, true);
        let (u, vt) = (svd.u?, svd.v_t?);
        let mut rot = u * vt;
        if rot.determinant() < 0.0 {
            let mut u = u;
            u.column_mut(2).neg_mut();
            rot = u * vt;
        }
        Some(Self::from_rotation(
            &Rotation3::from_matrix_unchecked(rot),
            tvec,
        ))
    }

    /// Pose of the `z = 0` plane from `H = s K [r1 r2 t]`, with the plane in
    /// front of the camera. `K` may be the identity when `H` maps to
    /// normalized coordinates.
    pub fn from_homography(k: &Matrix3<f64>, h: &Homography) -> Option<Self> {
        let m = k.try_inverse()? * h.h;
        let (c1, c2, c3) = (m.column(0), m.column(1), m.column(2));
        let norm = 0.5 * (c1.norm() + c2.norm());
        if norm < 1e-300 {
            return None;
        }
        let mut scale = 1.0 / norm;
        if c3[2] * scale < 0.0 {
            scale = -scale;
        }
        let r1 = c1 * scale;
        let r2 = c2 * scale;
        let r3 = r1.cross(&r2);
        Self::from_matrix(&Matrix3::from_columns(&[r1, r2, r3]), c3 * scale)
    }

    pub fn rotation(&self) -> Rotation3<f64> {
        Rotation3::new(self.rvec)
    }

    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation().transform_point(p) + self.tvec
    }

    /// Parameter layout used by the solvers: `[rx, ry, rz, tx, ty, tz]`.
    pub fn to_params(&self) -> [f64; 6] {
        [
            self.rvec.x,
            self.rvec.y,
            self.rvec.z,
            self.tvec.x,
            self.tvec.y,
            self.tvec.z,
        ]
    }

    pub fn from_params(p: &[f64]) -> Self {
        Self::new(
            Vector3::new(p[0], p[1], p[2]),
            Vector3::new(p[3], p[4], p[5]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rodrigues_round_trip() {
        let rvec = Vector3::new(0.2, -0.4, 0.1);
        let pose = Pose::new(rvec, Vector3::new(1.0, 2.0, 3.0));
        let back = Pose::from_rotation(&pose.rotation(), pose.tvec);
        assert_relative_eq!(back.rvec, rvec, epsilon = 1e-12);
    }

    #[test]
    fn half_turns_keep_their_axis() {
        let flip_x = Matrix3::from_diagonal(&Vector3::new(1.0, -1.0, -1.0));
        let pose = Pose::from_matrix(&flip_x, Vector3::new(0.0, 0.0, 0.5)).unwrap();
        assert_relative_eq!(pose.rvec.norm(), std::f64::consts::PI, epsilon = 1e-12);
        assert_relative_eq!(pose.rvec.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(pose.rvec.z, 0.0, epsilon = 1e-12);
        assert_relative_eq!(pose.rotation().into_inner(), flip_x, epsilon = 1e-12);

        for axis in [Vector3::new(0.0, 1.0, 0.0), Vector3::new(1.0, 1.0, 0.0).normalize()] {
            let r = Rotation3::new(axis * std::f64::consts::PI);
            let back = Pose::from_rotation(&r, Vector3::zeros());
            assert_relative_eq!(back.rotation(), r, epsilon = 1e-12);
        }
    }

    #[test]
    fn facing_plane_pose_from_homography() {
        // plane x right, y up, seen straight on at z = 2
        let h = Matrix3::new(1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 2.0);
        let pose = Pose::from_homography(&Matrix3::identity(), &Homography::new(h)).unwrap();
        assert_relative_eq!(pose.tvec, Vector3::new(0.0, 0.0, 2.0), epsilon = 1e-12);
        let z = pose.rotation() * Vector3::z();
        assert_relative_eq!(z, Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-12);
    }

    #[test]
    fn orthonormalizes_noisy_rotation() {
        let r = Rotation3::new(Vector3::new(0.0, 0.0, 0.5)).into_inner();
        let noisy = r * 1.05 + Matrix3::from_element(1e-3);
        let pose = Pose::from_matrix(&noisy, Vector3::zeros()).unwrap();
        assert_relative_eq!(pose.rvec, Vector3::new(0.0, 0.0, 0.5), epsilon = 5e-3);
    }

    #[test]
    fn transform_applies_rotation_then_translation() {
        let pose = Pose::new(
            Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2),
            Vector3::new(0.0, 0.0, 1.0),
        );
        let p = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p, Point3::new(0.0, 1.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn plane_pose_from_homography_keeps_plane_in_front() {
        let h = Matrix3::new(1.0, 0.0, 0.1, 0.0, 1.0, 0.2, 0.0, 0.0, 2.0);
        for sign in [1.0, -3.0] {
            let pose = Pose::from_homography(&Matrix3::identity(), &Homography::new(h * sign)).unwrap();
            assert_relative_eq!(pose.rvec, Vector3::zeros(), epsilon = 1e-12);
            assert_relative_eq!(pose.tvec, Vector3::new(0.1, 0.2, 2.0), epsilon = 1e-12);
        }
    }
}
