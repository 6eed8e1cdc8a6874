//! Single-marker pose from four corners.

use camlab_core::lsq::{central_difference, usable_termination, UNPROJECTABLE_RESIDUAL};
use camlab_core::{homography_from_4pt, CameraCalibration, Pose};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use log::debug;
use nalgebra::{DMatrix, DVector, Dyn, Matrix3, Owned, Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::MarkerDetection;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Marker-to-camera pose; the marker's z axis points towards the camera.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerPose {
    pub id: u32,
    pub pose: Pose,
    /// Corner reprojection RMS, pixels.
    pub rms: f64,
}

/// Corners in the marker frame, in detection order.
pub fn marker_object_points(marker_length: f64) -> [Point3<f64>; 4] {
    let h = 0.5 * marker_length;
    [
        Point3::new(-h, h, 0.0),
        Point3::new(h, h, 0.0),
        Point3::new(h, -h, 0.0),
        Point3::new(-h, -h, 0.0),
    ]
}

struct CornerProblem<'a> {
    calibration: &'a CameraCalibration,
    object: [Point3<f64>; 4],
    image: [Point2<f64>; 4],
    pose: Pose,
}

impl CornerProblem<'_> {
    fn residuals_at(&self, pose: &Pose) -> DVector<f64> {
        let mut r = DVector::zeros(8);
        for (k, (p, q)) in self.object.iter().zip(&self.image).enumerate() {
            let (dx, dy) = match self.calibration.project(pose, p) {
                Some(px) => (px.x - q.x, px.y - q.y),
                None => (UNPROJECTABLE_RESIDUAL, UNPROJECTABLE_RESIDUAL),
            };
            r[2 * k] = dx;
            r[2 * k + 1] = dy;
        }
        r
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for CornerProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.pose = Pose::from_params(x.as_slice());
    }

    fn params(&self) -> DVector<f64> {
        DVector::from_row_slice(&self.pose.to_params())
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.residuals_at(&self.pose))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        central_difference(&self.params(), 1e-7, |x| {
            Some(self.residuals_at(&Pose::from_params(x.as_slice())))
        })
    }
}

fn initial_pose(
    calibration: &CameraCalibration,
    object: &[Point3<f64>; 4],
    image: &[Point2<f64>; 4],
) -> Option<Pose> {
    let mut normalized = [Point2::origin(); 4];
    for (n, px) in normalized.iter_mut().zip(image) {
        *n = calibration.undistort_point(*px)?;
    }
    let plane = object.map(|p| Point2::new(p.x, p.y));
    let h = homography_from_4pt(&plane, &normalized)?;
    Pose::from_homography(&Matrix3::identity(), &h)
}

/// Pose of one square marker of side `marker_length` from its corners.
pub fn estimate_marker_pose(
    corners: &[Point2<f64>; 4],
    marker_length: f64,
    calibration: &CameraCalibration,
) -> Option<(Pose, f64)> {
    let object = marker_object_points(marker_length);
    let pose = initial_pose(calibration, &object, corners)?;
    let problem = CornerProblem {
        calibration,
        object,
        image: *corners,
        pose,
    };
    let (problem, report) = LevenbergMarquardt::new()
        .with_ftol(1e-12)
        .with_xtol(1e-12)
        .with_patience(50)
        .minimize(problem);
    if !usable_termination(&report.termination) || problem.pose.tvec.z <= 0.0 {
        debug!("marker pose rejected: {:?}", report.termination);
        return None;
    }
    let rms = (problem.residuals_at(&problem.pose).norm_squared() / 4.0).sqrt();
    Some((problem.pose, rms))
}

/// Pose for every marker; markers whose pose cannot be solved are skipped.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(markers, calibration), fields(n = markers.len()))
)]
pub fn estimate_pose_single_markers(
    markers: &[MarkerDetection],
    marker_length: f64,
    calibration: &CameraCalibration,
) -> Vec<MarkerPose> {
    markers
        .iter()
        .filter_map(|m| match estimate_marker_pose(&m.corners, marker_length, calibration) {
            Some((pose, rms)) => Some(MarkerPose { id: m.id, pose, rms }),
            None => {
                debug!("no pose for marker {}", m.id);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use camlab_core::{Distortion, Intrinsics};
    use nalgebra::Vector3;

    fn camera(dist: Distortion) -> CameraCalibration {
        CameraCalibration::from_parts(Intrinsics::new(700.0, 700.0, 320.0, 240.0), dist)
    }

    fn detection(calib: &CameraCalibration, truth: &Pose, length: f64) -> MarkerDetection {
        let obj = marker_object_points(length);
        MarkerDetection {
            id: 7,
            corners: obj.map(|p| calib.project(truth, &p).unwrap()),
            hamming: 0,
            rotation: 0,
        }
    }

    #[test]
    fn recovers_synthetic_marker_pose() {
        let calib = camera(Distortion {
            k1: -0.15,
            k2: 0.02,
            ..Default::default()
        });
        let truth = Pose::new(Vector3::new(2.9, 0.2, -0.1), Vector3::new(0.05, -0.03, 0.6));
        let det = detection(&calib, &truth, 0.099);

        let poses = estimate_pose_single_markers(&[det], 0.099, &calib);
        assert_eq!(poses.len(), 1);
        let mp = poses[0];
        assert_eq!(mp.id, 7);
        assert!(mp.rms < 1e-6);
        assert_relative_eq!(mp.pose.tvec, truth.tvec, epsilon = 1e-6);
        let diff = mp.pose.rotation().inverse() * truth.rotation();
        assert!(diff.angle() < 1e-6);
    }

    #[test]
    fn facing_marker_has_z_towards_camera() {
        let calib = camera(Distortion::default());
        // marker x right, y up in the image: rotate 180 degrees about x
        let truth = Pose::new(Vector3::new(std::f64::consts::PI, 0.0, 0.0), Vector3::new(0.0, 0.0, 0.5));
        let det = detection(&calib, &truth, 0.1);
        // top-left corner is up-left of the principal point
        assert!(det.corners[0].x < 320.0 && det.corners[0].y < 240.0);

        let (pose, rms) = estimate_marker_pose(&det.corners, 0.1, &calib).unwrap();
        let z = pose.rotation() * Vector3::z();
        assert!(z.z < -0.999, "z axis {z:?}");
        assert_relative_eq!(pose.tvec, Vector3::new(0.0, 0.0, 0.5), epsilon = 1e-9);
        assert!(rms < 1e-6, "rms {rms}");
    }

    #[test]
    fn marker_centred_on_the_principal_point() {
        let calib = CameraCalibration::from_parts(Intrinsics::new(600.0, 600.0, 240.0, 160.0), Distortion::default());
        let h = 0.5 * 0.099 * 600.0 / 0.5;
        let corners = [
            Point2::new(240.0 - h, 160.0 - h),
            Point2::new(240.0 + h, 160.0 - h),
            Point2::new(240.0 + h, 160.0 + h),
            Point2::new(240.0 - h, 160.0 + h),
        ];

        let (pose, rms) = estimate_marker_pose(&corners, 0.099, &calib).unwrap();
        assert_relative_eq!(pose.tvec, Vector3::new(0.0, 0.0, 0.5), epsilon = 1e-9);
        assert_relative_eq!(pose.rvec.norm(), std::f64::consts::PI, epsilon = 1e-6);
        assert!((pose.rotation() * Vector3::z()).z < -0.999);
        assert!(rms < 1e-6, "rms {rms}");
    }
}
