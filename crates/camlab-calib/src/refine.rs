//! Joint refinement of intrinsics, distortion and board poses.

use camlab_core::lsq::{central_difference, UNPROJECTABLE_RESIDUAL};
use camlab_core::{Distortion, Intrinsics, Pose};
use levenberg_marquardt::LeastSquaresProblem;
use nalgebra::{DMatrix, DVector, Dyn, Owned, Point2, Point3};

const DIFF_STEP: f64 = 1e-6;

/// `[fx, fy, cx, cy, k1, k2, p1, p2, k3]`
pub(crate) type CameraParams = [f64; 9];

pub(crate) fn pack(intr: &Intrinsics, dist: &Distortion) -> CameraParams {
    [
        intr.fx, intr.fy, intr.cx, intr.cy, dist.k1, dist.k2, dist.p1, dist.p2, dist.k3,
    ]
}

pub(crate) fn unpack(p: &CameraParams) -> (Intrinsics, Distortion) {
    (
        Intrinsics::new(p[0], p[1], p[2], p[3]),
        Distortion {
            k1: p[4],
            k2: p[5],
            p1: p[6],
            p2: p[7],
            k3: p[8],
            ..Default::default()
        },
    )
}

/// Reprojection residuals over all views.
#[derive(Clone)]
pub(crate) struct CalibrationProblem<'a> {
    pub object_points: &'a [Point3<f64>],
    pub image_points: &'a [Vec<Point2<f64>>],
    pub camera: CameraParams,
    /// Indices into `camera` that the solver may change.
    pub free: Vec<usize>,
    pub poses: Vec<Pose>,
}

impl CalibrationProblem<'_> {
    /// Per-view squared reprojection errors, `None` if a point falls behind the camera.
    pub fn view_errors(&self) -> Option<Vec<Vec<f64>>> {
        let (intr, dist) = unpack(&self.camera);
        self.poses
            .iter()
            .zip(self.image_points)
            .map(|(pose, observed)| {
                let rot = pose.rotation();
                self.object_points
                    .iter()
                    .zip(observed)
                    .map(|(p, q)| {
                        let pc = rot.transform_point(p) + pose.tvec;
                        let px = intr.project(&dist, &pc)?;
                        Some((px - *q).norm_squared())
                    })
                    .collect()
            })
            .collect()
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for CalibrationProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        for (k, &idx) in self.free.iter().enumerate() {
            self.camera[idx] = x[k];
        }
        let offset = self.free.len();
        for (v, pose) in self.poses.iter_mut().enumerate() {
            let start = offset + 6 * v;
            *pose = Pose::from_params(&x.as_slice()[start..start + 6]);
        }
    }

    fn params(&self) -> DVector<f64> {
        let camera = self.free.iter().map(|&idx| self.camera[idx]);
        let poses = self.poses.iter().flat_map(|p| p.to_params());
        DVector::from_iterator(self.free.len() + 6 * self.poses.len(), camera.chain(poses))
    }

    /// Points behind the camera get [`UNPROJECTABLE_RESIDUAL`] so the
    /// solver backs off instead of aborting.
    fn residuals(&self) -> Option<DVector<f64>> {
        let (intr, dist) = unpack(&self.camera);
        let n: usize = self.image_points.iter().map(Vec::len).sum();
        let mut out = Vec::with_capacity(2 * n);
        for (pose, observed) in self.poses.iter().zip(self.image_points) {
            let rot = pose.rotation();
            for (p, q) in self.object_points.iter().zip(observed) {
                let pc = rot.transform_point(p) + pose.tvec;
                match intr.project(&dist, &pc) {
                    Some(px) => out.extend([px.x - q.x, px.y - q.y]),
                    None => out.extend([UNPROJECTABLE_RESIDUAL; 2]),
                }
            }
        }
        Some(DVector::from_vec(out))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let mut shifted = self.clone();
        central_difference(&self.params(), DIFF_STEP, |x| {
            shifted.set_params(x);
            shifted.residuals()
        })
    }
}
