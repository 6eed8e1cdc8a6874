//! Planar camera calibration from chessboard views, and the calibration file.
//!
//! [`calibrate_camera`] takes the ordered inner corners of at least three
//! views of a [`BoardSpec`] and returns the camera matrix, distortion
//! coefficients `[k1, k2, p1, p2, k3, 0, 0, 0]` and per-view board poses.
//! The solve is Zhang's closed form from per-view homographies (zero skew),
//! followed by Levenberg-Marquardt over the reprojection error.
//!
//! [`store`] reads and writes the plain-text calibration file.

mod board;
mod refine;
pub mod store;
mod zhang;

pub use board::BoardSpec;
pub use store::{load, save, save_calibration, StoreError};

use camlab_chessboard::ChessboardFinder;
use camlab_core::lsq::usable_termination;
use camlab_core::{estimate_homography, CameraCalibration, Distortion, Intrinsics, Pose};
use image::GrayImage;
use levenberg_marquardt::{LevenbergMarquardt, TerminationReason};
use log::{debug, info, warn};
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::refine::{pack, unpack, CalibrationProblem};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Views needed for the closed-form solve.
pub const MIN_VIEWS: usize = 3;

const SOLVER_TOL: f64 = 1e-12;

#[derive(thiserror::Error, Debug)]
pub enum CalibError {
    #[error("need at least {needed} views with a detected board, got {got}")]
    NotEnoughViews { got: usize, needed: usize },

    #[error("view {view} has {got} corners, board has {expected}")]
    MismatchedPoints {
        view: usize,
        expected: usize,
        got: usize,
    },

    #[error("degenerate calibration input ({0})")]
    Degenerate(&'static str),

    #[error("refinement failed: {0:?}")]
    Optimization(TerminationReason),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOptions {
    /// Refine p1, p2; otherwise they stay zero.
    pub estimate_tangential: bool,
    /// Refine k3; otherwise it stays zero.
    pub estimate_k3: bool,
    /// Solver budget: at most `patience * (parameters + 1)` residual evaluations.
    pub patience: usize,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            estimate_tangential: true,
            estimate_k3: true,
            patience: 100,
        }
    }
}

impl CalibrationOptions {
    fn free_params(&self) -> Vec<usize> {
        let mut free = vec![0, 1, 2, 3, 4, 5];
        if self.estimate_tangential {
            free.extend([6, 7]);
        }
        if self.estimate_k3 {
            free.push(8);
        }
        free
    }
}

#[derive(Clone, Debug)]
pub struct CalibrationResult {
    pub calibration: CameraCalibration,
    pub intrinsics: Intrinsics,
    pub distortion: Distortion,
    /// RMS reprojection error over all corners, pixels.
    pub rms_error: f64,
    pub per_view_rms: Vec<f64>,
    /// Board-to-camera pose per view.
    pub poses: Vec<Pose>,
}

fn rms(sq: &[f64]) -> f64 {
    if sq.is_empty() {
        return 0.0;
    }
    (sq.iter().sum::<f64>() / sq.len() as f64).sqrt()
}

/// Calibrate from ordered corner lists, one per view, in the row-major
/// order of [`BoardSpec::object_points`].
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(board, views, options), fields(views = views.len()))
)]
pub fn calibrate_camera(
    board: &BoardSpec,
    views: &[Vec<Point2<f32>>],
    options: &CalibrationOptions,
) -> Result<CalibrationResult, CalibError> {
    if views.len() < MIN_VIEWS {
        return Err(CalibError::NotEnoughViews {
            got: views.len(),
            needed: MIN_VIEWS,
        });
    }
    let expected = board.corner_count();
    if expected < 4 {
        return Err(CalibError::Degenerate("board has fewer than 4 corners"));
    }

    let object_points: Vec<Point3<f64>> = board.object_points();
    let plane: Vec<Point2<f64>> = object_points.iter().map(|p| Point2::new(p.x, p.y)).collect();

    let mut image_points = Vec::with_capacity(views.len());
    let mut homographies = Vec::with_capacity(views.len());
    for (view, corners) in views.iter().enumerate() {
        if corners.len() != expected {
            return Err(CalibError::MismatchedPoints {
                view,
                expected,
                got: corners.len(),
            });
        }
        let img: Vec<Point2<f64>> = corners.iter().map(|p| p.cast::<f64>()).collect();
        let h = estimate_homography(&plane, &img).ok_or(CalibError::Degenerate("view homography"))?;
        homographies.push(h);
        image_points.push(img);
    }

    let intr = zhang::intrinsics_from_homographies(&homographies, &image_points)?;
    debug!(
        "closed-form intrinsics fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
        intr.fx, intr.fy, intr.cx, intr.cy
    );

    let k = intr.to_matrix();
    let poses = homographies
        .iter()
        .map(|h| Pose::from_homography(&k, h))
        .collect::<Option<Vec<_>>>()
        .ok_or(CalibError::Degenerate("view pose"))?;

    let problem = CalibrationProblem {
        object_points: &object_points,
        image_points: &image_points,
        camera: pack(&intr, &Distortion::default()),
        free: options.free_params(),
        poses,
    };
    let (problem, report) = LevenbergMarquardt::new()
        .with_ftol(SOLVER_TOL)
        .with_xtol(SOLVER_TOL)
        .with_patience(options.patience.max(1))
        .minimize(problem);
    if !usable_termination(&report.termination) {
        return Err(CalibError::Optimization(report.termination));
    }
    if report.termination == TerminationReason::LostPatience {
        warn!("refinement ran out of evaluations, keeping the best parameters");
    }
    debug!(
        "refinement stopped after {} evaluations: {:?}",
        report.number_of_evaluations, report.termination
    );

    let errors = problem
        .view_errors()
        .ok_or(CalibError::Degenerate("board behind the camera after refinement"))?;
    let per_view_rms: Vec<f64> = errors.iter().map(|v| rms(v)).collect();
    let all: Vec<f64> = errors.into_iter().flatten().collect();
    let rms_error = rms(&all);

    let (intrinsics, distortion) = unpack(&problem.camera);
    info!(
        "calibrated from {} views: fx={:.2} fy={:.2} cx={:.2} cy={:.2}, rms {:.4} px",
        views.len(),
        intrinsics.fx,
        intrinsics.fy,
        intrinsics.cx,
        intrinsics.cy,
        rms_error
    );

    Ok(CalibrationResult {
        calibration: CameraCalibration::from_parts(intrinsics, distortion),
        intrinsics,
        distortion,
        rms_error,
        per_view_rms,
        poses: problem.poses,
    })
}

/// Find the board in every image and calibrate from the ones where it was
/// found; images without a board are skipped.
pub fn calibrate_from_images<F: ChessboardFinder>(
    images: &[GrayImage],
    finder: &F,
    board: &BoardSpec,
    options: &CalibrationOptions,
) -> Result<CalibrationResult, CalibError> {
    if finder.pattern_size() != (board.inner_cols, board.inner_rows) {
        warn!(
            "finder looks for {:?} corners, board is {}x{}",
            finder.pattern_size(),
            board.inner_cols,
            board.inner_rows
        );
    }
    let views: Vec<Vec<Point2<f32>>> = images
        .iter()
        .enumerate()
        .filter_map(|(i, img)| {
            let found = finder.find(img);
            if found.is_none() {
                debug!("no board in image {i}");
            }
            found
        })
        .collect();
    calibrate_camera(board, &views, options)
}
