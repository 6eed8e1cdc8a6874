//! Core geometry shared by the camlab crates.
//!
//! Purely numeric: no image decoding and no detector lives here. The other
//! crates build chessboard finding, calibration and marker pose on top of
//! these types.

mod camera;
mod homography;
mod image;
mod logger;
pub mod lsq;
mod pose;

pub use camera::{CameraCalibration, Distortion, Intrinsics};
pub use homography::{estimate_homography, homography_from_4pt, Homography};
pub use image::{sample_bilinear, GrayView};
pub use pose::Pose;

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_from_verbosity};
