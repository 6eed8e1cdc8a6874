//! Camera lab: chessboard calibration with a persistent calibration file,
//! ArUco marker pose monitoring, and a handful of image-processing demos.
//!
//! The building blocks live in the sub-crates re-exported here:
//!
//! - [`core`]: camera model, homographies, poses, least squares.
//! - [`imgproc`]: DFT, Gaussian kernel, channel edits, image IO.
//! - [`chessboard`]: chessboard corner finding and overlays.
//! - [`calib`]: planar calibration and the calibration file.
//! - [`aruco`]: marker detection, rendering and pose.
//!
//! This crate adds the interactive [`session`]: capture chessboard views,
//! calibrate, then monitor markers, driven by a [`config::SessionConfig`]
//! and the device traits in [`devices`].
//!
//! ```no_run
//! use camlab::config::SessionConfig;
//! use camlab::devices::{DirectorySink, ImageSequenceSource, ScriptedKeys};
//! use camlab::session::{Session, SessionMode};
//!
//! let config = SessionConfig::default();
//! let session = Session::new(
//!     config,
//!     ImageSequenceSource::new("frames"),
//!     DirectorySink::new("out").unwrap(),
//!     ScriptedKeys::new("..s..s..s..s..f"),
//! )
//! .unwrap();
//! let report = session.run(SessionMode::Calibrate).unwrap();
//! println!("{} views saved", report.frames_saved);
//! ```

pub use camlab_aruco as aruco;
pub use camlab_calib as calib;
pub use camlab_chessboard as chessboard;
pub use camlab_core as core;
pub use camlab_imgproc as imgproc;

pub mod config;
pub mod devices;
pub mod session;

pub use config::{ConfigError, KeyBindings, SessionConfig};
pub use session::{Session, SessionError, SessionEvent, SessionMode, SessionReport, SessionState};
