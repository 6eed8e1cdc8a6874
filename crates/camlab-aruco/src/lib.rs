//! Square fiducial markers: detection, rendering and single-marker pose.
//!
//! Dictionaries and code matching come from `calib-targets-aruco`; this crate
//! finds the marker quads in a full image:
//!
//! 1. inverted adaptive mean threshold,
//! 2. 8-connected components and their outer boundaries,
//! 3. Douglas-Peucker to convex quads,
//! 4. cell sampling through the quad homography and bit matching.
//!
//! ```no_run
//! use camlab_aruco::{detect_markers, dictionary, MarkerDetectorParams};
//!
//! let dict = dictionary("DICT_4X4_50").unwrap();
//! let img = image::open("frame.png").unwrap().to_luma8();
//! for m in detect_markers(&img, dict, &MarkerDetectorParams::default()) {
//!     println!("marker {} at {:?}", m.id, m.corners[0]);
//! }
//! ```

mod contours;
mod decode;
mod detector;
mod draw;
mod polygon;
mod pose;
mod render;
mod threshold;

pub use calib_targets_aruco::Dictionary;
pub use detector::{detect_markers, find_candidates, MarkerDetection, MarkerDetector, MarkerDetectorParams};
pub use draw::{draw_axis, draw_detected_markers};
pub use pose::{estimate_marker_pose, estimate_pose_single_markers, marker_object_points, MarkerPose};
pub use render::{generate_marker_set, render_marker};
pub use threshold::adaptive_threshold_mean;

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum MarkerError {
    #[error("unknown marker dictionary `{0}`")]
    UnknownDictionary(String),

    #[error("marker id {id} out of range, dictionary has {count} markers")]
    IdOutOfRange { id: u32, count: usize },

    #[error("{side_px} px cannot hold {cells} marker cells")]
    TooSmall { side_px: u32, cells: u32 },

    #[error("cannot write marker image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Built-in dictionary by its OpenCV name, e.g. `DICT_4X4_50`.
pub fn dictionary(name: &str) -> Result<Dictionary, MarkerError> {
    calib_targets_aruco::builtins::builtin_dictionary(name)
        .ok_or_else(|| MarkerError::UnknownDictionary(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_builtin_dictionaries() {
        let dict = dictionary("DICT_4X4_50").unwrap();
        assert_eq!(dict.marker_size, 4);
        assert_eq!(dict.codes.len(), 50);
        assert!(matches!(
            dictionary("DICT_NOPE"),
            Err(MarkerError::UnknownDictionary(name)) if name == "DICT_NOPE"
        ));
    }
}
