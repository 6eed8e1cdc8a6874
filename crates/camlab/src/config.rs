//! Session configuration, loaded from JSON with every field optional.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use camlab_aruco::MarkerDetectorParams;
use camlab_calib::{BoardSpec, CalibrationOptions};
use camlab_chessboard::ChessGridParams;
use serde::{Deserialize, Serialize};

use crate::devices::Key;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot access config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// What a key press asks the session to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Save,
    Finish,
    Quit,
    Other,
}

/// Capture-mode keys. Escape always quits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub save: char,
    pub finish: char,
    pub quit: char,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            save: 's',
            finish: 'f',
            quit: 'b',
        }
    }
}

impl KeyBindings {
    pub fn action(&self, key: Key) -> Action {
        match key {
            Key::Escape => Action::Quit,
            Key::Char(c) if c == self.save => Action::Save,
            Key::Char(c) if c == self.finish => Action::Finish,
            Key::Char(c) if c == self.quit => Action::Quit,
            Key::Char(_) => Action::Other,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub board: BoardSpec,
    /// Capture frame rate; the key poll waits `1000 / fps` ms.
    pub fps: u32,
    pub monitor_poll_ms: u64,
    /// Finish needs strictly more saved frames than this.
    pub min_frames: usize,
    pub calibration_path: PathBuf,
    pub dictionary: String,
    /// Printed marker side, metres.
    pub marker_length: f64,
    pub axis_length: f64,
    pub monitor_after_calibration: bool,
    pub keys: KeyBindings,
    pub finder: ChessGridParams,
    pub markers: MarkerDetectorParams,
    pub calibration: CalibrationOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            board: BoardSpec::default(),
            fps: 20,
            monitor_poll_ms: 30,
            min_frames: 3,
            calibration_path: PathBuf::from("CameraCalibrationFile.txt"),
            dictionary: "DICT_4X4_50".to_string(),
            marker_length: 0.099,
            axis_length: 0.1,
            monitor_after_calibration: true,
            keys: KeyBindings::default(),
            finder: ChessGridParams::default(),
            markers: MarkerDetectorParams::default(),
            calibration: CalibrationOptions::default(),
        }
    }
}

impl SessionConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.fps.max(1)))
    }

    pub fn monitor_timeout(&self) -> Duration {
        Duration::from_millis(self.monitor_poll_ms)
    }
}
