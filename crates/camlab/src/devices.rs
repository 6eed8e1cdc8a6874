//! Frame, display and keyboard seams of the session, with file-backed
//! implementations.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use image::RgbImage;
use log::debug;

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(thiserror::Error, Debug)]
pub enum DeviceError {
    #[error("cannot open frame source {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("frame source {0} has no images")]
    Empty(PathBuf),

    #[error("frame source is not open")]
    NotOpen,

    #[error("cannot read frame {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("cannot create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Escape,
}

pub trait FrameSource {
    /// Acquire the device. The session does not start when this fails.
    fn open(&mut self) -> Result<(), DeviceError>;

    /// Next frame; `Ok(None)` at the end of the stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, DeviceError>;
}

pub trait FrameSink {
    fn show(&mut self, window: &str, frame: &RgbImage) -> Result<(), DeviceError>;
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn show(&mut self, window: &str, frame: &RgbImage) -> Result<(), DeviceError> {
        (**self).show(window, frame)
    }
}

pub trait KeySource {
    /// Wait up to `timeout` for a key press.
    fn poll(&mut self, timeout: Duration) -> Option<Key>;
}

/// Replays the images of a directory, sorted by file name.
#[derive(Debug)]
pub struct ImageSequenceSource {
    dir: PathBuf,
    frames: Option<Vec<PathBuf>>,
    next: usize,
}

impl ImageSequenceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            frames: None,
            next: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self) -> Result<(), DeviceError> {
        let open_err = |source| DeviceError::Open {
            path: self.dir.clone(),
            source,
        };
        let mut frames = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(open_err)? {
            let path = entry.map_err(open_err)?.path();
            if path.is_file() && is_frame_file(&path) {
                frames.push(path);
            }
        }
        if frames.is_empty() {
            return Err(DeviceError::Empty(self.dir.clone()));
        }
        frames.sort();
        debug!("{} frames in {}", frames.len(), self.dir.display());
        self.frames = Some(frames);
        self.next = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, DeviceError> {
        let frames = self.frames.as_ref().ok_or(DeviceError::NotOpen)?;
        let Some(path) = frames.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        let img = image::open(path).map_err(|source| DeviceError::Read {
            path: path.clone(),
            source,
        })?;
        Ok(Some(img.to_rgb8()))
    }
}

/// Writes every shown frame as `<window>_<index:05>.png`.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    counters: HashMap<String, usize>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, DeviceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| DeviceError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            counters: HashMap::new(),
        })
    }
}

impl FrameSink for DirectorySink {
    fn show(&mut self, window: &str, frame: &RgbImage) -> Result<(), DeviceError> {
        let index = self.counters.entry(window.to_string()).or_insert(0);
        let path = self.dir.join(format!("{window}_{index:05}.png"));
        *index += 1;
        frame
            .save(&path)
            .map_err(|source| DeviceError::Write { path, source })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn show(&mut self, _window: &str, _frame: &RgbImage) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// Key presses from a script, one entry per poll: `.` is no key and `\e`
/// is Escape. Polls past the end return no key.
#[derive(Clone, Debug)]
pub struct ScriptedKeys {
    keys: Vec<Option<Key>>,
    next: usize,
    paced: bool,
}

impl ScriptedKeys {
    pub fn new(script: &str) -> Self {
        let mut keys = Vec::new();
        let mut chars = script.chars().peekable();
        while let Some(c) = chars.next() {
            let key = match c {
                '.' => None,
                '\u{1b}' => Some(Key::Escape),
                '\\' if chars.peek() == Some(&'e') => {
                    chars.next();
                    Some(Key::Escape)
                }
                c => Some(Key::Char(c)),
            };
            keys.push(key);
        }
        Self {
            keys,
            next: 0,
            paced: false,
        }
    }

    /// Sleep for the poll timeout whenever no key is pressed.
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    pub fn remaining(&self) -> usize {
        self.keys.len().saturating_sub(self.next)
    }
}

impl KeySource for ScriptedKeys {
    fn poll(&mut self, timeout: Duration) -> Option<Key> {
        let key = self.keys.get(self.next).copied().flatten();
        self.next += 1;
        if key.is_none() && self.paced {
            thread::sleep(timeout);
        }
        key
    }
}
