//! Capture, calibrate and monitor loop.
//!
//! The session owns its devices for its whole run. Control flow is the
//! [`SessionState`] machine; [`SessionState::next`] is the pure transition
//! function and [`Session`] performs the side effects of each state.

use camlab_aruco::{draw_axis, estimate_pose_single_markers, MarkerDetector, MarkerError, MarkerPose};
use camlab_calib::{calibrate_camera, save_calibration, StoreError};
use camlab_chessboard::{draw_chessboard_corners, ChessGridFinder, ChessboardFinder};
use camlab_core::CameraCalibration;
use image::{imageops, RgbImage};
use log::{debug, info, warn};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::config::{Action, SessionConfig};
use crate::devices::{DeviceError, FrameSink, FrameSource, KeySource};

#[cfg(feature = "tracing")]
use tracing::instrument;

pub const CAPTURE_WINDOW: &str = "capture";
pub const MONITOR_WINDOW: &str = "monitor";

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("frame source failed to open: {0}")]
    DeviceOpen(#[source] DeviceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Marker(#[from] MarkerError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Capture chessboard views, calibrate, then monitor.
    Calibrate,
    /// Load the stored calibration and go straight to monitoring.
    #[default]
    Monitor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Capturing,
    Calibrating,
    Monitoring,
    Exit,
}

/// What happened during one step, as seen by the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Input {
    EndOfStream,
    /// Result of the key poll, if a key was pressed.
    Key(Option<Action>),
    Calibrated { ok: bool },
}

/// Values the transitions depend on besides the input.
#[derive(Clone, Copy, Debug)]
pub struct Guards {
    pub saved: usize,
    pub min_frames: usize,
    pub monitor_after_calibration: bool,
}

impl SessionState {
    pub fn initial(mode: SessionMode) -> Self {
        match mode {
            SessionMode::Calibrate => SessionState::Capturing,
            SessionMode::Monitor => SessionState::Monitoring,
        }
    }

    pub fn next(self, input: Input, guards: &Guards) -> SessionState {
        use SessionState::*;
        match (self, input) {
            (Exit, _) | (_, Input::EndOfStream) => Exit,
            (Capturing, Input::Key(Some(Action::Quit))) => Exit,
            (Capturing, Input::Key(Some(Action::Finish))) if guards.saved > guards.min_frames => Calibrating,
            (Capturing, _) => Capturing,
            (Calibrating, Input::Calibrated { ok: true }) if guards.monitor_after_calibration => Monitoring,
            (Calibrating, Input::Calibrated { .. }) => Capturing,
            (Calibrating, Input::Key(_)) => Calibrating,
            (Monitoring, Input::Key(Some(_))) => Exit,
            (Monitoring, _) => Monitoring,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    FrameSaved { saved: usize },
    FinishIgnored { saved: usize, required: usize },
    Calibrated { rms: f64 },
    CalibrationFailed { reason: String },
    StoreFailed { reason: String },
    FrameReadFailed { reason: String },
}

#[derive(Clone, Debug, Default)]
pub struct SessionReport {
    pub frames_processed: usize,
    pub frames_saved: usize,
    pub calibrations_run: usize,
    pub finish_ignored: usize,
    pub markers_seen: usize,
    /// Marker poses of the last monitored frame.
    pub marker_poses: Vec<MarkerPose>,
    pub events: Vec<SessionEvent>,
    pub calibration: CameraCalibration,
}

impl SessionReport {
    fn record(&mut self, event: SessionEvent) {
        match &event {
            SessionEvent::FrameSaved { .. } => self.frames_saved += 1,
            SessionEvent::FinishIgnored { .. } => self.finish_ignored += 1,
            SessionEvent::Calibrated { .. } => self.calibrations_run += 1,
            _ => {}
        }
        self.events.push(event);
    }
}

pub struct Session<S, D, K, F = ChessGridFinder> {
    config: SessionConfig,
    source: S,
    sink: D,
    keys: K,
    finder: F,
    detector: MarkerDetector,
    calibration: CameraCalibration,
    /// Corners of every saved capture frame.
    frames: Vec<Vec<Point2<f32>>>,
    report: SessionReport,
}

impl<S, D, K> Session<S, D, K>
where
    S: FrameSource,
    D: FrameSink,
    K: KeySource,
{
    /// Session with the ChESS chessboard finder configured from `config`.
    pub fn new(config: SessionConfig, source: S, sink: D, keys: K) -> Result<Self, SessionError> {
        let finder = ChessGridFinder::new(config.board.inner_cols, config.board.inner_rows, config.finder.clone());
        Self::with_finder(config, source, sink, keys, finder)
    }
}

impl<S, D, K, F> Session<S, D, K, F>
where
    S: FrameSource,
    D: FrameSink,
    K: KeySource,
    F: ChessboardFinder,
{
    pub fn with_finder(config: SessionConfig, source: S, sink: D, keys: K, finder: F) -> Result<Self, SessionError> {
        let dictionary = camlab_aruco::dictionary(&config.dictionary)?;
        let detector = MarkerDetector::new(dictionary, config.markers.clone());
        Ok(Self {
            config,
            source,
            sink,
            keys,
            finder,
            detector,
            calibration: CameraCalibration::default(),
            frames: Vec::new(),
            report: SessionReport::default(),
        })
    }

    fn guards(&self) -> Guards {
        Guards {
            saved: self.frames.len(),
            min_frames: self.config.min_frames,
            monitor_after_calibration: self.config.monitor_after_calibration,
        }
    }

    /// Run until the frames run out or a key ends the session.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn run(mut self, mode: SessionMode) -> Result<SessionReport, SessionError> {
        self.source.open().map_err(SessionError::DeviceOpen)?;
        if mode == SessionMode::Monitor {
            self.calibration = camlab_calib::load(&self.config.calibration_path)?;
            info!("loaded calibration from {}", self.config.calibration_path.display());
        }

        let mut state = SessionState::initial(mode);
        info!("session started in {state:?}");
        while state != SessionState::Exit {
            let input = match state {
                SessionState::Capturing => self.capture_step(),
                SessionState::Calibrating => self.calibrate_step(),
                SessionState::Monitoring => self.monitor_step(),
                SessionState::Exit => Input::EndOfStream,
            };
            let next = state.next(input, &self.guards());
            if next != state {
                info!("{state:?} -> {next:?}");
            }
            state = next;
        }

        self.report.calibration = self.calibration.clone();
        info!(
            "session done: {} frames, {} saved, {} calibrations, {} markers",
            self.report.frames_processed,
            self.report.frames_saved,
            self.report.calibrations_run,
            self.report.markers_seen
        );
        Ok(self.report)
    }

    /// Next frame; read failures end the stream.
    fn read_frame(&mut self) -> Option<RgbImage> {
        match self.source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("{e}; ending session");
                self.report.record(SessionEvent::FrameReadFailed { reason: e.to_string() });
                None
            }
        }
    }

    fn display(&mut self, window: &str, frame: &RgbImage) {
        if let Err(e) = self.sink.show(window, frame) {
            warn!("display failed: {e}");
        }
    }

    fn capture_step(&mut self) -> Input {
        let Some(frame) = self.read_frame() else {
            return Input::EndOfStream;
        };
        self.report.frames_processed += 1;

        let gray = imageops::grayscale(&frame);
        let corners = self.finder.find(&gray);
        let mut shown = frame;
        if let Some(c) = &corners {
            draw_chessboard_corners(&mut shown, c, self.config.board.inner_cols);
        }
        debug!(
            "frame {}: board {}",
            self.report.frames_processed,
            if corners.is_some() { "found" } else { "not found" }
        );
        self.display(CAPTURE_WINDOW, &shown);

        let action = self
            .keys
            .poll(self.config.capture_timeout())
            .map(|k| self.config.keys.action(k));
        match action {
            Some(Action::Save) => match corners {
                Some(corners) => {
                    self.frames.push(corners);
                    info!("saved view {}", self.frames.len());
                    self.report.record(SessionEvent::FrameSaved {
                        saved: self.frames.len(),
                    });
                }
                None => debug!("save ignored, no board in frame"),
            },
            Some(Action::Finish) if self.frames.len() <= self.config.min_frames => {
                let required = self.config.min_frames + 1;
                warn!(
                    "finish ignored: {} views saved, need at least {required}",
                    self.frames.len()
                );
                self.report.record(SessionEvent::FinishIgnored {
                    saved: self.frames.len(),
                    required,
                });
            }
            Some(Action::Quit) => info!("capture stopped by key"),
            _ => {}
        }
        Input::Key(action)
    }

    fn calibrate_step(&mut self) -> Input {
        match calibrate_camera(&self.config.board, &self.frames, &self.config.calibration) {
            Ok(result) => {
                info!("calibrated from {} views, rms {:.4} px", self.frames.len(), result.rms_error);
                self.calibration = result.calibration;
                self.report.record(SessionEvent::Calibrated { rms: result.rms_error });
                if let Err(e) = save_calibration(&self.config.calibration_path, &self.calibration) {
                    warn!("calibration not stored: {e}");
                    self.report.record(SessionEvent::StoreFailed { reason: e.to_string() });
                }
                self.frames.clear();
                Input::Calibrated { ok: true }
            }
            Err(e) => {
                warn!("calibration failed, keeping the previous one: {e}");
                self.report.record(SessionEvent::CalibrationFailed { reason: e.to_string() });
                Input::Calibrated { ok: false }
            }
        }
    }

    fn monitor_step(&mut self) -> Input {
        let Some(frame) = self.read_frame() else {
            return Input::EndOfStream;
        };
        self.report.frames_processed += 1;

        let gray = imageops::grayscale(&frame);
        let markers = self.detector.detect(&gray);
        let poses = estimate_pose_single_markers(&markers, self.config.marker_length, &self.calibration);
        self.report.markers_seen += markers.len();
        debug!("{} markers, {} poses", markers.len(), poses.len());

        let mut shown = frame;
        for p in &poses {
            draw_axis(&mut shown, &self.calibration, &p.pose, self.config.axis_length);
        }
        self.display(MONITOR_WINDOW, &shown);
        self.report.marker_poses = poses;

        let key = self.keys.poll(self.config.monitor_timeout());
        Input::Key(key.map(|k| self.config.keys.action(k)))
    }
}
