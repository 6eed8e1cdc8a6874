use std::collections::VecDeque;
use std::path::Path;

use camlab::aruco::{dictionary, render_marker};
use camlab::calib::{self, BoardSpec, StoreError};
use camlab::chessboard::ChessboardFinder;
use camlab::config::SessionConfig;
use camlab::core::{CameraCalibration, Distortion, Intrinsics, Pose};
use camlab::devices::{DeviceError, DirectorySink, FrameSource, NullSink, ScriptedKeys};
use camlab::session::{Session, SessionError, SessionEvent, SessionMode};
use image::{imageops, DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use nalgebra::{Point2, Rotation3, Vector3};

const NO_BOARD: u8 = 200;

/// In-memory camera.
struct MemorySource {
    frames: VecDeque<RgbImage>,
    broken: bool,
}

impl MemorySource {
    fn new(frames: Vec<RgbImage>) -> Self {
        Self {
            frames: frames.into(),
            broken: false,
        }
    }
}

impl FrameSource for MemorySource {
    fn open(&mut self) -> Result<(), DeviceError> {
        if self.broken {
            return Err(DeviceError::NotOpen);
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, DeviceError> {
        Ok(self.frames.pop_front())
    }
}

/// Looks the board up by the gray level of the frame's first pixel.
struct IndexedBoards(Vec<Vec<Point2<f32>>>);

impl ChessboardFinder for IndexedBoards {
    fn find(&self, img: &GrayImage) -> Option<Vec<Point2<f32>>> {
        self.0.get(img.get_pixel(0, 0)[0] as usize).cloned()
    }

    fn pattern_size(&self) -> (usize, usize) {
        (9, 7)
    }
}

fn board() -> BoardSpec {
    BoardSpec::new(9, 7, 0.04)
}

fn truth() -> CameraCalibration {
    CameraCalibration::from_parts(Intrinsics::new(700.0, 700.0, 320.0, 240.0), Distortion::default())
}

fn view(rvec: Vector3<f64>, z: f64) -> Vec<Point2<f32>> {
    let b = board();
    let centre = Vector3::new(4.0 * b.square_size, 3.0 * b.square_size, 0.0);
    let pose = Pose::new(rvec, Vector3::new(0.0, 0.0, z) - Rotation3::from_scaled_axis(rvec) * centre);
    b.object_points()
        .iter()
        .map(|p| {
            let px = truth().project(&pose, p).unwrap();
            Point2::new(px.x as f32, px.y as f32)
        })
        .collect()
}

fn boards() -> IndexedBoards {
    IndexedBoards(vec![
        view(Vector3::new(0.0, 0.0, 0.0), 0.8),
        view(Vector3::new(0.35, 0.0, 0.05), 0.75),
        view(Vector3::new(0.0, -0.4, -0.1), 0.85),
        view(Vector3::new(-0.3, 0.25, 0.2), 0.7),
        view(Vector3::new(0.2, 0.35, -0.25), 0.9),
    ])
}

fn frame(level: u8) -> RgbImage {
    RgbImage::from_pixel(16, 16, Rgb([level, level, level]))
}

fn config(dir: &Path) -> SessionConfig {
    SessionConfig {
        board: board(),
        calibration_path: dir.join("CameraCalibrationFile.txt"),
        ..Default::default()
    }
}

#[test]
fn early_finish_is_ignored_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let path = cfg.calibration_path.clone();
    let frames = vec![frame(0), frame(1), frame(2), frame(3), frame(NO_BOARD), frame(4)];

    let session = Session::with_finder(cfg, MemorySource::new(frames), NullSink, ScriptedKeys::new("sfsss."), boards())
        .unwrap();
    let report = session.run(SessionMode::Calibrate).unwrap();

    assert_eq!(report.frames_processed, 6);
    // the save on the board-less frame does nothing
    assert_eq!(report.frames_saved, 3);
    assert_eq!(report.finish_ignored, 1);
    assert_eq!(report.calibrations_run, 0);
    assert!(report.events.contains(&SessionEvent::FinishIgnored { saved: 1, required: 4 }));
    assert_eq!(report.calibration, CameraCalibration::default());
    assert!(!path.exists());
}

#[test]
fn calibrates_stores_and_moves_on_to_monitoring() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let path = cfg.calibration_path.clone();
    let frames = vec![frame(0), frame(1), frame(2), frame(3), frame(4), frame(NO_BOARD), frame(NO_BOARD)];

    let session = Session::with_finder(cfg, MemorySource::new(frames), NullSink, ScriptedKeys::new("ssssf"), boards())
        .unwrap();
    let report = session.run(SessionMode::Calibrate).unwrap();

    assert_eq!(report.frames_saved, 4);
    assert_eq!(report.calibrations_run, 1);
    assert_eq!(report.finish_ignored, 0);
    assert_eq!(report.frames_processed, 7);
    assert_eq!(report.markers_seen, 0);

    let intr = report.calibration.intrinsics();
    assert!((intr.fx - 700.0).abs() < 0.5, "fx {}", intr.fx);
    assert!((intr.cx - 320.0).abs() < 0.5, "cx {}", intr.cx);
    assert!((intr.cy - 240.0).abs() < 0.5, "cy {}", intr.cy);
    assert_eq!(calib::load(&path).unwrap(), report.calibration);
}

#[test]
fn store_failure_keeps_the_new_calibration() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = SessionConfig {
        calibration_path: dir.path().join("missing").join("calib.txt"),
        monitor_after_calibration: false,
        ..config(dir.path())
    };
    let frames = (0..5).map(frame).collect();

    let session = Session::with_finder(cfg, MemorySource::new(frames), NullSink, ScriptedKeys::new("ssssf"), boards())
        .unwrap();
    let report = session.run(SessionMode::Calibrate).unwrap();

    assert_eq!(report.calibrations_run, 1);
    assert!(report
        .events
        .iter()
        .any(|e| matches!(e, SessionEvent::StoreFailed { .. })));
    assert_ne!(report.calibration, CameraCalibration::default());
}

#[test]
fn quit_key_ends_capture() {
    let dir = tempfile::tempdir().unwrap();
    let frames = (0..5).map(frame).collect();
    let session = Session::with_finder(
        config(dir.path()),
        MemorySource::new(frames),
        NullSink,
        ScriptedKeys::new("s\\e"),
        boards(),
    )
    .unwrap();
    let report = session.run(SessionMode::Calibrate).unwrap();
    assert_eq!(report.frames_processed, 2);
    assert_eq!(report.frames_saved, 1);
}

#[test]
fn broken_camera_never_starts() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = MemorySource::new(vec![frame(0)]);
    source.broken = true;
    let session = Session::with_finder(config(dir.path()), source, NullSink, ScriptedKeys::new(""), boards()).unwrap();
    assert!(matches!(
        session.run(SessionMode::Calibrate),
        Err(SessionError::DeviceOpen(_))
    ));
}

#[test]
fn monitor_mode_needs_a_calibration_file() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::new(
        config(dir.path()),
        MemorySource::new(vec![frame(0)]),
        NullSink,
        ScriptedKeys::new(""),
    )
    .unwrap();
    assert!(matches!(
        session.run(SessionMode::Monitor),
        Err(SessionError::Store(StoreError::Open { .. }))
    ));
}

#[test]
fn unknown_dictionary_is_rejected_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = SessionConfig {
        dictionary: "DICT_9X9_1".to_string(),
        ..config(dir.path())
    };
    let result = Session::new(cfg, MemorySource::new(Vec::new()), NullSink, ScriptedKeys::new(""));
    assert!(matches!(result, Err(SessionError::Marker(_))));
}

#[test]
fn monitoring_sees_markers_and_stops_on_a_key() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    calib::save_calibration(&cfg.calibration_path, &truth()).unwrap();

    let marker = render_marker(&dictionary("DICT_4X4_50").unwrap(), 12, 120, 1).unwrap();
    let mut canvas = GrayImage::from_pixel(400, 300, Luma([255]));
    imageops::replace(&mut canvas, &marker, 140, 90);
    let shot = DynamicImage::ImageLuma8(canvas).to_rgb8();

    let out = dir.path().join("out");
    let sink = DirectorySink::new(&out).unwrap();
    let frames = vec![shot.clone(), shot.clone(), shot.clone(), shot];
    let session = Session::new(cfg, MemorySource::new(frames), sink, ScriptedKeys::new("..x")).unwrap();
    let report = session.run(SessionMode::Monitor).unwrap();

    assert_eq!(report.frames_processed, 3);
    assert_eq!(report.markers_seen, 3);
    assert_eq!(report.calibration, truth());

    // the marker faces the camera: in front of it, z axis pointing back
    assert_eq!(report.marker_poses.len(), 1);
    let mp = &report.marker_poses[0];
    assert_eq!(mp.id, 12);
    assert!(mp.pose.tvec.z > 0.0, "tvec {:?}", mp.pose.tvec);
    let z_axis = mp.pose.rotation() * Vector3::z();
    assert!(z_axis.z < -0.99, "z axis {z_axis:?}");
    assert!(mp.rms < 1.0, "rms {}", mp.rms);
    // 120 px marker of 0.099 m seen at f = 700
    assert!((mp.pose.tvec.z - 0.099 * 700.0 / 119.0).abs() < 0.02, "z {}", mp.pose.tvec.z);
    assert!(out.join("monitor_00002.png").exists());
    assert!(!out.join("monitor_00003.png").exists());
}
