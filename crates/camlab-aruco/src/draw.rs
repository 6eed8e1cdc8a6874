use camlab_core::{CameraCalibration, Pose};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use nalgebra::{Point2, Point3};

use crate::MarkerDetection;

const AXIS_COLORS: [Rgb<u8>; 3] = [Rgb([255, 0, 0]), Rgb([0, 255, 0]), Rgb([0, 0, 255])];
const OUTLINE: Rgb<u8> = Rgb([0, 255, 0]);
const FIRST_CORNER: Rgb<u8> = Rgb([255, 0, 0]);

fn to_f32(p: Point2<f64>) -> (f32, f32) {
    (p.x as f32, p.y as f32)
}

/// Draw the x (red), y (green) and z (blue) axes of `pose`.
/// Returns `false` when the origin or a tip projects behind the camera.
pub fn draw_axis(frame: &mut RgbImage, calibration: &CameraCalibration, pose: &Pose, length: f64) -> bool {
    let tips = [
        Point3::new(length, 0.0, 0.0),
        Point3::new(0.0, length, 0.0),
        Point3::new(0.0, 0.0, length),
    ];
    let Some(origin) = calibration.project(pose, &Point3::origin()) else {
        return false;
    };
    let mut projected = [Point2::origin(); 3];
    for (out, tip) in projected.iter_mut().zip(&tips) {
        let Some(p) = calibration.project(pose, tip) else {
            return false;
        };
        *out = p;
    }
    for (p, color) in projected.iter().zip(AXIS_COLORS) {
        draw_line_segment_mut(frame, to_f32(origin), to_f32(*p), color);
    }
    true
}

/// Outline each marker and mark its first corner.
pub fn draw_detected_markers(frame: &mut RgbImage, markers: &[MarkerDetection]) {
    for m in markers {
        for k in 0..4 {
            draw_line_segment_mut(frame, to_f32(m.corners[k]), to_f32(m.corners[(k + 1) % 4]), OUTLINE);
        }
        let c = m.corners[0];
        let rect = Rect::at(c.x.round() as i32 - 2, c.y.round() as i32 - 2).of_size(5, 5);
        draw_filled_rect_mut(frame, rect, FIRST_CORNER);
    }
}
