use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use nalgebra::Point2;

const ROW_COLORS: [Rgb<u8>; 7] = [
    Rgb([255, 0, 0]),
    Rgb([255, 128, 0]),
    Rgb([200, 200, 0]),
    Rgb([0, 255, 0]),
    Rgb([0, 200, 200]),
    Rgb([0, 0, 255]),
    Rgb([255, 0, 255]),
];

/// Operator feedback for a found board: one colour per row, each corner
/// circled and joined to the next in row-major order.
pub fn draw_chessboard_corners(frame: &mut RgbImage, corners: &[Point2<f32>], cols: usize) {
    if cols == 0 {
        return;
    }
    let mut prev: Option<Point2<f32>> = None;
    for (k, p) in corners.iter().enumerate() {
        let color = ROW_COLORS[(k / cols) % ROW_COLORS.len()];
        if let Some(q) = prev {
            draw_line_segment_mut(frame, (q.x, q.y), (p.x, p.y), color);
        }
        draw_hollow_circle_mut(frame, (p.x.round() as i32, p.y.round() as i32), 4, color);
        prev = Some(*p);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_circles_in_row_colors() {
        let mut frame = RgbImage::new(60, 40);
        let corners = [
            Point2::new(10.0, 10.0),
            Point2::new(30.0, 10.0),
            Point2::new(10.0, 30.0),
            Point2::new(30.0, 30.0),
        ];
        draw_chessboard_corners(&mut frame, &corners, 2);
        assert_eq!(*frame.get_pixel(14, 10), ROW_COLORS[0]);
        assert_eq!(*frame.get_pixel(34, 30), ROW_COLORS[1]);
        assert_eq!(*frame.get_pixel(55, 5), Rgb([0, 0, 0]));
    }
}
