//! Bit reading inside a candidate quad.

use calib_targets_aruco::Matcher;
use camlab_core::{homography_from_4pt, sample_bilinear, GrayView};
use nalgebra::Point2;

use crate::threshold::otsu_threshold;

/// Sub-samples per cell side; they sit on the inner part of the cell.
const SUBSAMPLES: usize = 3;

#[derive(Clone, Copy, Debug)]
pub(crate) struct DecodeParams {
    pub max_border_error_rate: f64,
    pub min_cell_contrast: u8,
    /// Fraction of a cell skipped at each side when sampling.
    pub cell_margin: f64,
}

/// Marker code as read from the image, before dictionary matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Observation {
    /// Inner bits, row-major with `idx = y * n + x`, black = 1.
    pub code: u64,
    pub border_errors: usize,
}

/// Mean intensity of every cell of a `cells x cells` grid laid over `quad`
/// (clockwise, `quad[0]` at grid origin). `None` when the quad maps outside
/// the image.
pub(crate) fn cell_means(
    img: &GrayView<'_>,
    quad: &[Point2<f64>; 4],
    cells: usize,
    margin: f64,
) -> Option<Vec<u8>> {
    let s = cells as f64;
    let grid = [
        Point2::new(0.0, 0.0),
        Point2::new(s, 0.0),
        Point2::new(s, s),
        Point2::new(0.0, s),
    ];
    let h = homography_from_4pt(&grid, quad)?;
    let (w, ht) = (img.width as f64, img.height as f64);

    let span = 1.0 - 2.0 * margin;
    let mut means = Vec::with_capacity(cells * cells);
    for cy in 0..cells {
        for cx in 0..cells {
            let mut acc = 0.0;
            for sy in 0..SUBSAMPLES {
                for sx in 0..SUBSAMPLES {
                    let fx = margin + span * (sx as f64 + 0.5) / SUBSAMPLES as f64;
                    let fy = margin + span * (sy as f64 + 0.5) / SUBSAMPLES as f64;
                    let p = h.apply(Point2::new(cx as f64 + fx, cy as f64 + fy));
                    if !(p.x >= -0.5 && p.y >= -0.5 && p.x <= w - 0.5 && p.y <= ht - 0.5) {
                        return None;
                    }
                    acc += sample_bilinear(img, p.x, p.y);
                }
            }
            let mean = acc / (SUBSAMPLES * SUBSAMPLES) as f64;
            means.push(mean.round().clamp(0.0, 255.0) as u8);
        }
    }
    Some(means)
}

/// Threshold cell means and read the inner code of an `n x n` marker with a
/// one-cell border.
pub(crate) fn read_bits(means: &[u8], n: usize, params: &DecodeParams) -> Option<Observation> {
    let cells = n + 2;
    if means.len() != cells * cells || n * n > 64 {
        return None;
    }
    let (lo, hi) = means
        .iter()
        .fold((255u8, 0u8), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if hi.saturating_sub(lo) < params.min_cell_contrast {
        return None;
    }

    let t = otsu_threshold(means);
    let black = |cx: usize, cy: usize| means[cy * cells + cx] <= t;

    let mut border_errors = 0;
    for i in 0..cells {
        for (cx, cy) in [(i, 0), (i, cells - 1), (0, i), (cells - 1, i)] {
            if !black(cx, cy) {
                border_errors += 1;
            }
        }
    }
    // corner cells were visited twice
    for (cx, cy) in [(0, 0), (cells - 1, 0), (0, cells - 1), (cells - 1, cells - 1)] {
        if !black(cx, cy) {
            border_errors -= 1;
        }
    }
    let border_cells = 4 * (cells - 1);
    if border_errors as f64 > params.max_border_error_rate * border_cells as f64 {
        return None;
    }

    let mut code = 0u64;
    for y in 0..n {
        for x in 0..n {
            if black(x + 1, y + 1) {
                code |= 1u64 << (y * n + x);
            }
        }
    }
    Some(Observation {
        code,
        border_errors,
    })
}

/// Dictionary id, rotation, Hamming distance and the corners reordered so
/// that corner 0 is the marker's own top-left.
pub(crate) fn identify(
    obs: &Observation,
    matcher: &Matcher,
    quad: &[Point2<f64>; 4],
) -> Option<(u32, u8, u8, [Point2<f64>; 4])> {
    let m = matcher.match_code(obs.code)?;
    let r = (m.rotation & 3) as usize;
    let corners = [quad[r], quad[(r + 1) % 4], quad[(r + 2) % 4], quad[(r + 3) % 4]];
    Some((m.id, m.rotation, m.hamming, corners))
}
