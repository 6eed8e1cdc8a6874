use calib_targets_aruco::{Dictionary, Matcher};
use camlab_core::GrayView;
use image::GrayImage;
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::contours::Labels;
use crate::decode::{cell_means, identify, read_bits, DecodeParams};
use crate::polygon::{approximate_closed, is_convex, min_side, orient_clockwise, perimeter};
use crate::threshold::adaptive_threshold_mean;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Marker detection thresholds. Rates are relative to the larger image
/// dimension (perimeters) or to the candidate's own perimeter (sides,
/// duplicate distance).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerDetectorParams {
    pub adaptive_window: u32,
    pub adaptive_constant: f32,
    pub min_perimeter_rate: f64,
    pub max_perimeter_rate: f64,
    pub polygonal_approx_rate: f64,
    pub min_corner_distance_rate: f64,
    pub min_marker_distance_rate: f64,
    pub max_border_error_rate: f64,
    pub min_cell_contrast: u8,
    /// Upper bound on corrected bits; the dictionary's own limit applies too.
    pub max_hamming: u8,
    pub cell_margin: f64,
}

impl Default for MarkerDetectorParams {
    fn default() -> Self {
        Self {
            adaptive_window: 23,
            adaptive_constant: 7.0,
            min_perimeter_rate: 0.03,
            max_perimeter_rate: 4.0,
            polygonal_approx_rate: 0.03,
            min_corner_distance_rate: 0.05,
            min_marker_distance_rate: 0.05,
            max_border_error_rate: 0.35,
            min_cell_contrast: 20,
            max_hamming: 2,
            cell_margin: 0.2,
        }
    }
}

/// One identified marker.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerDetection {
    pub id: u32,
    /// Image corners: marker top-left, top-right, bottom-right, bottom-left.
    pub corners: [Point2<f64>; 4],
    pub hamming: u8,
    /// Quarter turns between the dictionary code and the image reading.
    pub rotation: u8,
}

/// Clockwise quads from the binarized image.
pub fn find_candidates(img: &GrayImage, params: &MarkerDetectorParams) -> Vec<[Point2<f64>; 4]> {
    let (w, h) = img.dimensions();
    if w < 3 || h < 3 {
        return Vec::new();
    }
    let binary = adaptive_threshold_mean(img, params.adaptive_window, params.adaptive_constant);
    let labels = Labels::new(&binary);

    let max_dim = w.max(h) as f64;
    let min_len = params.min_perimeter_rate * max_dim;
    let max_len = params.max_perimeter_rate * max_dim;

    let mut quads: Vec<[Point2<f64>; 4]> = Vec::new();
    for comp in &labels.components {
        if comp.touches_border(w, h) {
            continue;
        }
        // cheap pre-filter: the outer contour cannot be longer than the bbox perimeter
        let bbox_perimeter = 2.0 * ((comp.max.0 - comp.min.0) + (comp.max.1 - comp.min.1)) as f64;
        if bbox_perimeter < min_len {
            continue;
        }
        let contour = labels.trace_boundary(comp);
        let len = contour.len() as f64;
        if len < min_len || len > max_len {
            continue;
        }
        let points: Vec<Point2<f64>> = contour
            .iter()
            .map(|&(x, y)| Point2::new(x as f64, y as f64))
            .collect();
        let poly = approximate_closed(&points, params.polygonal_approx_rate * perimeter(&points));
        if poly.len() != 4 || !is_convex(&poly) {
            continue;
        }
        let mut quad = [poly[0], poly[1], poly[2], poly[3]];
        if min_side(&quad) < params.min_corner_distance_rate * perimeter(&quad) {
            continue;
        }
        orient_clockwise(&mut quad);
        quads.push(quad);
    }

    let quads = remove_near_duplicates(quads, params.min_marker_distance_rate);
    debug!("{} marker candidates", quads.len());
    quads
}

/// Mean corner distance between two clockwise quads, minimized over the
/// four cyclic alignments.
fn quad_distance(a: &[Point2<f64>; 4], b: &[Point2<f64>; 4]) -> f64 {
    (0..4)
        .map(|shift| (0..4).map(|k| (a[k] - b[(k + shift) % 4]).norm()).sum::<f64>() / 4.0)
        .fold(f64::INFINITY, f64::min)
}

/// Drop the smaller of any two quads closer than `rate` times the smaller
/// perimeter.
fn remove_near_duplicates(quads: Vec<[Point2<f64>; 4]>, rate: f64) -> Vec<[Point2<f64>; 4]> {
    let perims: Vec<f64> = quads.iter().map(|q| perimeter(q)).collect();
    let mut dropped = vec![false; quads.len()];
    for i in 0..quads.len() {
        for j in i + 1..quads.len() {
            if dropped[i] || dropped[j] {
                continue;
            }
            let limit = rate * perims[i].min(perims[j]);
            if quad_distance(&quads[i], &quads[j]) < limit {
                if perims[i] < perims[j] {
                    dropped[i] = true;
                } else {
                    dropped[j] = true;
                }
            }
        }
    }
    quads
        .into_iter()
        .zip(dropped)
        .filter_map(|(q, d)| (!d).then_some(q))
        .collect()
}

/// Detector bound to one dictionary.
#[derive(Clone, Debug)]
pub struct MarkerDetector {
    matcher: Matcher,
    pub params: MarkerDetectorParams,
}

impl MarkerDetector {
    pub fn new(dictionary: Dictionary, params: MarkerDetectorParams) -> Self {
        let max_hamming = params.max_hamming.min(dictionary.max_correction_bits);
        Self {
            matcher: Matcher::new(dictionary, max_hamming),
            params,
        }
    }

    pub fn dictionary(&self) -> Dictionary {
        self.matcher.dictionary()
    }

    fn decode_params(&self) -> DecodeParams {
        DecodeParams {
            max_border_error_rate: self.params.max_border_error_rate,
            min_cell_contrast: self.params.min_cell_contrast,
            cell_margin: self.params.cell_margin.clamp(0.0, 0.45),
        }
    }

    /// Decode one clockwise quad.
    pub fn decode_quad(&self, img: &GrayImage, quad: &[Point2<f64>; 4]) -> Option<MarkerDetection> {
        let n = self.matcher.dictionary().marker_size;
        let view = GrayView::new(img.width() as usize, img.height() as usize, img.as_raw())?;
        let params = self.decode_params();
        let means = cell_means(&view, quad, n + 2, params.cell_margin)?;
        let obs = read_bits(&means, n, &params)?;
        let (id, rotation, hamming, corners) = identify(&obs, &self.matcher, quad)?;
        Some(MarkerDetection {
            id,
            corners,
            hamming,
            rotation,
        })
    }

    /// All markers in the image, one per id (lowest Hamming distance wins),
    /// sorted by id.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, img), fields(w = img.width(), h = img.height()))
    )]
    pub fn detect(&self, img: &GrayImage) -> Vec<MarkerDetection> {
        let mut found: Vec<MarkerDetection> = Vec::new();
        for quad in find_candidates(img, &self.params) {
            let Some(det) = self.decode_quad(img, &quad) else {
                continue;
            };
            match found.iter_mut().find(|d| d.id == det.id) {
                Some(prev) if det.hamming < prev.hamming => *prev = det,
                Some(_) => {}
                None => found.push(det),
            }
        }
        found.sort_by_key(|d| d.id);
        debug!("{} markers decoded", found.len());
        found
    }
}

/// One-shot detection with a fresh [`MarkerDetector`].
pub fn detect_markers(
    img: &GrayImage,
    dictionary: Dictionary,
    params: &MarkerDetectorParams,
) -> Vec<MarkerDetection> {
    MarkerDetector::new(dictionary, params.clone()).detect(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn p(x: f64, y: f64) -> Point2<f64> {
        Point2::new(x, y)
    }

    #[test]
    fn near_duplicates_keep_the_larger_quad() {
        let big = [p(10.0, 10.0), p(50.0, 10.0), p(50.0, 50.0), p(10.0, 50.0)];
        let small = [p(12.0, 11.0), p(49.0, 11.0), p(49.0, 49.0), p(11.0, 49.0)];
        let far = [p(100.0, 10.0), p(140.0, 10.0), p(140.0, 50.0), p(100.0, 50.0)];
        let kept = remove_near_duplicates(vec![small, big, far], 0.05);
        assert_eq!(kept, vec![big, far]);
    }

    #[test]
    fn duplicate_distance_ignores_starting_corner() {
        let a = [p(0.0, 0.0), p(10.0, 0.0), p(10.0, 10.0), p(0.0, 10.0)];
        let b = [a[2], a[3], a[0], a[1]];
        assert!(quad_distance(&a, &b) < 1e-12);
    }

    #[test]
    fn dark_square_becomes_a_clockwise_candidate() {
        let mut img = GrayImage::from_pixel(120, 100, Luma([230]));
        for y in 30..70 {
            for x in 40..80 {
                img.put_pixel(x, y, Luma([15]));
            }
        }
        let quads = find_candidates(&img, &MarkerDetectorParams::default());
        assert_eq!(quads.len(), 1);
        let q = quads[0];
        for corner in [p(40.0, 30.0), p(79.0, 30.0), p(79.0, 69.0), p(40.0, 69.0)] {
            assert!(q.iter().any(|c| (c - corner).norm() < 1.5), "{corner:?} not in {q:?}");
        }
        let cross = (q[1] - q[0]).perp(&(q[2] - q[0]));
        assert!(cross > 0.0);
    }
}
