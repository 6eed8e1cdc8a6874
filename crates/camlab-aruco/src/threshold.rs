//! Binarization for candidate search and bit reading.

use image::{GrayImage, Luma};

/// Summed-area table with a zero first row and column.
struct Integral {
    stride: usize,
    sums: Vec<u64>,
}

impl Integral {
    fn new(img: &GrayImage) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let stride = w + 1;
        let mut sums = vec![0u64; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0u64;
            for x in 0..w {
                row += img.get_pixel(x as u32, y as u32)[0] as u64;
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self { stride, sums }
    }

    /// Sum over `[x0, x1) x [y0, y1)`.
    #[inline]
    fn rect(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> u64 {
        let s = self.stride;
        self.sums[y1 * s + x1] + self.sums[y0 * s + x0] - self.sums[y0 * s + x1] - self.sums[y1 * s + x0]
    }
}

/// Inverted adaptive mean threshold: a pixel is foreground (255) when it is
/// at least `c` darker than the mean of the `window x window` box around it.
/// The box is clipped at the image border.
pub fn adaptive_threshold_mean(img: &GrayImage, window: u32, c: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut out = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }
    let integral = Integral::new(img);
    let r = (window.max(3) / 2) as usize;
    let (wu, hu) = (w as usize, h as usize);

    for y in 0..hu {
        let y0 = y.saturating_sub(r);
        let y1 = (y + r + 1).min(hu);
        for x in 0..wu {
            let x0 = x.saturating_sub(r);
            let x1 = (x + r + 1).min(wu);
            let area = ((x1 - x0) * (y1 - y0)) as f32;
            let mean = integral.rect(x0, y0, x1, y1) as f32 / area;
            let v = img.get_pixel(x as u32, y as u32)[0] as f32;
            if v <= mean - c {
                out.put_pixel(x as u32, y as u32, Luma([255]));
            }
        }
    }
    out
}

/// Otsu threshold over a handful of samples (cell means).
///
/// Degenerate inputs fall back to the midpoint of the observed range.
pub(crate) fn otsu_threshold(samples: &[u8]) -> u8 {
    if samples.is_empty() {
        return 127;
    }
    let (min_v, max_v) = samples
        .iter()
        .fold((255u8, 0u8), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if min_v == max_v {
        return min_v;
    }

    let mut hist = [0u32; 256];
    for &v in samples {
        hist[v as usize] += 1;
    }
    if hist.iter().filter(|&&h| h > 0).count() <= 2 {
        return ((min_v as u16 + max_v as u16) / 2) as u8;
    }

    let total = samples.len() as f64;
    let sum_total: f64 = hist.iter().enumerate().map(|(i, &h)| i as f64 * h as f64).sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127u8;
    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }
        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;
        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }
    best_t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dark_square_edges_become_foreground() {
        let mut img = GrayImage::from_pixel(60, 60, Luma([220]));
        for y in 20..40 {
            for x in 20..40 {
                img.put_pixel(x, y, Luma([20]));
            }
        }
        let bin = adaptive_threshold_mean(&img, 23, 7.0);
        assert_eq!(bin.get_pixel(20, 20)[0], 255);
        assert_eq!(bin.get_pixel(39, 30)[0], 255);
        assert_eq!(bin.get_pixel(5, 5)[0], 0);
        assert_eq!(bin.get_pixel(45, 30)[0], 0);
    }

    #[test]
    fn flat_image_has_no_foreground() {
        let img = GrayImage::from_pixel(16, 9, Luma([90]));
        let bin = adaptive_threshold_mean(&img, 23, 7.0);
        assert!(bin.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn otsu_splits_two_clusters() {
        let samples = [10, 12, 15, 11, 200, 210, 205, 190, 14];
        let t = otsu_threshold(&samples);
        assert!((15..190).contains(&t));
        assert_eq!(otsu_threshold(&[7, 7, 7]), 7);
        assert_eq!(otsu_threshold(&[0, 200]), 100);
    }
}
