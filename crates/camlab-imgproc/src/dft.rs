//! 2D discrete Fourier transform and spectrum visualization.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::{normalize_min_max, GrayF32};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Complex-valued image, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Spectrum {
    pub width: usize,
    pub height: usize,
    pub data: Vec<Complex<f32>>,
}

impl Spectrum {
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> Complex<f32> {
        self.data[y * self.width + x]
    }
}

/// Run `row_fft` over every row, then `col_fft` over every column.
fn transform_2d(
    data: &mut [Complex<f32>],
    width: usize,
    height: usize,
    row_fft: &dyn Fft<f32>,
    col_fft: &dyn Fft<f32>,
) {
    row_fft.process(data);

    let mut column = vec![Complex::default(); height];
    for x in 0..width {
        for (y, c) in column.iter_mut().enumerate() {
            *c = data[y * width + x];
        }
        col_fft.process(&mut column);
        for (y, c) in column.iter().enumerate() {
            data[y * width + x] = *c;
        }
    }
}

/// Forward DFT of a real image with complex output (no scaling).
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img), fields(width = img.width(), height = img.height()))
)]
pub fn dft_forward(img: &GrayF32) -> Spectrum {
    let (width, height) = (img.width() as usize, img.height() as usize);
    let mut data: Vec<Complex<f32>> = img.pixels().map(|p| Complex::new(p.0[0], 0.0)).collect();
    if width > 0 && height > 0 {
        let mut planner = FftPlanner::new();
        let rows = planner.plan_fft_forward(width);
        let cols = planner.plan_fft_forward(height);
        transform_2d(&mut data, width, height, rows.as_ref(), cols.as_ref());
    }
    Spectrum {
        width,
        height,
        data,
    }
}

/// Inverse DFT keeping the real part, scaled by `1 / (width * height)`.
pub fn dft_inverse(spectrum: &Spectrum) -> GrayF32 {
    let (width, height) = (spectrum.width, spectrum.height);
    let mut data = spectrum.data.clone();
    if width > 0 && height > 0 {
        let mut planner = FftPlanner::new();
        let rows = planner.plan_fft_inverse(width);
        let cols = planner.plan_fft_inverse(height);
        transform_2d(&mut data, width, height, rows.as_ref(), cols.as_ref());
    }
    let scale = 1.0 / (width * height).max(1) as f32;
    GrayF32::from_fn(width as u32, height as u32, |x, y| {
        image::Luma([data[y as usize * width + x as usize].re * scale])
    })
}

/// `ln(1 + |F|)`, min-max normalized to `[0, 1]` and recentered so the
/// zero frequency sits in the middle.
pub fn magnitude_spectrum(spectrum: &Spectrum) -> GrayF32 {
    let mut out = GrayF32::from_fn(spectrum.width as u32, spectrum.height as u32, |x, y| {
        image::Luma([(1.0 + spectrum.at(x as usize, y as usize).norm()).ln()])
    });
    normalize_min_max(&mut out);
    recenter(&mut out);
    out
}

/// Swap diagonal quadrants of size `(w / 2) x (h / 2)`.
///
/// For odd sizes the last row and column are left in place.
pub fn recenter(img: &mut GrayF32) {
    let cx = img.width() / 2;
    let cy = img.height() / 2;
    for y in 0..cy {
        for x in 0..cx {
            // top-left <-> bottom-right
            let a = *img.get_pixel(x, y);
            let b = *img.get_pixel(x + cx, y + cy);
            img.put_pixel(x, y, b);
            img.put_pixel(x + cx, y + cy, a);

            // top-right <-> bottom-left
            let a = *img.get_pixel(x + cx, y);
            let b = *img.get_pixel(x, y + cy);
            img.put_pixel(x + cx, y, b);
            img.put_pixel(x, y + cy, a);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Luma;

    fn ramp(w: u32, h: u32) -> GrayF32 {
        GrayF32::from_fn(w, h, |x, y| Luma([((x * 7 + y * 3) % 11) as f32 / 10.0]))
    }

    #[test]
    fn forward_then_inverse_restores_input() {
        let img = ramp(12, 9);
        let back = dft_inverse(&dft_forward(&img));
        for (a, b) in img.pixels().zip(back.pixels()) {
            assert_relative_eq!(a.0[0], b.0[0], epsilon = 1e-4);
        }
    }

    #[test]
    fn dc_term_is_sum_of_pixels() {
        let img = ramp(8, 8);
        let sum: f32 = img.pixels().map(|p| p.0[0]).sum();
        let f = dft_forward(&img);
        assert_relative_eq!(f.at(0, 0).re, sum, epsilon = 1e-3);
        assert_relative_eq!(f.at(0, 0).im, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn recenter_swaps_quadrants_on_even_size() {
        let mut img = GrayF32::from_fn(4, 2, |x, y| Luma([(y * 4 + x) as f32]));
        recenter(&mut img);
        let got: Vec<f32> = img.pixels().map(|p| p.0[0]).collect();
        assert_eq!(got, vec![6.0, 7.0, 4.0, 5.0, 2.0, 3.0, 0.0, 1.0]);
    }

    #[test]
    fn recenter_leaves_last_row_and_column_on_odd_size() {
        let mut img = GrayF32::from_fn(3, 3, |x, y| Luma([(y * 3 + x) as f32]));
        recenter(&mut img);
        let got: Vec<f32> = img.pixels().map(|p| p.0[0]).collect();
        assert_eq!(got, vec![4.0, 3.0, 2.0, 1.0, 0.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn spectrum_of_constant_image_peaks_at_center() {
        let img = GrayF32::from_pixel(8, 8, Luma([0.5]));
        let mag = magnitude_spectrum(&dft_forward(&img));
        assert_relative_eq!(mag.get_pixel(4, 4).0[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(mag.get_pixel(0, 0).0[0], 0.0, epsilon = 1e-6);
    }
}
