//! Small image-processing demos: DFT visualization, Gaussian kernels and
//! per-channel pixel edits, plus the file IO they share.

use std::path::PathBuf;

mod channels;
mod codec;
mod dft;
mod gaussian;

pub use channels::{merge_channels, split_channels, zero_channel, Channel};
pub use codec::{gray_to_f32, load_color, load_gray, resize_square, save_image, to_gray8};
pub use dft::{dft_forward, dft_inverse, magnitude_spectrum, recenter, Spectrum};
pub use gaussian::{gaussian_kernel, GaussianSpec};

/// Single-channel `f32` image.
pub type GrayF32 = image::ImageBuffer<image::Luma<f32>, Vec<f32>>;

#[derive(thiserror::Error, Debug)]
pub enum ImgprocError {
    #[error("image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("channel planes differ in size (expected {expected:?}, got {got:?})")]
    DimensionMismatch { expected: (u32, u32), got: (u32, u32) },

    #[error("unknown channel `{0}` (expected r, g or b)")]
    UnknownChannel(String),
}

/// Rescale to `[0, 1]`. A constant image becomes all zeros.
pub fn normalize_min_max(img: &mut GrayF32) {
    let (min, max) = img
        .pixels()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.0[0]), hi.max(p.0[0]))
        });
    let range = max - min;
    for p in img.pixels_mut() {
        p.0[0] = if range > 0.0 { (p.0[0] - min) / range } else { 0.0 };
    }
}
