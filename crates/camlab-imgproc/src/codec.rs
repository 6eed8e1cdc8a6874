//! Image file IO and pixel-format conversions.

use std::path::Path;

use image::{DynamicImage, GrayImage, Luma, RgbImage};
use log::debug;

use crate::{GrayF32, ImgprocError};

fn open(path: &Path) -> Result<DynamicImage, ImgprocError> {
    let img = image::open(path).map_err(|source| ImgprocError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(
        "loaded {} ({}x{})",
        path.display(),
        img.width(),
        img.height()
    );
    Ok(img)
}

pub fn load_color(path: impl AsRef<Path>) -> Result<RgbImage, ImgprocError> {
    Ok(open(path.as_ref())?.to_rgb8())
}

pub fn load_gray(path: impl AsRef<Path>) -> Result<GrayImage, ImgprocError> {
    Ok(open(path.as_ref())?.to_luma8())
}

/// Save any `image` buffer; the format follows the file extension.
pub fn save_image<I>(img: &I, path: impl AsRef<Path>) -> Result<(), ImgprocError>
where
    I: Clone + Into<DynamicImage>,
{
    let path = path.as_ref();
    let dynamic: DynamicImage = img.clone().into();
    dynamic.save(path).map_err(|source| ImgprocError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("wrote {}", path.display());
    Ok(())
}

/// `[0, 255]` bytes to `[0, 1]` floats.
pub fn gray_to_f32(img: &GrayImage) -> GrayF32 {
    GrayF32::from_fn(img.width(), img.height(), |x, y| {
        Luma([img.get_pixel(x, y).0[0] as f32 / 255.0])
    })
}

/// `[0, 1]` floats to bytes; values outside the range saturate.
pub fn to_gray8(img: &GrayF32) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        Luma([(img.get_pixel(x, y).0[0] * 255.0).round().clamp(0.0, 255.0) as u8])
    })
}

/// Resize to a square side, used by the DFT demo.
pub fn resize_square(img: &GrayImage, side: u32) -> GrayImage {
    image::imageops::resize(img, side, side, image::imageops::FilterType::Triangle)
}
