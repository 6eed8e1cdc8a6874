use serde::{Deserialize, Serialize};

use crate::{normalize_min_max, GrayF32};

/// Parameters of a synthetic 2D Gaussian image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussianSpec {
    pub width: u32,
    pub height: u32,
    /// Mean column.
    pub ux: i32,
    /// Mean row.
    pub uy: i32,
    pub sigma_x: f32,
    pub sigma_y: f32,
    pub amplitude: f32,
}

impl Default for GaussianSpec {
    fn default() -> Self {
        Self::centered(256, 256, 10.0, 10.0)
    }
}

impl GaussianSpec {
    pub fn centered(width: u32, height: u32, sigma_x: f32, sigma_y: f32) -> Self {
        Self {
            width,
            height,
            ux: (width / 2) as i32,
            uy: (height / 2) as i32,
            sigma_x,
            sigma_y,
            amplitude: 1.0,
        }
    }
}

/// `A * exp(-((c - ux)^2 / (2 sx^2) + (r - uy)^2 / (2 sy^2)))`, normalized to `[0, 1]`.
pub fn gaussian_kernel(spec: &GaussianSpec) -> GrayF32 {
    let two_sx2 = 2.0 * spec.sigma_x * spec.sigma_x;
    let two_sy2 = 2.0 * spec.sigma_y * spec.sigma_y;
    let mut out = GrayF32::from_fn(spec.width, spec.height, |c, r| {
        let dx = c as f32 - spec.ux as f32;
        let dy = r as f32 - spec.uy as f32;
        image::Luma([spec.amplitude * (-(dx * dx / two_sx2 + dy * dy / two_sy2)).exp()])
    });
    normalize_min_max(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn peak_at_mean_and_unit_range() {
        let img = gaussian_kernel(&GaussianSpec::default());
        assert_eq!(img.dimensions(), (256, 256));
        assert_relative_eq!(img.get_pixel(128, 128).0[0], 1.0);
        let min = img.pixels().map(|p| p.0[0]).fold(f32::INFINITY, f32::min);
        assert_relative_eq!(min, 0.0);
        assert!(img.get_pixel(128, 118).0[0] < img.get_pixel(128, 123).0[0]);
    }

    #[test]
    fn anisotropic_sigmas_stretch_the_blob() {
        let spec = GaussianSpec::centered(64, 64, 12.0, 3.0);
        let img = gaussian_kernel(&spec);
        let along_x = img.get_pixel(32 + 6, 32).0[0];
        let along_y = img.get_pixel(32, 32 + 6).0[0];
        assert!(along_x > along_y);
    }

    #[test]
    fn off_center_mean_is_honored() {
        let spec = GaussianSpec {
            ux: 5,
            uy: 40,
            ..GaussianSpec::centered(50, 50, 4.0, 4.0)
        };
        let img = gaussian_kernel(&spec);
        assert_relative_eq!(img.get_pixel(5, 40).0[0], 1.0);
    }
}
