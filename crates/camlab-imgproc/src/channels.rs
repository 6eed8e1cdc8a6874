use std::str::FromStr;

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::ImgprocError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    /// Index into an `Rgb` pixel.
    pub fn index(self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }
}

impl FromStr for Channel {
    type Err = ImgprocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "r" | "red" => Ok(Channel::Red),
            "g" | "green" => Ok(Channel::Green),
            "b" | "blue" => Ok(Channel::Blue),
            other => Err(ImgprocError::UnknownChannel(other.to_string())),
        }
    }
}

/// Zero one channel in place, pixel by pixel.
pub fn zero_channel(img: &mut RgbImage, channel: Channel) {
    let i = channel.index();
    for px in img.pixels_mut() {
        px.0[i] = 0;
    }
}

/// Split into `[red, green, blue]` planes.
pub fn split_channels(img: &RgbImage) -> [GrayImage; 3] {
    let (w, h) = img.dimensions();
    let plane = |i: usize| GrayImage::from_fn(w, h, |x, y| image::Luma([img.get_pixel(x, y).0[i]]));
    [plane(0), plane(1), plane(2)]
}

/// Merge `[red, green, blue]` planes into one image.
pub fn merge_channels(planes: &[GrayImage; 3]) -> Result<RgbImage, ImgprocError> {
    let dims = planes[0].dimensions();
    if let Some(bad) = planes.iter().find(|p| p.dimensions() != dims) {
        return Err(ImgprocError::DimensionMismatch {
            expected: dims,
            got: bad.dimensions(),
        });
    }
    let [r, g, b] = planes;
    Ok(RgbImage::from_fn(dims.0, dims.1, |x, y| {
        image::Rgb([
            r.get_pixel(x, y).0[0],
            g.get_pixel(x, y).0[0],
            b.get_pixel(x, y).0[0],
        ])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn sample() -> RgbImage {
        RgbImage::from_fn(4, 3, |x, y| Rgb([x as u8 * 10, y as u8 * 20, 200]))
    }

    #[test]
    fn zeroing_touches_only_one_channel() {
        let mut img = sample();
        zero_channel(&mut img, Channel::Red);
        assert!(img.pixels().all(|p| p.0[0] == 0 && p.0[2] == 200));
        assert_eq!(img.get_pixel(0, 2).0[1], 40);
    }

    #[test]
    fn split_then_merge_is_lossless() {
        let img = sample();
        let planes = split_channels(&img);
        assert_eq!(planes[1].get_pixel(3, 2).0[0], 40);
        assert_eq!(merge_channels(&planes).unwrap(), img);
    }

    #[test]
    fn blanking_a_plane_matches_zero_channel() {
        let img = sample();
        let mut planes = split_channels(&img);
        planes[2] = GrayImage::new(4, 3);
        let merged = merge_channels(&planes).unwrap();

        let mut expected = img.clone();
        zero_channel(&mut expected, Channel::Blue);
        assert_eq!(merged, expected);
    }

    #[test]
    fn merge_rejects_mismatched_planes() {
        let planes = [GrayImage::new(4, 3), GrayImage::new(4, 3), GrayImage::new(3, 3)];
        assert!(matches!(
            merge_channels(&planes),
            Err(ImgprocError::DimensionMismatch { got: (3, 3), .. })
        ));
    }

    #[test]
    fn parses_channel_names() {
        assert_eq!("R".parse::<Channel>().unwrap(), Channel::Red);
        assert_eq!("blue".parse::<Channel>().unwrap(), Channel::Blue);
        assert!("alpha".parse::<Channel>().is_err());
    }
}
