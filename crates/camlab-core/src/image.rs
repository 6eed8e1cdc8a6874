/// Borrowed 8-bit grayscale buffer, row-major, `data.len() == width * height`.
#[derive(Clone, Copy, Debug)]
pub struct GrayView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8],
}

impl<'a> GrayView<'a> {
    /// Wrap a raw buffer; `None` when the length does not match the dimensions.
    pub fn new(width: usize, height: usize, data: &'a [u8]) -> Option<Self> {
        (data.len() == width * height).then_some(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// Pixel lookup that returns `None` outside the image.
    #[inline]
    pub fn get_checked(&self, x: i64, y: i64) -> Option<u8> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some(self.data[y as usize * self.width + x as usize])
    }
}

/// Bilinear sample with edge clamping. Coordinates are in pixel units with
/// pixel centers at integer positions.
#[inline]
pub fn sample_bilinear(src: &GrayView<'_>, x: f64, y: f64) -> f64 {
    if src.width == 0 || src.height == 0 {
        return 0.0;
    }
    let max_x = (src.width - 1) as f64;
    let max_y = (src.height - 1) as f64;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(src.width - 1);
    let y1 = (y0 + 1).min(src.height - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = src.get(x0, y0) as f64;
    let p10 = src.get(x1, y0) as f64;
    let p01 = src.get(x0, y1) as f64;
    let p11 = src.get(x1, y1) as f64;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}
