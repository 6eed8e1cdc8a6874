use std::path::{Path, PathBuf};

use calib_targets_aruco::Dictionary;
use image::{GrayImage, Luma};
use log::info;

use crate::MarkerError;

/// Square marker image: black border of `border_bits` cells around the
/// `n x n` code, black for set bits. `side_px` is the full image side.
pub fn render_marker(
    dictionary: &Dictionary,
    id: u32,
    side_px: u32,
    border_bits: u32,
) -> Result<GrayImage, MarkerError> {
    let code = *dictionary
        .codes
        .get(id as usize)
        .ok_or(MarkerError::IdOutOfRange {
            id,
            count: dictionary.codes.len(),
        })?;
    let n = dictionary.marker_size;
    let cells = n as u32 + 2 * border_bits;
    if side_px < cells {
        return Err(MarkerError::TooSmall { side_px, cells });
    }

    let b = border_bits as usize;
    let img = GrayImage::from_fn(side_px, side_px, |px, py| {
        let cx = (px as u64 * cells as u64 / side_px as u64) as usize;
        let cy = (py as u64 * cells as u64 / side_px as u64) as usize;
        let inner = cx >= b && cy >= b && cx < b + n && cy < b + n;
        let black = !inner || (code >> ((cy - b) * n + (cx - b))) & 1 == 1;
        Luma([if black { 0 } else { 255 }])
    });
    Ok(img)
}

/// Write markers `0..count` as `<prefix><id>.<ext>` into `dir`.
pub fn generate_marker_set(
    dictionary: &Dictionary,
    count: u32,
    side_px: u32,
    dir: impl AsRef<Path>,
    prefix: &str,
    ext: &str,
) -> Result<Vec<PathBuf>, MarkerError> {
    let dir = dir.as_ref();
    let mut written = Vec::with_capacity(count as usize);
    for id in 0..count {
        let img = render_marker(dictionary, id, side_px, 1)?;
        let path = dir.join(format!("{prefix}{id}.{ext}"));
        img.save(&path).map_err(|source| MarkerError::Image {
            path: path.clone(),
            source,
        })?;
        written.push(path);
    }
    info!(
        "wrote {} {} markers to {}",
        written.len(),
        dictionary.name,
        dir.display()
    );
    Ok(written)
}
