//! Closed-form intrinsics from plane homographies.

use camlab_core::{Homography, Intrinsics};
use nalgebra::{DMatrix, Matrix3, Point2};

use crate::CalibError;

fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> [f64; 6] {
    [
        h[(0, i)] * h[(0, j)],
        h[(0, i)] * h[(1, j)] + h[(1, i)] * h[(0, j)],
        h[(1, i)] * h[(1, j)],
        h[(2, i)] * h[(0, j)] + h[(0, i)] * h[(2, j)],
        h[(2, i)] * h[(1, j)] + h[(1, i)] * h[(2, j)],
        h[(2, i)] * h[(2, j)],
    ]
}

/// Pixel pre-conditioning: centre on the mean image point and scale to
/// unit size, so `B = K^-T K^-1` is solved on well-scaled numbers.
fn conditioning(image_points: &[Vec<Point2<f64>>]) -> Matrix3<f64> {
    let all = image_points.iter().flatten();
    let n = image_points.iter().map(Vec::len).sum::<usize>().max(1) as f64;
    let (sx, sy) = all.clone().fold((0.0, 0.0), |(ax, ay), p| (ax + p.x, ay + p.y));
    let (cx, cy) = (sx / n, sy / n);
    let scale = all
        .map(|p| (p.x - cx).abs().max((p.y - cy).abs()))
        .fold(0.0_f64, f64::max)
        .max(1.0);
    Matrix3::new(
        1.0 / scale,
        0.0,
        -cx / scale,
        0.0,
        1.0 / scale,
        -cy / scale,
        0.0,
        0.0,
        1.0,
    )
}

/// Zhang's closed form with zero skew enforced as an extra constraint.
pub(crate) fn intrinsics_from_homographies(
    homographies: &[Homography],
    image_points: &[Vec<Point2<f64>>],
) -> Result<Intrinsics, CalibError> {
    let n = conditioning(image_points);
    let n_inv = n.try_inverse().ok_or(CalibError::Degenerate("conditioning"))?;

    let rows = 2 * homographies.len() + 1;
    let mut v = DMatrix::<f64>::zeros(rows, 6);
    for (i, h) in homographies.iter().enumerate() {
        let hn = n * h.h;
        let hn = hn / hn.norm();
        let v12 = v_ij(&hn, 0, 1);
        let v11 = v_ij(&hn, 0, 0);
        let v22 = v_ij(&hn, 1, 1);
        for j in 0..6 {
            v[(2 * i, j)] = v12[j];
            v[(2 * i + 1, j)] = v11[j] - v22[j];
        }
    }
    // B12 = 0  <=>  zero skew
    v[(rows - 1, 1)] = 1.0;

    let svd = v.svd(false, true);
    let vt = svd.v_t.ok_or(CalibError::Degenerate("svd"))?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .ok_or(CalibError::Degenerate("svd"))?;
    let b = vt.row(min_idx);
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    if denom.abs() < 1e-300 || b11.abs() < 1e-300 {
        return Err(CalibError::Degenerate("intrinsic system"));
    }
    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    let alpha2 = lambda / b11;
    let beta2 = lambda * b11 / denom;
    if !(alpha2 > 0.0 && beta2 > 0.0) {
        return Err(CalibError::Degenerate("focal length"));
    }
    let alpha = alpha2.sqrt();
    let beta = beta2.sqrt();
    let u0 = -b13 * alpha2 / lambda;

    let k = n_inv * Matrix3::new(alpha, 0.0, u0, 0.0, beta, v0, 0.0, 0.0, 1.0);
    let intr = Intrinsics::from_matrix(&(k / k[(2, 2)]));
    if ![intr.fx, intr.fy, intr.cx, intr.cy].iter().all(|v| v.is_finite()) {
        return Err(CalibError::Degenerate("non-finite intrinsics"));
    }
    Ok(intr)
}
