use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

/// Planar projective map `dst ~ H * src`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0] / v[2], v[1] / v[2])
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }
}

/// Translate to the centroid and scale so the mean distance is sqrt(2).
fn normalize_points(pts: &[Point2<f64>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    let n = pts.len() as f64;
    let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), p| (ax + p.x, ay + p.y));
    let (cx, cy) = (sx / n, sy / n);

    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let out = pts
        .iter()
        .map(|p| Point2::new(s * (p.x - cx), s * (p.y - cy)))
        .collect();
    (out, t)
}

/// Undo both normalizations and fix the scale so `h33 == 1`.
fn finish(hn: Matrix3<f64>, t_src: Matrix3<f64>, t_dst: Matrix3<f64>) -> Option<Homography> {
    let h = t_dst.try_inverse()? * hn * t_src;
    let s = h[(2, 2)];
    if s.abs() < 1e-12 || !s.is_finite() {
        return None;
    }
    Some(Homography::new(h / s))
}

/// Estimate `H` with `dst ~ H * src` from at least four correspondences.
///
/// Four points go through the exact 8x8 solve; more use the normalized DLT.
pub fn estimate_homography(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }
    if src.len() == 4 {
        let s: &[Point2<f64>; 4] = src.try_into().ok()?;
        let d: &[Point2<f64>; 4] = dst.try_into().ok()?;
        return homography_from_4pt(s, d);
    }

    let (s, ts) = normalize_points(src);
    let (d, td) = normalize_points(dst);

    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for k in 0..n {
        let (x, y) = (s[k].x, s[k].y);
        let (u, v) = (d[k].x, d[k].y);

        // [ -x -y -1   0  0  0   u*x u*y u ]
        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        // [ 0  0  0  -x -y -1   v*x v*y v ]
        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    // Null vector of A: right singular vector of the smallest singular value.
    let svd = a.svd(false, true);
    let vt = svd.v_t?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|l, r| l.1.total_cmp(r.1))?;
    let h = vt.row(min_idx);
    let hn = Matrix3::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    finish(hn, ts, td)
}

/// Exact homography from four correspondences (`h33 = 1`).
///
/// Corner order must match between `src` and `dst`.
pub fn homography_from_4pt(src: &[Point2<f64>; 4], dst: &[Point2<f64>; 4]) -> Option<Homography> {
    let (s, ts) = normalize_points(src);
    let (d, td) = normalize_points(dst);

    // h11 x + h12 y + h13 - u h31 x - u h32 y = u
    // h21 x + h22 y + h23 - v h31 x - v h32 y = v
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for k in 0..4 {
        let (x, y) = (s[k].x, s[k].y);
        let (u, v) = (d[k].x, d[k].y);

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = r0 + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b)?;
    let hn = Matrix3::new(x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7], 1.0);
    finish(hn, ts, td)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Point2<f64>, b: Point2<f64>, tol: f64) {
        assert!(
            (a.x - b.x).abs() < tol && (a.y - b.y).abs() < tol,
            "expected ({:.6},{:.6}) ~ ({:.6},{:.6}) within {}",
            a.x,
            a.y,
            b.x,
            b.y,
            tol
        );
    }

    fn ground_truth() -> Homography {
        Homography::new(Matrix3::new(
            0.8, 0.05, 120.0, //
            -0.02, 1.1, 80.0, //
            0.0009, -0.0004, 1.0,
        ))
    }

    #[test]
    fn inverse_round_trips_points() {
        let h = ground_truth();
        let inv = h.inverse().expect("invertible");
        for p in [Point2::new(0.0, 0.0), Point2::new(50.0, -20.0), Point2::new(320.0, 200.0)] {
            assert_close(inv.apply(h.apply(p)), p, 1e-8);
        }
    }

    #[test]
    fn four_points_recover_h() {
        let gt = ground_truth();
        let src = [
            Point2::new(0.0, 0.0),
            Point2::new(180.0, 0.0),
            Point2::new(180.0, 130.0),
            Point2::new(0.0, 130.0),
        ];
        let dst = src.map(|p| gt.apply(p));
        let h = homography_from_4pt(&src, &dst).expect("solvable");
        for p in [Point2::new(60.0, 40.0), Point2::new(150.0, 120.0)] {
            assert_close(h.apply(p), gt.apply(p), 1e-6);
        }
    }

    #[test]
    fn dlt_handles_overdetermined_grid() {
        let gt = ground_truth();
        let src: Vec<Point2<f64>> = (0..4)
            .flat_map(|y| (0..5).map(move |x| Point2::new(x as f64 * 0.02, y as f64 * 0.02)))
            .collect();
        let gt = Homography::new(gt.h * Matrix3::new(1000.0, 0.0, 0.0, 0.0, 1000.0, 0.0, 0.0, 0.0, 1.0));
        let dst: Vec<_> = src.iter().map(|&p| gt.apply(p)).collect();
        let h = estimate_homography(&src, &dst).expect("estimate");
        for (s, d) in src.iter().zip(&dst) {
            assert_close(h.apply(*s), *d, 1e-6);
        }
    }

    #[test]
    fn mismatched_or_short_inputs_fail() {
        let src = [Point2::new(0.0, 0.0); 4];
        let dst = [Point2::new(1.0, 1.0); 3];
        assert!(estimate_homography(&src, &dst).is_none());
        assert!(estimate_homography(&src[..3], &dst).is_none());
    }
}
