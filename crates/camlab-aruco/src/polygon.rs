use nalgebra::{Point2, Vector2};

pub fn perimeter(points: &[Point2<f64>]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let n = points.len();
    (0..n).map(|i| (points[(i + 1) % n] - points[i]).norm()).sum()
}

fn segment_distance(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 < 1e-24 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

/// Douglas-Peucker on the open chain `points[first..=last]`, marking kept
/// indices in `keep`.
fn simplify_chain(points: &[Point2<f64>], first: usize, last: usize, eps: f64, keep: &mut [bool]) {
    let mut stack = vec![(first, last)];
    while let Some((a, b)) = stack.pop() {
        if b <= a + 1 {
            continue;
        }
        let (mut worst, mut worst_d) = (a, -1.0);
        for i in a + 1..b {
            let d = segment_distance(&points[i], &points[a], &points[b]);
            if d > worst_d {
                worst = i;
                worst_d = d;
            }
        }
        if worst_d > eps {
            keep[worst] = true;
            stack.push((a, worst));
            stack.push((worst, b));
        }
    }
}

/// Simplify a closed contour. The curve is split at its first point and
/// the point farthest from it; both halves are simplified independently.
pub fn approximate_closed(points: &[Point2<f64>], eps: f64) -> Vec<Point2<f64>> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }
    let far = (1..n)
        .max_by(|&i, &j| {
            (points[i] - points[0])
                .norm_squared()
                .total_cmp(&(points[j] - points[0]).norm_squared())
        })
        .unwrap_or(n / 2);

    // closing the loop: append the first point after the last
    let mut ring = points.to_vec();
    ring.push(points[0]);
    let mut keep = vec![false; n + 1];
    keep[0] = true;
    keep[far] = true;
    simplify_chain(&ring, 0, far, eps, &mut keep);
    simplify_chain(&ring, far, n, eps, &mut keep);

    (0..n).filter(|&i| keep[i]).map(|i| points[i]).collect()
}

fn cross(o: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    let u: Vector2<f64> = a - o;
    let v: Vector2<f64> = b - o;
    u.x * v.y - u.y * v.x
}

/// Strictly convex with a consistent turn direction.
pub fn is_convex(poly: &[Point2<f64>]) -> bool {
    let n = poly.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0f64;
    for i in 0..n {
        let c = cross(&poly[i], &poly[(i + 1) % n], &poly[(i + 2) % n]);
        if c.abs() < 1e-12 {
            return false;
        }
        if sign == 0.0 {
            sign = c.signum();
        } else if c.signum() != sign {
            return false;
        }
    }
    true
}

/// Reorder a quad so it runs clockwise on screen (y down).
pub fn orient_clockwise(quad: &mut [Point2<f64>; 4]) {
    if cross(&quad[0], &quad[1], &quad[2]) < 0.0 {
        quad.swap(1, 3);
    }
}

pub fn min_side(quad: &[Point2<f64>; 4]) -> f64 {
    (0..4)
        .map(|i| (quad[(i + 1) % 4] - quad[i]).norm())
        .fold(f64::INFINITY, f64::min)
}
