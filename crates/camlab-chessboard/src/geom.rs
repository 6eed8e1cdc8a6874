use std::f32::consts::PI;

/// Absolute difference between two angles in radians, in `[0, π]`.
pub fn angle_diff_abs(a: f32, b: f32) -> f32 {
    let mut diff = (b - a).rem_euclid(2.0 * PI);
    if diff >= PI {
        diff -= 2.0 * PI;
    }
    diff.abs()
}

/// Angle between an undirected axis (defined modulo π) and a directed
/// vector angle, in `[0, π/2]`.
pub fn axis_vec_diff(axis_angle: f32, vec_angle: f32) -> f32 {
    let d = angle_diff_abs(axis_angle, vec_angle);
    d.min(PI - d)
}

/// Whether two axes (modulo π) are orthogonal within `tolerance`.
pub fn is_orthogonal(a: f32, b: f32, tolerance: f32) -> bool {
    (std::f32::consts::FRAC_PI_2 - axis_vec_diff(a, b)).abs() <= tolerance.abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

    #[test]
    fn orthogonality_ignores_axis_direction() {
        assert!(is_orthogonal(0.0, FRAC_PI_2, 1e-3));
        assert!(is_orthogonal(FRAC_PI_4, -FRAC_PI_4, 1e-3));
        assert!(is_orthogonal(FRAC_PI_4, 3.0 * FRAC_PI_4 + PI, 1e-3));
        assert!(!is_orthogonal(0.0, 0.25, 0.05));
    }

    #[test]
    fn axis_difference_folds_opposite_directions() {
        assert!((axis_vec_diff(0.0, PI) - 0.0).abs() < 1e-6);
        assert!((axis_vec_diff(0.0, 3.0 * FRAC_PI_4) - FRAC_PI_4).abs() < 1e-6);
    }
}
