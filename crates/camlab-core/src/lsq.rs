//! Helpers shared by the `levenberg-marquardt` problems in the other crates.

use levenberg_marquardt::TerminationReason;
use nalgebra::{DMatrix, DVector};

/// Residual used for a point that cannot be projected (behind the camera).
/// Large enough that the trust region rejects the step.
pub const UNPROJECTABLE_RESIDUAL: f64 = 1e6;

/// Central-difference Jacobian of `f` at `x`, one column per parameter.
///
/// The step for parameter `j` is `rel_step * max(|x_j|, 1)`. `None` when
/// `x` is empty or `f` is undefined at a probe point.
pub fn central_difference<F>(x: &DVector<f64>, rel_step: f64, mut f: F) -> Option<DMatrix<f64>>
where
    F: FnMut(&DVector<f64>) -> Option<DVector<f64>>,
{
    let mut probe = x.clone();
    let mut jac: Option<DMatrix<f64>> = None;
    for j in 0..x.len() {
        let h = rel_step * x[j].abs().max(1.0);
        probe[j] = x[j] + h;
        let plus = f(&probe)?;
        probe[j] = x[j] - h;
        let minus = f(&probe)?;
        probe[j] = x[j];

        let jac = jac.get_or_insert_with(|| DMatrix::zeros(plus.len(), x.len()));
        jac.set_column(j, &((plus - minus) / (2.0 * h)));
    }
    jac
}

/// Whether the solver stopped at a usable point.
///
/// Running out of evaluations or hitting machine precision still leaves the
/// best parameters found in the problem; user and numerical failures and
/// misuse do not.
pub fn usable_termination(termination: &TerminationReason) -> bool {
    termination.was_successful()
        || matches!(
            termination,
            TerminationReason::LostPatience | TerminationReason::NoImprovementPossible(_)
        )
}
