//! Finite-difference Jacobian estimation.
//!
//! Forward differences with scale-aware step sizing, charged against the
//! problem's evaluation counter: one residual evaluation per free parameter.

use ndarray::{Array1, Array2};

use crate::error::{CalOptError, Result};
use crate::problem::Problem;

/// Forward-difference Jacobian of the residuals at `x`.
///
/// `fvec` must be the residual vector already evaluated at `x`. The step for
/// coordinate j is `sqrt(max(epsfcn, machine_eps)) * max(|x_j|, 1)`; the
/// `max(|x_j|, 1)` floor keeps the step from collapsing to zero at
/// `x_j = 0`.
pub fn forward_difference_jacobian(
    problem: &mut Problem<'_>,
    x: &Array1<f64>,
    fvec: &Array1<f64>,
    epsfcn: f64,
) -> Result<Array2<f64>> {
    let n = x.len();
    let m = fvec.len();
    let eps = epsfcn.max(f64::EPSILON).sqrt();

    let mut jac = Array2::zeros((m, n));
    let mut xp = x.clone();
    for j in 0..n {
        let h = eps * x[j].abs().max(1.0);
        xp[j] = x[j] + h;
        let shifted = problem.values(&xp)?;
        xp[j] = x[j];
        if shifted.len() != m {
            return Err(CalOptError::DimensionMismatch(format!(
                "residual count changed from {} to {} during Jacobian estimation",
                m,
                shifted.len()
            )));
        }
        for i in 0..m {
            jac[[i, j]] = (shifted[i] - fvec[i]) / h;
        }
    }
    Ok(jac)
}
