//! Cost function contract consumed by the optimizers.
//!
//! A [`CostFunction`] maps a parameter vector to a residual vector and/or a
//! scalar objective. Calibration routines implement `values` (one residual
//! per market instrument); plain function minimization can override `value`
//! directly.

use ndarray::{Array1, Array2};

use crate::error::{CalOptError, Result};

/// A multi-dimensional cost function.
///
/// Implementations must behave as pure functions of `x`, with one sanctioned
/// exception: calibration wrappers may mutate an underlying pricing model as
/// a side effect of `values`, provided the model always reflects the
/// last-evaluated parameter vector.
pub trait CostFunction {
    /// Residual vector at `x`. The objective is the sum of squared residuals.
    fn values(&self, x: &Array1<f64>) -> Result<Array1<f64>>;

    /// Scalar objective at `x`. Defaults to the sum of squared residuals.
    fn value(&self, x: &Array1<f64>) -> Result<f64> {
        let v = self.values(x)?;
        Ok(v.iter().map(|r| r * r).sum())
    }

    /// Gradient of the scalar objective, written into `grad`.
    ///
    /// The default uses central finite differences with a scale-aware step
    /// `h = eps * max(|x_j|, 1)`.
    fn gradient(&self, grad: &mut Array1<f64>, x: &Array1<f64>) -> Result<()> {
        if grad.len() != x.len() {
            return Err(CalOptError::DimensionMismatch(format!(
                "gradient buffer has length {}, expected {}",
                grad.len(),
                x.len()
            )));
        }
        let eps = self.finite_difference_epsilon();
        let mut xp = x.clone();
        for j in 0..x.len() {
            let h = eps * x[j].abs().max(1.0);
            xp[j] = x[j] + h;
            let f_up = self.value(&xp)?;
            xp[j] = x[j] - h;
            let f_down = self.value(&xp)?;
            xp[j] = x[j];
            grad[j] = (f_up - f_down) / (2.0 * h);
        }
        Ok(())
    }

    /// Compute objective and gradient together. The default composes
    /// `gradient` and `value`; override when both fall out of one evaluation.
    fn value_and_gradient(&self, grad: &mut Array1<f64>, x: &Array1<f64>) -> Result<f64> {
        self.gradient(grad, x)?;
        self.value(x)
    }

    /// Analytic Jacobian of the residuals, written into `jac` (m rows of
    /// residuals, n columns of parameters). Only called when
    /// [`has_analytic_jacobian`](Self::has_analytic_jacobian) returns true.
    fn jacobian(&self, _jac: &mut Array2<f64>, _x: &Array1<f64>) -> Result<()> {
        Err(CalOptError::NotImplemented(
            "analytic Jacobian not provided by this cost function".to_string(),
        ))
    }

    /// Whether `jacobian` is implemented. When false the optimizer estimates
    /// the Jacobian by forward differences.
    fn has_analytic_jacobian(&self) -> bool {
        false
    }

    /// Step-size hint for finite-difference derivatives.
    fn finite_difference_epsilon(&self) -> f64 {
        1.0e-8
    }
}
