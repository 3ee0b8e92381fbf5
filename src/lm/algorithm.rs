//! Levenberg-Marquardt minimization of a sum of squared residuals.
//!
//! The outer loop is the classic MINPACK `lmdif` scheme: factor the
//! Jacobian, search for a damped step inside a trust region, evaluate the
//! trial point, and adapt the radius from the ratio of actual to predicted
//! reduction. Convergence is reported through [`EndCriteriaType`] so
//! callers can distinguish a stationary point from an exhausted budget.

use ndarray::{s, Array1, Array2};

use crate::criteria::{EndCriteria, EndCriteriaType};
use crate::error::{CalOptError, Result};
use crate::lm::qr::qrfac;
use crate::lm::trust_region::lmpar;
use crate::method::OptimizationMethod;
use crate::problem::Problem;
use crate::utils::finite_difference::forward_difference_jacobian;
use crate::utils::norm::{enorm, scaled_norm};

/// Levenberg-Marquardt least-squares minimizer.
///
/// `epsfcn` bounds the relative error of residual evaluations and sets the
/// forward-difference step; `xtol` and `gtol` are the step-size and scaled
/// gradient tolerances. The residual-sum tolerance comes from the
/// [`EndCriteria`] passed to [`minimize`](OptimizationMethod::minimize),
/// as does the evaluation budget.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    epsfcn: f64,
    xtol: f64,
    gtol: f64,
    factor: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            epsfcn: 1.0e-8,
            xtol: 1.0e-8,
            gtol: 1.0e-8,
            factor: 1.0,
        }
    }
}

impl LevenbergMarquardt {
    pub fn new(epsfcn: f64, xtol: f64, gtol: f64) -> Self {
        Self {
            epsfcn,
            xtol,
            gtol,
            factor: 1.0,
        }
    }

    pub fn with_epsfcn(mut self, epsfcn: f64) -> Self {
        self.epsfcn = epsfcn;
        self
    }

    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.xtol = xtol;
        self
    }

    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.gtol = gtol;
        self
    }

    /// Initial trust-region radius as a multiple of the scaled parameter
    /// norm.
    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    fn jacobian(
        &self,
        problem: &mut Problem<'_>,
        x: &Array1<f64>,
        fvec: &Array1<f64>,
        nfev: &mut usize,
    ) -> Result<Array2<f64>> {
        if problem.cost_function().has_analytic_jacobian() {
            let mut jac = Array2::zeros((fvec.len(), x.len()));
            problem.cost_function().jacobian(&mut jac, x)?;
            Ok(jac)
        } else {
            let jac = forward_difference_jacobian(problem, x, fvec, self.epsfcn)?;
            *nfev += x.len();
            Ok(jac)
        }
    }

    fn lmdif(
        &self,
        problem: &mut Problem<'_>,
        mut x: Array1<f64>,
        ftol: f64,
        maxfev: usize,
    ) -> Result<(Array1<f64>, f64, EndCriteriaType)> {
        const P0001: f64 = 1.0e-4;
        let epsmch = f64::EPSILON;

        let n = x.len();
        if n == 0 {
            return Err(CalOptError::InvalidInput(
                "empty parameter vector".to_string(),
            ));
        }
        let mut fvec = problem.values(&x)?;
        let m = fvec.len();
        if m < n {
            return Err(CalOptError::InvalidInput(format!(
                "{} residuals for {} parameters, need at least as many residuals",
                m, n
            )));
        }
        let mut nfev = 1usize;
        let mut fnorm = enorm(&fvec);
        if fnorm == 0.0 {
            // Already an exact root of the residuals.
            return Ok((x, fnorm, EndCriteriaType::StationaryFunctionValue));
        }

        let mut diag = Array1::ones(n);
        let mut xnorm = 0.0;
        let mut delta = 0.0;
        let mut par = 0.0;
        let mut iter = 1usize;

        loop {
            let jac = self.jacobian(problem, &x, &fvec, &mut nfev)?;
            let fac = qrfac(&jac);

            // Scale by the column norms on the first iteration and set the
            // initial radius; afterwards the scale only ever grows.
            if iter == 1 {
                for j in 0..n {
                    diag[j] = if fac.acnorm[j] == 0.0 { 1.0 } else { fac.acnorm[j] };
                }
                xnorm = scaled_norm(&diag, &x);
                delta = if xnorm == 0.0 {
                    self.factor
                } else {
                    self.factor * xnorm
                };
            } else {
                for j in 0..n {
                    diag[j] = diag[j].max(fac.acnorm[j]);
                }
            }

            let qtf = fac.qt_mul(&fvec).slice(s![0..n]).to_owned();
            let mut r = fac.r_upper();

            // Norm of the scaled gradient.
            let mut gnorm = 0.0f64;
            if fnorm != 0.0 {
                for j in 0..n {
                    let l = fac.ipvt[j];
                    if fac.acnorm[l] == 0.0 {
                        continue;
                    }
                    let mut sum = 0.0;
                    for i in 0..=j {
                        sum += r[[i, j]] * (qtf[i] / fnorm);
                    }
                    gnorm = gnorm.max((sum / fac.acnorm[l]).abs());
                }
            }
            if gnorm <= self.gtol {
                return Ok((x, fnorm, EndCriteriaType::ZeroGradientNorm));
            }

            // Inner loop: keep the Jacobian and retry with a smaller radius
            // until a step achieves enough reduction.
            loop {
                let step = lmpar(&mut r, &fac.ipvt, &diag, &qtf, delta, par)?;
                par = step.par;
                let p = step.x.mapv(|v| -v);
                let pnorm = scaled_norm(&diag, &p);
                if iter == 1 {
                    delta = delta.min(pnorm);
                }

                let x_trial = &x + &p;
                let fvec_trial = problem.values(&x_trial)?;
                nfev += 1;
                let fnorm1 = enorm(&fvec_trial);

                let actred = if 0.1 * fnorm1 < fnorm {
                    1.0 - (fnorm1 / fnorm).powi(2)
                } else {
                    -1.0
                };

                // Predicted reduction and directional derivative from the
                // triangular factor: ||J·p|| = ||R·Pᵗp||.
                let mut jp = Array1::zeros(n);
                for j in 0..n {
                    let temp = p[fac.ipvt[j]];
                    for i in 0..=j {
                        jp[i] += r[[i, j]] * temp;
                    }
                }
                let temp1 = enorm(&jp) / fnorm;
                let temp2 = par.sqrt() * pnorm / fnorm;
                let prered = temp1 * temp1 + 2.0 * temp2 * temp2;
                let dirder = -(temp1 * temp1 + temp2 * temp2);

                let ratio = if prered != 0.0 { actred / prered } else { 0.0 };

                // Radius update.
                if ratio <= 0.25 {
                    let mut temp = if actred >= 0.0 {
                        0.5
                    } else {
                        0.5 * dirder / (dirder + 0.5 * actred)
                    };
                    if 0.1 * fnorm1 >= fnorm || temp < 0.1 {
                        temp = 0.1;
                    }
                    delta = temp * delta.min(10.0 * pnorm);
                    par /= temp;
                } else if par == 0.0 || ratio >= 0.75 {
                    delta = 2.0 * pnorm;
                    par *= 0.5;
                }

                let accepted = ratio >= P0001;
                if accepted {
                    x = x_trial;
                    fvec = fvec_trial;
                    fnorm = fnorm1;
                    xnorm = scaled_norm(&diag, &x);
                    iter += 1;
                }

                // Convergence tests.
                let ftol_hit =
                    actred.abs() <= ftol && prered <= ftol && 0.5 * ratio <= 1.0;
                let xtol_hit = delta <= self.xtol * xnorm;
                if ftol_hit && xtol_hit {
                    return Ok((x, fnorm, EndCriteriaType::StationaryPoint));
                }
                if ftol_hit {
                    return Ok((x, fnorm, EndCriteriaType::StationaryFunctionValue));
                }
                if xtol_hit {
                    return Ok((x, fnorm, EndCriteriaType::StationaryPoint));
                }

                // Budget and machine-precision stalls.
                if nfev >= maxfev {
                    return Ok((x, fnorm, EndCriteriaType::MaxIterations));
                }
                if actred.abs() <= epsmch && prered <= epsmch && 0.5 * ratio <= 1.0 {
                    return Ok((x, fnorm, EndCriteriaType::StationaryFunctionAccuracy));
                }
                if delta <= epsmch * xnorm {
                    return Ok((x, fnorm, EndCriteriaType::StationaryPoint));
                }
                if gnorm <= epsmch {
                    return Ok((x, fnorm, EndCriteriaType::ZeroGradientNorm));
                }

                if accepted {
                    break;
                }
            }
        }
    }
}

impl OptimizationMethod for LevenbergMarquardt {
    fn minimize(
        &self,
        problem: &mut Problem<'_>,
        end_criteria: &EndCriteria,
    ) -> Result<EndCriteriaType> {
        problem.reset();
        let x0 = problem.current_value().clone();
        if !problem.constraint().test(&x0) {
            return Err(CalOptError::InvalidInput(
                "initial point violates the constraint".to_string(),
            ));
        }

        let (x, fnorm, status) = self.lmdif(
            problem,
            x0,
            end_criteria.function_epsilon(),
            end_criteria.max_iterations(),
        )?;
        problem.set_function_value(fnorm * fnorm);
        problem.set_current_value(x);
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::NoConstraint;
    use crate::cost::CostFunction;
    use approx::assert_relative_eq;
    use ndarray::array;

    struct LinearFit {
        xs: Vec<f64>,
        ys: Vec<f64>,
    }

    impl CostFunction for LinearFit {
        fn values(&self, p: &Array1<f64>) -> crate::error::Result<Array1<f64>> {
            Ok(self
                .xs
                .iter()
                .zip(&self.ys)
                .map(|(&x, &y)| p[0] * x + p[1] - y)
                .collect())
        }
    }

    struct Rosenbrock;

    impl CostFunction for Rosenbrock {
        fn values(&self, p: &Array1<f64>) -> crate::error::Result<Array1<f64>> {
            Ok(array![10.0 * (p[1] - p[0] * p[0]), 1.0 - p[0]])
        }
    }

    struct RosenbrockAnalytic;

    impl CostFunction for RosenbrockAnalytic {
        fn values(&self, p: &Array1<f64>) -> crate::error::Result<Array1<f64>> {
            Ok(array![10.0 * (p[1] - p[0] * p[0]), 1.0 - p[0]])
        }

        fn jacobian(&self, jac: &mut Array2<f64>, p: &Array1<f64>) -> crate::error::Result<()> {
            jac[[0, 0]] = -20.0 * p[0];
            jac[[0, 1]] = 10.0;
            jac[[1, 0]] = -1.0;
            jac[[1, 1]] = 0.0;
            Ok(())
        }

        fn has_analytic_jacobian(&self) -> bool {
            true
        }
    }

    struct DeadColumn;

    impl CostFunction for DeadColumn {
        fn values(&self, p: &Array1<f64>) -> crate::error::Result<Array1<f64>> {
            // Second parameter never enters the residuals.
            Ok(array![p[0] - 3.0, 2.0 * (p[0] - 3.0)])
        }
    }

    fn solve(
        cost: &dyn CostFunction,
        x0: Array1<f64>,
        criteria: &EndCriteria,
    ) -> (Array1<f64>, f64, EndCriteriaType, usize) {
        let constraint = NoConstraint;
        let mut problem = Problem::new(cost, &constraint, x0).unwrap();
        let method = LevenbergMarquardt::default();
        let status = method.minimize(&mut problem, criteria).unwrap();
        (
            problem.current_value().clone(),
            problem.function_value(),
            status,
            problem.function_evaluation(),
        )
    }

    #[test]
    fn test_linear_fit_recovers_slope_and_intercept() {
        let cost = LinearFit {
            xs: vec![0.0, 1.0, 2.0, 3.0, 4.0],
            ys: vec![3.0, 5.0, 7.0, 9.0, 11.0],
        };
        let criteria = EndCriteria::default();
        let (x, f, status, _) = solve(&cost, array![0.0, 0.0], &criteria);
        assert_relative_eq!(x[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(x[1], 3.0, epsilon = 1e-6);
        assert!(f < 1e-12);
        assert_ne!(status, EndCriteriaType::MaxIterations);
    }

    #[test]
    fn test_rosenbrock_from_standard_start() {
        let criteria = EndCriteria::default();
        let (x, _, status, _) = solve(&Rosenbrock, array![-1.2, 1.0], &criteria);
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-6);
        assert_ne!(status, EndCriteriaType::MaxIterations);
    }

    #[test]
    fn test_analytic_jacobian_path() {
        let criteria = EndCriteria::default();
        let (x, _, _, nfev) = solve(&RosenbrockAnalytic, array![-1.2, 1.0], &criteria);
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-6);
        // No finite-difference evaluations, so far fewer calls than the
        // forward-difference run needs.
        let (_, _, _, nfev_fd) = solve(&Rosenbrock, array![-1.2, 1.0], &criteria);
        assert!(nfev < nfev_fd);
    }

    #[test]
    fn test_evaluation_budget_reports_max_iterations() {
        let criteria = EndCriteria::new(5, 100, 1e-8, 1e-8, 1e-8).unwrap();
        let (_, _, status, nfev) = solve(&Rosenbrock, array![-1.2, 1.0], &criteria);
        assert_eq!(status, EndCriteriaType::MaxIterations);
        // The budget may be overrun by at most one Jacobian evaluation.
        assert!(nfev <= 5 + 2 + 1);
    }

    #[test]
    fn test_dead_parameter_stays_finite() {
        let criteria = EndCriteria::default();
        let (x, f, _, _) = solve(&DeadColumn, array![0.0, 7.0], &criteria);
        assert!(x.iter().all(|v| v.is_finite()));
        assert_relative_eq!(x[0], 3.0, epsilon = 1e-6);
        // The dead parameter is left where it started.
        assert_relative_eq!(x[1], 7.0, epsilon = 1e-6);
        assert!(f < 1e-12);
    }

    #[test]
    fn test_zero_initial_residual_returns_immediately() {
        struct Root;
        impl CostFunction for Root {
            fn values(&self, p: &Array1<f64>) -> crate::error::Result<Array1<f64>> {
                Ok(array![p[0] - 2.0])
            }
        }
        let criteria = EndCriteria::default();
        let (x, f, status, nfev) = solve(&Root, array![2.0], &criteria);
        assert_eq!(status, EndCriteriaType::StationaryFunctionValue);
        assert_eq!(x[0], 2.0);
        assert_eq!(f, 0.0);
        assert_eq!(nfev, 1);
    }

    #[test]
    fn test_underdetermined_system_is_rejected() {
        struct OneResidual;
        impl CostFunction for OneResidual {
            fn values(&self, p: &Array1<f64>) -> crate::error::Result<Array1<f64>> {
                Ok(array![p[0] + p[1]])
            }
        }
        let constraint = NoConstraint;
        let cost = OneResidual;
        let mut problem = Problem::new(&cost, &constraint, array![1.0, 1.0]).unwrap();
        let method = LevenbergMarquardt::default();
        let err = method.minimize(&mut problem, &EndCriteria::default());
        assert!(err.is_err());
    }
}
