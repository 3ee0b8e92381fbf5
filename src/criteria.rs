//! Convergence criteria and termination types.
//!
//! [`EndCriteria`] holds the iteration caps and tolerances an optimizer
//! consults, together with the run-length state machine that distinguishes
//! the possible termination reasons. Each `check_*` method reports one
//! criterion and writes the corresponding [`EndCriteriaType`] through a
//! mutable reference when it fires; exactly one type is in effect when a
//! `minimize` call returns.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{CalOptError, Result};

/// The reason an optimization run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EndCriteriaType {
    /// No criterion has fired yet.
    None,
    /// The global iteration (or evaluation-budget) cap was hit.
    MaxIterations,
    /// Consecutive iterations moved the parameters by less than the root
    /// tolerance.
    StationaryPoint,
    /// Consecutive iterations changed the objective by less than the
    /// function tolerance.
    StationaryFunctionValue,
    /// The objective reached the function tolerance (positive
    /// optimization), or the function test degraded to machine accuracy.
    StationaryFunctionAccuracy,
    /// The gradient norm dropped below its tolerance.
    ZeroGradientNorm,
    /// Termination for a reason outside the criteria above.
    Unknown,
}

impl std::fmt::Display for EndCriteriaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EndCriteriaType::None => "none",
            EndCriteriaType::MaxIterations => "maximum number of iterations reached",
            EndCriteriaType::StationaryPoint => "stationary point",
            EndCriteriaType::StationaryFunctionValue => "stationary function value",
            EndCriteriaType::StationaryFunctionAccuracy => "stationary function accuracy",
            EndCriteriaType::ZeroGradientNorm => "zero gradient norm",
            EndCriteriaType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Iteration caps and tolerances for optimization termination.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EndCriteria {
    max_iterations: usize,
    max_stationary_state_iterations: usize,
    root_epsilon: f64,
    function_epsilon: f64,
    gradient_norm_epsilon: f64,
}

impl EndCriteria {
    /// Create end criteria. All tolerances must be positive.
    pub fn new(
        max_iterations: usize,
        max_stationary_state_iterations: usize,
        root_epsilon: f64,
        function_epsilon: f64,
        gradient_norm_epsilon: f64,
    ) -> Result<Self> {
        if root_epsilon <= 0.0 {
            return Err(CalOptError::InvalidInput(
                "rootEpsilon must be positive".to_string(),
            ));
        }
        if function_epsilon <= 0.0 {
            return Err(CalOptError::InvalidInput(
                "functionEpsilon must be positive".to_string(),
            ));
        }
        if gradient_norm_epsilon <= 0.0 {
            return Err(CalOptError::InvalidInput(
                "gradientNormEpsilon must be positive".to_string(),
            ));
        }
        Ok(Self {
            max_iterations,
            max_stationary_state_iterations,
            root_epsilon,
            function_epsilon,
            gradient_norm_epsilon,
        })
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn max_stationary_state_iterations(&self) -> usize {
        self.max_stationary_state_iterations
    }

    pub fn root_epsilon(&self) -> f64 {
        self.root_epsilon
    }

    pub fn function_epsilon(&self) -> f64 {
        self.function_epsilon
    }

    pub fn gradient_norm_epsilon(&self) -> f64 {
        self.gradient_norm_epsilon
    }

    /// Global iteration cap.
    pub fn check_max_iterations(&self, iteration: usize, ec_type: &mut EndCriteriaType) -> bool {
        if iteration < self.max_iterations {
            return false;
        }
        *ec_type = EndCriteriaType::MaxIterations;
        true
    }

    /// Run-length test on parameter movement. `stationary_iterations` is the
    /// caller-held count of consecutive quiet iterations; it resets on any
    /// material move and fires once it exceeds the stationary cap,
    /// independently of the global iteration cap.
    pub fn check_stationary_point(
        &self,
        x_old: f64,
        x_new: f64,
        stationary_iterations: &mut usize,
        ec_type: &mut EndCriteriaType,
    ) -> bool {
        if (x_new - x_old).abs() >= self.root_epsilon {
            *stationary_iterations = 0;
            return false;
        }
        *stationary_iterations += 1;
        if *stationary_iterations > self.max_stationary_state_iterations {
            *ec_type = EndCriteriaType::StationaryPoint;
            return true;
        }
        false
    }

    /// Run-length test on objective movement, same machinery as
    /// [`check_stationary_point`](Self::check_stationary_point).
    pub fn check_stationary_function_value(
        &self,
        f_old: f64,
        f_new: f64,
        stationary_iterations: &mut usize,
        ec_type: &mut EndCriteriaType,
    ) -> bool {
        if (f_new - f_old).abs() >= self.function_epsilon {
            *stationary_iterations = 0;
            return false;
        }
        *stationary_iterations += 1;
        if *stationary_iterations > self.max_stationary_state_iterations {
            *ec_type = EndCriteriaType::StationaryFunctionValue;
            return true;
        }
        false
    }

    /// Absolute objective test, meaningful only when the objective is known
    /// to be non-negative (sum of squares).
    pub fn check_stationary_function_accuracy(
        &self,
        f: f64,
        positive_optimization: bool,
        ec_type: &mut EndCriteriaType,
    ) -> bool {
        if !positive_optimization || f >= self.function_epsilon {
            return false;
        }
        *ec_type = EndCriteriaType::StationaryFunctionAccuracy;
        true
    }

    /// Gradient norm test.
    pub fn check_zero_gradient_norm(&self, g_norm: f64, ec_type: &mut EndCriteriaType) -> bool {
        if g_norm >= self.gradient_norm_epsilon {
            return false;
        }
        *ec_type = EndCriteriaType::ZeroGradientNorm;
        true
    }

    /// Aggregate check used by line-search optimizers: ORs the individual
    /// criteria in a fixed order, so the first that fires decides the type.
    #[allow(clippy::too_many_arguments)]
    pub fn check(
        &self,
        iteration: usize,
        stationary_iterations: &mut usize,
        positive_optimization: bool,
        f_old: f64,
        f_new: f64,
        g_norm_new: f64,
        ec_type: &mut EndCriteriaType,
    ) -> bool {
        self.check_max_iterations(iteration, ec_type)
            || self.check_stationary_function_value(f_old, f_new, stationary_iterations, ec_type)
            || self.check_stationary_function_accuracy(f_new, positive_optimization, ec_type)
            || self.check_zero_gradient_norm(g_norm_new, ec_type)
    }
}

impl Default for EndCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            max_stationary_state_iterations: 100,
            root_epsilon: 1.0e-8,
            function_epsilon: 1.0e-8,
            gradient_norm_epsilon: 1.0e-8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_positive_tolerances() {
        assert!(EndCriteria::new(100, 10, 0.0, 1e-8, 1e-8).is_err());
        assert!(EndCriteria::new(100, 10, 1e-8, -1.0, 1e-8).is_err());
        assert!(EndCriteria::new(100, 10, 1e-8, 1e-8, 0.0).is_err());
        assert!(EndCriteria::new(100, 10, 1e-8, 1e-8, 1e-8).is_ok());
    }

    #[test]
    fn test_max_iterations() {
        let ec = EndCriteria::new(10, 5, 1e-8, 1e-8, 1e-8).unwrap();
        let mut t = EndCriteriaType::None;
        assert!(!ec.check_max_iterations(9, &mut t));
        assert_eq!(t, EndCriteriaType::None);
        assert!(ec.check_max_iterations(10, &mut t));
        assert_eq!(t, EndCriteriaType::MaxIterations);
    }

    #[test]
    fn test_stationary_point_run_length() {
        let ec = EndCriteria::new(100, 2, 1e-8, 1e-8, 1e-8).unwrap();
        let mut t = EndCriteriaType::None;
        let mut stat = 0;

        // Two quiet iterations accumulate without firing.
        assert!(!ec.check_stationary_point(1.0, 1.0, &mut stat, &mut t));
        assert!(!ec.check_stationary_point(1.0, 1.0, &mut stat, &mut t));
        assert_eq!(stat, 2);

        // A material move resets the run.
        assert!(!ec.check_stationary_point(1.0, 2.0, &mut stat, &mut t));
        assert_eq!(stat, 0);

        // Three quiet iterations exceed the cap of 2.
        assert!(!ec.check_stationary_point(1.0, 1.0, &mut stat, &mut t));
        assert!(!ec.check_stationary_point(1.0, 1.0, &mut stat, &mut t));
        assert!(ec.check_stationary_point(1.0, 1.0, &mut stat, &mut t));
        assert_eq!(t, EndCriteriaType::StationaryPoint);
    }

    #[test]
    fn test_stationary_function_value() {
        let ec = EndCriteria::new(100, 0, 1e-8, 1e-6, 1e-8).unwrap();
        let mut t = EndCriteriaType::None;
        let mut stat = 0;
        assert!(ec.check_stationary_function_value(1.0, 1.0 + 1e-9, &mut stat, &mut t));
        assert_eq!(t, EndCriteriaType::StationaryFunctionValue);
    }

    #[test]
    fn test_stationary_function_accuracy() {
        let ec = EndCriteria::new(100, 10, 1e-8, 1e-6, 1e-8).unwrap();
        let mut t = EndCriteriaType::None;
        // Only fires for positive optimizations.
        assert!(!ec.check_stationary_function_accuracy(1e-9, false, &mut t));
        assert!(!ec.check_stationary_function_accuracy(1e-3, true, &mut t));
        assert!(ec.check_stationary_function_accuracy(1e-9, true, &mut t));
        assert_eq!(t, EndCriteriaType::StationaryFunctionAccuracy);
    }

    #[test]
    fn test_zero_gradient_norm() {
        let ec = EndCriteria::new(100, 10, 1e-8, 1e-8, 1e-4).unwrap();
        let mut t = EndCriteriaType::None;
        assert!(!ec.check_zero_gradient_norm(1e-3, &mut t));
        assert!(ec.check_zero_gradient_norm(1e-5, &mut t));
        assert_eq!(t, EndCriteriaType::ZeroGradientNorm);
    }

    #[test]
    fn test_aggregate_check_priority() {
        let ec = EndCriteria::new(10, 0, 1e-8, 1e-6, 1e-6).unwrap();
        let mut stat = 0;

        // Max iterations wins over the other criteria.
        let mut t = EndCriteriaType::None;
        assert!(ec.check(10, &mut stat, true, 1.0, 1e-9, 1e-9, &mut t));
        assert_eq!(t, EndCriteriaType::MaxIterations);

        // Otherwise stationary function value fires first.
        let mut t = EndCriteriaType::None;
        let mut stat = 0;
        assert!(ec.check(1, &mut stat, true, 1e-9, 2e-9, 1e-9, &mut t));
        assert_eq!(t, EndCriteriaType::StationaryFunctionValue);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            EndCriteriaType::MaxIterations.to_string(),
            "maximum number of iterations reached"
        );
    }
}
