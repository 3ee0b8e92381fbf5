//! Optimization problem: cost function, constraint, and the live
//! parameter vector.
//!
//! A [`Problem`] is created per calibration call with an initial guess,
//! handed to an optimizer as `&mut`, mutated in place on every accepted
//! step, and read back through [`current_value`](Problem::current_value) /
//! [`function_value`](Problem::function_value) afterwards. Evaluation
//! counters feed convergence budgets and calibration diagnostics.

use ndarray::Array1;

use crate::constraint::Constraint;
use crate::cost::CostFunction;
use crate::error::{CalOptError, Result};

/// A constrained optimization problem.
pub struct Problem<'a> {
    cost_function: &'a dyn CostFunction,
    constraint: &'a dyn Constraint,
    current_value: Array1<f64>,
    function_value: f64,
    function_evaluation: usize,
    gradient_evaluation: usize,
}

impl std::fmt::Debug for Problem<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Problem")
            .field("current_value", &self.current_value)
            .field("function_value", &self.function_value)
            .field("function_evaluation", &self.function_evaluation)
            .field("gradient_evaluation", &self.gradient_evaluation)
            .finish_non_exhaustive()
    }
}

impl<'a> Problem<'a> {
    /// Create a problem from a cost function, a constraint, and an initial
    /// guess. The guess must satisfy the constraint.
    pub fn new(
        cost_function: &'a dyn CostFunction,
        constraint: &'a dyn Constraint,
        initial_value: Array1<f64>,
    ) -> Result<Self> {
        if !constraint.test(&initial_value) {
            return Err(CalOptError::InvalidInput(
                "initial guess violates the constraint".to_string(),
            ));
        }
        Ok(Self {
            cost_function,
            constraint,
            current_value: initial_value,
            function_value: f64::NAN,
            function_evaluation: 0,
            gradient_evaluation: 0,
        })
    }

    /// Zero the evaluation counters and forget the cached function value.
    pub fn reset(&mut self) {
        self.function_evaluation = 0;
        self.gradient_evaluation = 0;
        self.function_value = f64::NAN;
    }

    /// Scalar objective at `x`, counted as one function evaluation.
    pub fn value(&mut self, x: &Array1<f64>) -> Result<f64> {
        self.function_evaluation += 1;
        self.cost_function.value(x)
    }

    /// Residual vector at `x`, counted as one function evaluation.
    pub fn values(&mut self, x: &Array1<f64>) -> Result<Array1<f64>> {
        self.function_evaluation += 1;
        self.cost_function.values(x)
    }

    /// Gradient at `x`, counted as one gradient evaluation.
    pub fn gradient(&mut self, grad: &mut Array1<f64>, x: &Array1<f64>) -> Result<()> {
        self.gradient_evaluation += 1;
        self.cost_function.gradient(grad, x)
    }

    pub fn cost_function(&self) -> &dyn CostFunction {
        self.cost_function
    }

    pub fn constraint(&self) -> &dyn Constraint {
        self.constraint
    }

    /// The live parameter vector.
    pub fn current_value(&self) -> &Array1<f64> {
        &self.current_value
    }

    pub fn set_current_value(&mut self, x: Array1<f64>) {
        self.current_value = x;
    }

    /// Objective at the current parameters, as recorded by the optimizer.
    pub fn function_value(&self) -> f64 {
        self.function_value
    }

    pub fn set_function_value(&mut self, value: f64) {
        self.function_value = value;
    }

    /// Number of residual/objective evaluations since the last reset.
    pub fn function_evaluation(&self) -> usize {
        self.function_evaluation
    }

    /// Number of gradient evaluations since the last reset.
    pub fn gradient_evaluation(&self) -> usize {
        self.gradient_evaluation
    }
}
