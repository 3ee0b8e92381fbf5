//! Model calibration on top of the least-squares engine.
//!
//! A pricing model exposes its free parameters through [`CalibratedModel`];
//! each market instrument contributes one weighted residual through
//! [`CalibrationHelper`]. [`CalibrationFunction`] glues the two into a
//! [`CostFunction`] whose objective is the weighted sum of squared
//! calibration errors.

use std::cell::RefCell;

use ndarray::Array1;

use crate::cost::CostFunction;
use crate::error::{CalOptError, Result};

/// A model whose free parameters can be overwritten by the optimizer.
pub trait CalibratedModel {
    /// Push a candidate parameter vector into the model. The model must
    /// reflect exactly this vector until the next call.
    fn set_params(&mut self, params: &Array1<f64>) -> Result<()>;
}

/// One market instrument contributing a residual to the calibration.
pub trait CalibrationHelper<M: CalibratedModel> {
    /// Difference between the model price and the market price, with the
    /// model as currently parameterized.
    fn calibration_error(&self, model: &M) -> Result<f64>;

    /// Weight of this instrument in the objective.
    fn weight(&self) -> f64 {
        1.0
    }
}

/// Weighted sum-of-squares cost over a set of calibration helpers.
///
/// The model is held in a `RefCell` so that `values` can mutate it; after
/// any evaluation the model reflects the last x passed in. Not shareable
/// across concurrently minimizing threads.
pub struct CalibrationFunction<'a, M: CalibratedModel> {
    model: RefCell<&'a mut M>,
    helpers: Vec<&'a dyn CalibrationHelper<M>>,
}

impl<'a, M: CalibratedModel> CalibrationFunction<'a, M> {
    pub fn new(model: &'a mut M, helpers: Vec<&'a dyn CalibrationHelper<M>>) -> Result<Self> {
        if helpers.is_empty() {
            return Err(CalOptError::InvalidInput(
                "calibration requires at least one helper".to_string(),
            ));
        }
        Ok(Self {
            model: RefCell::new(model),
            helpers,
        })
    }

    pub fn helper_count(&self) -> usize {
        self.helpers.len()
    }
}

impl<'a, M: CalibratedModel> CostFunction for CalibrationFunction<'a, M> {
    fn values(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        let mut model = self.model.borrow_mut();
        model.set_params(x)?;
        let mut residuals = Array1::zeros(self.helpers.len());
        for (i, helper) in self.helpers.iter().enumerate() {
            let error = helper.calibration_error(&**model)?;
            residuals[i] = helper.weight().sqrt() * error;
        }
        Ok(residuals)
    }
}
