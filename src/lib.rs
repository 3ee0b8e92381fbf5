//! # calopt
//!
//! A nonlinear least-squares engine for model calibration.
//!
//! The crate provides the abstraction layer that lets arbitrary calibration
//! targets be minimized uniformly (traits [`CostFunction`], [`Constraint`],
//! [`OptimizationMethod`] and the [`Problem`] that ties them together) and a
//! MINPACK-style Levenberg-Marquardt trust-region solver as the workhorse
//! method. Convergence is a first-class result: [`minimize`] returns an
//! [`EndCriteriaType`] naming the reason the iteration stopped.
//!
//! [`minimize`]: OptimizationMethod::minimize
//!
//! ## Example
//!
//! ```
//! use calopt::{
//!     CostFunction, EndCriteria, LevenbergMarquardt, NoConstraint, OptimizationMethod, Problem,
//! };
//! use ndarray::{array, Array1};
//!
//! struct Parabola;
//!
//! impl CostFunction for Parabola {
//!     fn values(&self, x: &Array1<f64>) -> calopt::Result<Array1<f64>> {
//!         Ok(array![x[0] * x[0] + x[0] + 1.0])
//!     }
//! }
//!
//! let cost = Parabola;
//! let constraint = NoConstraint;
//! let mut problem = Problem::new(&cost, &constraint, array![-100.0]).unwrap();
//! let status = LevenbergMarquardt::default()
//!     .minimize(&mut problem, &EndCriteria::default())
//!     .unwrap();
//! assert!((problem.current_value()[0] - (-0.5)).abs() < 1e-3);
//! ```

pub mod calibration;
pub mod constraint;
pub mod cost;
pub mod criteria;
pub mod error;
pub mod lm;
pub mod method;
pub mod problem;
pub mod projection;
pub mod utils;

pub use calibration::{CalibratedModel, CalibrationFunction, CalibrationHelper};
pub use constraint::{
    BoundaryConstraint, CompositeConstraint, Constraint, NoConstraint,
    NonhomogeneousBoundaryConstraint, PositiveConstraint,
};
pub use cost::CostFunction;
pub use criteria::{EndCriteria, EndCriteriaType};
pub use error::{CalOptError, Result};
pub use lm::LevenbergMarquardt;
pub use method::OptimizationMethod;
pub use problem::Problem;
pub use projection::{ProjectedConstraint, ProjectedCostFunction, Projection};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
