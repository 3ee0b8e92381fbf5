//! Numerical utilities shared by the optimizers.

pub mod finite_difference;
pub mod norm;

pub use finite_difference::forward_difference_jacobian;
pub use norm::{enorm, scaled_norm};
