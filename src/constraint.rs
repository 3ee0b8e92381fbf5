//! Constraints on the parameter space.
//!
//! A [`Constraint`] is a stateless admissibility predicate plus per-parameter
//! bound vectors. Constraints compose by conjunction through
//! [`CompositeConstraint`], whose bounds are the coordinate-wise
//! intersection of the bounds of the two operands.

use ndarray::Array1;

use crate::error::{CalOptError, Result};

/// A constraint on a parameter vector.
///
/// Invariant: `lower_bound(x) <= x <= upper_bound(x)` holds coordinate-wise
/// whenever `test(x)` is true.
pub trait Constraint {
    /// Whether `x` is admissible.
    fn test(&self, x: &Array1<f64>) -> bool;

    /// Per-coordinate upper bounds at `x`. Defaults to +inf.
    fn upper_bound(&self, x: &Array1<f64>) -> Array1<f64> {
        Array1::from_elem(x.len(), f64::INFINITY)
    }

    /// Per-coordinate lower bounds at `x`. Defaults to -inf.
    fn lower_bound(&self, x: &Array1<f64>) -> Array1<f64> {
        Array1::from_elem(x.len(), f64::NEG_INFINITY)
    }
}

/// No constraint. All parameter vectors are admissible.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConstraint;

impl Constraint for NoConstraint {
    fn test(&self, _x: &Array1<f64>) -> bool {
        true
    }
}

/// All parameters must be strictly positive.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositiveConstraint;

impl Constraint for PositiveConstraint {
    fn test(&self, x: &Array1<f64>) -> bool {
        x.iter().all(|&v| v > 0.0)
    }

    fn lower_bound(&self, x: &Array1<f64>) -> Array1<f64> {
        Array1::zeros(x.len())
    }
}

/// All parameters must lie in the interval `[low, high]`.
#[derive(Debug, Clone, Copy)]
pub struct BoundaryConstraint {
    low: f64,
    high: f64,
}

impl BoundaryConstraint {
    /// Create a boundary constraint. Fails if `low > high`.
    pub fn new(low: f64, high: f64) -> Result<Self> {
        if low > high {
            return Err(CalOptError::BoundsError(format!(
                "lower bound {} exceeds upper bound {}",
                low, high
            )));
        }
        Ok(Self { low, high })
    }
}

impl Constraint for BoundaryConstraint {
    fn test(&self, x: &Array1<f64>) -> bool {
        x.iter().all(|&v| v >= self.low && v <= self.high)
    }

    fn upper_bound(&self, x: &Array1<f64>) -> Array1<f64> {
        Array1::from_elem(x.len(), self.high)
    }

    fn lower_bound(&self, x: &Array1<f64>) -> Array1<f64> {
        Array1::from_elem(x.len(), self.low)
    }
}

/// Per-parameter bound vectors `low[i] <= x[i] <= high[i]`.
#[derive(Debug, Clone)]
pub struct NonhomogeneousBoundaryConstraint {
    low: Array1<f64>,
    high: Array1<f64>,
}

impl NonhomogeneousBoundaryConstraint {
    /// Create a pointwise boundary constraint. The bound vectors must have
    /// equal lengths and satisfy `low <= high` coordinate-wise.
    pub fn new(low: Array1<f64>, high: Array1<f64>) -> Result<Self> {
        if low.len() != high.len() {
            return Err(CalOptError::DimensionMismatch(format!(
                "lower bounds have length {}, upper bounds {}",
                low.len(),
                high.len()
            )));
        }
        for (i, (&lo, &hi)) in low.iter().zip(high.iter()).enumerate() {
            if lo > hi {
                return Err(CalOptError::BoundsError(format!(
                    "lower bound {} exceeds upper bound {} at index {}",
                    lo, hi, i
                )));
            }
        }
        Ok(Self { low, high })
    }
}

impl Constraint for NonhomogeneousBoundaryConstraint {
    fn test(&self, x: &Array1<f64>) -> bool {
        x.len() == self.low.len()
            && x.iter()
                .zip(self.low.iter().zip(self.high.iter()))
                .all(|(&v, (&lo, &hi))| v >= lo && v <= hi)
    }

    fn upper_bound(&self, _x: &Array1<f64>) -> Array1<f64> {
        self.high.clone()
    }

    fn lower_bound(&self, _x: &Array1<f64>) -> Array1<f64> {
        self.low.clone()
    }
}

/// Conjunction of two constraints.
///
/// `test` is the AND of the operands; bounds are intersected coordinate-wise
/// (maximum of lower bounds, minimum of upper bounds).
pub struct CompositeConstraint<'a> {
    first: &'a dyn Constraint,
    second: &'a dyn Constraint,
}

impl<'a> CompositeConstraint<'a> {
    pub fn new(first: &'a dyn Constraint, second: &'a dyn Constraint) -> Self {
        Self { first, second }
    }
}

impl Constraint for CompositeConstraint<'_> {
    fn test(&self, x: &Array1<f64>) -> bool {
        self.first.test(x) && self.second.test(x)
    }

    fn upper_bound(&self, x: &Array1<f64>) -> Array1<f64> {
        let a = self.first.upper_bound(x);
        let b = self.second.upper_bound(x);
        a.iter().zip(b.iter()).map(|(&u, &v)| u.min(v)).collect()
    }

    fn lower_bound(&self, x: &Array1<f64>) -> Array1<f64> {
        let a = self.first.lower_bound(x);
        let b = self.second.lower_bound(x);
        a.iter().zip(b.iter()).map(|(&u, &v)| u.max(v)).collect()
    }
}
