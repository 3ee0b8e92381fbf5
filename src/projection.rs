//! Parameter projection: excluding fixed parameters from the free space.
//!
//! A [`Projection`] is a bijection between a full parameter vector and the
//! reduced vector of its non-fixed entries. [`ProjectedCostFunction`] and
//! [`ProjectedConstraint`] wrap a cost function or constraint so that an
//! optimizer sees only the reduced space; a fixed parameter therefore never
//! receives a Jacobian column or a trust-region update.

use ndarray::{Array1, Array2};

use crate::constraint::Constraint;
use crate::cost::CostFunction;
use crate::error::{CalOptError, Result};

/// Fixes a subset of parameters at given values.
#[derive(Debug, Clone)]
pub struct Projection {
    fixed: Vec<bool>,
    fixed_values: Array1<f64>,
    free_count: usize,
}

impl Projection {
    /// Create a projection from the full-space values and a fixed-mask.
    ///
    /// `fixed_values` supplies the values at which masked coordinates are
    /// held; its free entries are ignored.
    pub fn new(fixed_values: Array1<f64>, fixed: Vec<bool>) -> Result<Self> {
        if fixed.len() != fixed_values.len() {
            return Err(CalOptError::DimensionMismatch(format!(
                "fixed mask has length {}, values {}",
                fixed.len(),
                fixed_values.len()
            )));
        }
        let free_count = fixed.iter().filter(|&&f| !f).count();
        Ok(Self {
            fixed,
            fixed_values,
            free_count,
        })
    }

    /// Number of parameters in the full space.
    pub fn full_size(&self) -> usize {
        self.fixed.len()
    }

    /// Number of free parameters.
    pub fn free_size(&self) -> usize {
        self.free_count
    }

    /// Extract the free entries of a full vector.
    pub fn project(&self, full: &Array1<f64>) -> Result<Array1<f64>> {
        if full.len() != self.fixed.len() {
            return Err(CalOptError::DimensionMismatch(format!(
                "expected full vector of length {}, got {}",
                self.fixed.len(),
                full.len()
            )));
        }
        Ok(full
            .iter()
            .zip(self.fixed.iter())
            .filter(|(_, &f)| !f)
            .map(|(&v, _)| v)
            .collect())
    }

    /// Splice a reduced vector back into the full space, restoring the
    /// fixed coordinates exactly.
    pub fn include(&self, reduced: &Array1<f64>) -> Result<Array1<f64>> {
        if reduced.len() != self.free_count {
            return Err(CalOptError::DimensionMismatch(format!(
                "expected reduced vector of length {}, got {}",
                self.free_count,
                reduced.len()
            )));
        }
        let mut full = self.fixed_values.clone();
        let mut k = 0;
        for (i, &is_fixed) in self.fixed.iter().enumerate() {
            if !is_fixed {
                full[i] = reduced[k];
                k += 1;
            }
        }
        Ok(full)
    }
}

/// A cost function restricted to the free parameters of a projection.
pub struct ProjectedCostFunction<'a> {
    cost_function: &'a dyn CostFunction,
    projection: Projection,
}

impl<'a> ProjectedCostFunction<'a> {
    pub fn new(cost_function: &'a dyn CostFunction, projection: Projection) -> Self {
        Self {
            cost_function,
            projection,
        }
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }
}

impl CostFunction for ProjectedCostFunction<'_> {
    fn values(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        let full = self.projection.include(x)?;
        self.cost_function.values(&full)
    }

    fn value(&self, x: &Array1<f64>) -> Result<f64> {
        let full = self.projection.include(x)?;
        self.cost_function.value(&full)
    }

    fn jacobian(&self, jac: &mut Array2<f64>, x: &Array1<f64>) -> Result<()> {
        let full = self.projection.include(x)?;
        let m = jac.nrows();
        let mut full_jac = Array2::zeros((m, self.projection.full_size()));
        self.cost_function.jacobian(&mut full_jac, &full)?;
        let mut k = 0;
        for (j, &is_fixed) in self.projection.fixed.iter().enumerate() {
            if !is_fixed {
                jac.column_mut(k).assign(&full_jac.column(j));
                k += 1;
            }
        }
        Ok(())
    }

    fn has_analytic_jacobian(&self) -> bool {
        self.cost_function.has_analytic_jacobian()
    }

    fn finite_difference_epsilon(&self) -> f64 {
        self.cost_function.finite_difference_epsilon()
    }
}

/// A constraint restricted to the free parameters of a projection.
pub struct ProjectedConstraint<'a> {
    constraint: &'a dyn Constraint,
    projection: Projection,
}

impl<'a> ProjectedConstraint<'a> {
    pub fn new(constraint: &'a dyn Constraint, projection: Projection) -> Self {
        Self {
            constraint,
            projection,
        }
    }
}

impl Constraint for ProjectedConstraint<'_> {
    fn test(&self, x: &Array1<f64>) -> bool {
        match self.projection.include(x) {
            Ok(full) => self.constraint.test(&full),
            Err(_) => false,
        }
    }

    fn upper_bound(&self, x: &Array1<f64>) -> Array1<f64> {
        match self.projection.include(x) {
            Ok(full) => self
                .projection
                .project(&self.constraint.upper_bound(&full))
                .unwrap_or_else(|_| Array1::from_elem(x.len(), f64::INFINITY)),
            Err(_) => Array1::from_elem(x.len(), f64::INFINITY),
        }
    }

    fn lower_bound(&self, x: &Array1<f64>) -> Array1<f64> {
        match self.projection.include(x) {
            Ok(full) => self
                .projection
                .project(&self.constraint.lower_bound(&full))
                .unwrap_or_else(|_| Array1::from_elem(x.len(), f64::NEG_INFINITY)),
            Err(_) => Array1::from_elem(x.len(), f64::NEG_INFINITY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_project_include_round_trip() {
        let p = Projection::new(array![10.0, 20.0, 30.0, 40.0], vec![true, false, true, false])
            .unwrap();
        assert_eq!(p.full_size(), 4);
        assert_eq!(p.free_size(), 2);

        let reduced = array![1.0, 2.0];
        let full = p.include(&reduced).unwrap();
        assert_eq!(full, array![10.0, 1.0, 30.0, 2.0]);

        // project(include(r)) == r
        assert_eq!(p.project(&full).unwrap(), reduced);
    }

    #[test]
    fn test_include_project_preserves_fixed_coordinates() {
        let p = Projection::new(array![10.0, 0.0, 30.0], vec![true, false, true]).unwrap();
        let x = array![99.0, 7.0, -3.0];
        let round_trip = p.include(&p.project(&x).unwrap()).unwrap();
        // Fixed coordinates come back as the projection's fixed values,
        // bit-for-bit; the free coordinate survives untouched.
        assert_eq!(round_trip, array![10.0, 7.0, 30.0]);
    }

    #[test]
    fn test_dimension_validation() {
        assert!(Projection::new(array![1.0], vec![true, false]).is_err());

        let p = Projection::new(array![1.0, 2.0], vec![true, false]).unwrap();
        assert!(p.project(&array![1.0]).is_err());
        assert!(p.include(&array![1.0, 2.0]).is_err());
    }

    struct SumSquares;

    impl CostFunction for SumSquares {
        fn values(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
            Ok(x.clone())
        }
    }

    #[test]
    fn test_projected_cost_function() {
        let cost = SumSquares;
        let p = Projection::new(array![3.0, 0.0], vec![true, false]).unwrap();
        let projected = ProjectedCostFunction::new(&cost, p);

        // Reduced x = [4]; full x = [3, 4]; objective = 9 + 16.
        let v = projected.value(&array![4.0]).unwrap();
        assert_relative_eq!(v, 25.0, epsilon = 1e-14);

        let r = projected.values(&array![4.0]).unwrap();
        assert_eq!(r, array![3.0, 4.0]);
    }

    #[test]
    fn test_projected_constraint() {
        let positive = crate::constraint::PositiveConstraint;
        let p = Projection::new(array![1.0, 0.0], vec![true, false]).unwrap();
        let projected = ProjectedConstraint::new(&positive, p);

        assert!(projected.test(&array![2.0]));
        // Fixed coordinate is positive, so admissibility hinges on the free one.
        assert!(!projected.test(&array![-2.0]));
    }
}
