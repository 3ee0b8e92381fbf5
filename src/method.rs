//! Optimization method interface.

use crate::criteria::{EndCriteria, EndCriteriaType};
use crate::error::Result;
use crate::problem::Problem;

/// An abstract optimization method.
///
/// `minimize` mutates the problem's parameter vector in place and returns
/// the reason the run terminated. Budget exhaustion is a normal return
/// (`MaxIterations`), not an error; `Err` is reserved for invalid inputs and
/// algorithmic invariant violations.
pub trait OptimizationMethod {
    fn minimize(
        &self,
        problem: &mut Problem<'_>,
        end_criteria: &EndCriteria,
    ) -> Result<EndCriteriaType>;
}
