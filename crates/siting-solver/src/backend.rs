use std::time::Duration;

use crate::problem::{MilpProblem, Objective};
use crate::solution::Solution;

/// A MILP engine treated as an oracle.
///
/// Implementations must not mutate the formulation; the caller owns it and
/// may re-optimize it under a different objective right after.
pub trait MilpBackend {
    /// Optimize `problem` under `objective`, giving up after `time_limit`.
    ///
    /// On timeout the best incumbent is returned with
    /// [`crate::SolutionStatus::TimeLimit`] if one exists.
    fn optimize(&self, problem: &MilpProblem, objective: &Objective, time_limit: Duration) -> Solution;

    /// Like [`MilpBackend::optimize`], seeded with a known point of the same
    /// formulation. Engines without hot starts ignore `start`.
    fn optimize_from(
        &self,
        problem: &MilpProblem,
        objective: &Objective,
        time_limit: Duration,
        start: &[f64],
    ) -> Solution {
        let _ = start;
        self.optimize(problem, objective, time_limit)
    }

    /// Short engine name for logs
    fn name(&self) -> &'static str;
}

impl<B: MilpBackend + ?Sized> MilpBackend for &B {
    fn optimize(&self, problem: &MilpProblem, objective: &Objective, time_limit: Duration) -> Solution {
        (**self).optimize(problem, objective, time_limit)
    }

    fn optimize_from(
        &self,
        problem: &MilpProblem,
        objective: &Objective,
        time_limit: Duration,
        start: &[f64],
    ) -> Solution {
        (**self).optimize_from(problem, objective, time_limit, start)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<B: MilpBackend + ?Sized> MilpBackend for Box<B> {
    fn optimize(&self, problem: &MilpProblem, objective: &Objective, time_limit: Duration) -> Solution {
        (**self).optimize(problem, objective, time_limit)
    }

    fn optimize_from(
        &self,
        problem: &MilpProblem,
        objective: &Objective,
        time_limit: Duration,
        start: &[f64],
    ) -> Solution {
        (**self).optimize_from(problem, objective, time_limit, start)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
