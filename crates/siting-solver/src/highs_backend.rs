//! HiGHS MIP backend
//!
//! Translates a [`MilpProblem`] into a HiGHS row problem on every call. A
//! start point from an earlier solve of the same formulation is handed to
//! HiGHS as its first incumbent. HiGHS does its own presolve and
//! branch-and-bound; nothing of that is done here.

use std::collections::BTreeMap;
use std::time::Duration;

use highs::{Col, HighsModelStatus, RowProblem, Sense};
use tracing::{debug, warn};

use crate::backend::MilpBackend;
use crate::problem::{ConstraintOp, MilpProblem, Objective};
use crate::solution::Solution;

#[derive(Debug, Clone)]
pub struct HighsBackend {
    /// Tolerance used to accept a time-limited incumbent
    feasibility_tolerance: f64,
    /// Number of HiGHS threads, `None` leaves the engine default
    threads: Option<usize>,
}

impl Default for HighsBackend {
    fn default() -> Self {
        Self {
            feasibility_tolerance: 1e-5,
            threads: None,
        }
    }
}

impl HighsBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feasibility_tolerance(mut self, tol: f64) -> Self {
        self.feasibility_tolerance = tol;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    fn build(&self, problem: &MilpProblem, objective: &Objective) -> (RowProblem, Vec<Col>) {
        let mut pb = RowProblem::new();
        let coefficients = objective.dense(problem.num_variables());

        // Integrality must be set when the column is added
        let cols: Vec<Col> = problem
            .variables()
            .iter()
            .zip(&coefficients)
            .map(|(var, &coef)| pb.add_column_with_integrality(coef, var.lower..=var.upper, var.is_integer()))
            .collect();

        for c in problem.constraints() {
            // HiGHS rejects repeated column indices within a row
            let mut merged: BTreeMap<usize, f64> = BTreeMap::new();
            for &(var, coef) in &c.terms {
                *merged.entry(var.0).or_insert(0.0) += coef;
            }
            let terms: Vec<(Col, f64)> = merged
                .into_iter()
                .filter(|(_, coef)| coef.abs() > 1e-12)
                .map(|(j, coef)| (cols[j], coef))
                .collect();

            let rhs = c.rhs;
            match c.op {
                ConstraintOp::Le => pb.add_row(..=rhs, terms),
                ConstraintOp::Ge => pb.add_row(rhs.., terms),
                ConstraintOp::Eq => pb.add_row(rhs..=rhs, terms),
            }
        }

        (pb, cols)
    }

    fn run(&self, problem: &MilpProblem, objective: &Objective, time_limit: Duration, start: Option<&[f64]>) -> Solution {
        let (pb, cols) = self.build(problem, objective);

        let sense = if objective.minimize { Sense::Minimise } else { Sense::Maximise };
        let mut model = match pb.try_optimise(sense) {
            Ok(model) => model,
            Err(status) => {
                warn!("HiGHS rejected the problem: {:?}", status);
                return Solution::error();
            }
        };
        model.set_option("output_flag", false);
        model.set_option("time_limit", time_limit.as_secs_f64());
        if let Some(threads) = self.threads {
            model.set_option("threads", threads as i32);
        }

        if let Some(start) = start.filter(|s| s.len() == cols.len()) {
            if let Err(status) = model.try_set_solution(Some(start), None, None, None) {
                debug!("HiGHS ignored the start point: {:?}", status);
            }
        }

        let solved = match model.try_solve() {
            Ok(solved) => solved,
            Err(status) => {
                warn!("HiGHS failed to run: {:?}", status);
                return Solution::error();
            }
        };

        let status = solved.status();
        debug!(
            "HiGHS finished with {:?} ({} columns, {} rows, warm: {})",
            status,
            cols.len(),
            problem.num_constraints(),
            start.is_some()
        );

        let columns = match status {
            HighsModelStatus::Optimal | HighsModelStatus::ModelEmpty | HighsModelStatus::ReachedTimeLimit => {
                solved.get_solution().columns().to_vec()
            }
            _ => Vec::new(),
        };
        self.interpret(problem, objective, status, columns)
    }

    /// Map a HiGHS model status and its column values to a [`Solution`]
    fn interpret(
        &self,
        problem: &MilpProblem,
        objective: &Objective,
        status: HighsModelStatus,
        mut values: Vec<f64>,
    ) -> Solution {
        values.resize(problem.num_variables(), 0.0);

        match status {
            HighsModelStatus::Optimal | HighsModelStatus::ModelEmpty => {
                let objective_value = objective.evaluate(&values);
                Solution::optimal(values, objective_value)
            }
            HighsModelStatus::ReachedTimeLimit => {
                // HiGHS reports column values even without an incumbent, so
                // only a point that satisfies the formulation counts
                let violations = problem.violations(&values, self.feasibility_tolerance);
                if violations.is_empty() {
                    let objective_value = objective.evaluate(&values);
                    Solution::time_limit(values, objective_value)
                } else {
                    Solution::no_incumbent(violations)
                }
            }
            // Presolve may not separate the two; without a point there is
            // nothing to record either way
            HighsModelStatus::Infeasible | HighsModelStatus::UnboundedOrInfeasible => Solution::infeasible(),
            HighsModelStatus::Unbounded => Solution::unbounded(),
            other => {
                warn!("HiGHS solver returned non-optimal status: {:?}", other);
                Solution::error()
            }
        }
    }
}

impl MilpBackend for HighsBackend {
    fn optimize(&self, problem: &MilpProblem, objective: &Objective, time_limit: Duration) -> Solution {
        self.run(problem, objective, time_limit, None)
    }

    fn optimize_from(
        &self,
        problem: &MilpProblem,
        objective: &Objective,
        time_limit: Duration,
        start: &[f64],
    ) -> Solution {
        self.run(problem, objective, time_limit, Some(start))
    }

    fn name(&self) -> &'static str {
        "highs"
    }
}
