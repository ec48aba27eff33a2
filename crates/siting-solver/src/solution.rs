use std::fmt;

/// The result of optimizing a MILP problem
#[derive(Debug, Clone)]
pub struct Solution {
    /// Solution status
    pub status: SolutionStatus,
    /// Values for each variable (empty when no point is available)
    pub values: Vec<f64>,
    /// Objective value at `values`
    pub objective_value: f64,
    /// Constraint violations of a rejected incumbent
    pub violations: Vec<ConstraintViolation>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionStatus {
    /// An optimal solution was found
    Optimal,
    /// The time limit was hit; `values` hold the best incumbent found
    TimeLimit,
    /// The time limit was hit before any feasible point was found
    NoIncumbent,
    /// The problem is infeasible (no solution exists)
    Infeasible,
    /// The problem is unbounded
    Unbounded,
    /// Solver encountered an error
    Error,
}

/// A row or bound that a candidate point fails, used to reject a
/// time-limited incumbent
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct ConstraintViolation {
    /// Row name, or variable name for bound and integrality failures
    pub constraint: String,
    /// Right-hand side or bound
    pub required: f64,
    /// Left-hand side or variable value at the point
    pub actual: f64,
    pub violation_amount: f64,
    pub description: String,
}

impl SolutionStatus {
    /// Whether the solution carries a usable feasible point
    pub fn has_point(self) -> bool {
        matches!(self, SolutionStatus::Optimal | SolutionStatus::TimeLimit)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SolutionStatus::Optimal => "optimal",
            SolutionStatus::TimeLimit => "time_limit",
            SolutionStatus::NoIncumbent => "no_incumbent",
            SolutionStatus::Infeasible => "infeasible",
            SolutionStatus::Unbounded => "unbounded",
            SolutionStatus::Error => "error",
        }
    }
}

impl fmt::Display for SolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Solution {
    pub fn optimal(values: Vec<f64>, objective_value: f64) -> Self {
        Self {
            status: SolutionStatus::Optimal,
            values,
            objective_value,
            violations: Vec::new(),
        }
    }

    pub fn time_limit(values: Vec<f64>, objective_value: f64) -> Self {
        Self {
            status: SolutionStatus::TimeLimit,
            values,
            objective_value,
            violations: Vec::new(),
        }
    }

    pub fn no_incumbent(violations: Vec<ConstraintViolation>) -> Self {
        Self {
            status: SolutionStatus::NoIncumbent,
            values: Vec::new(),
            objective_value: f64::NAN,
            violations,
        }
    }

    pub fn infeasible() -> Self {
        Self {
            status: SolutionStatus::Infeasible,
            values: Vec::new(),
            objective_value: f64::NAN,
            violations: Vec::new(),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            status: SolutionStatus::Unbounded,
            values: Vec::new(),
            objective_value: f64::NAN,
            violations: Vec::new(),
        }
    }

    pub fn error() -> Self {
        Self {
            status: SolutionStatus::Error,
            values: Vec::new(),
            objective_value: f64::NAN,
            violations: Vec::new(),
        }
    }
}
