mod backend;
mod highs_backend;
mod problem;
mod solution;

pub use backend::MilpBackend;
pub use highs_backend::HighsBackend;
pub use problem::{Constraint, ConstraintId, ConstraintOp, MilpProblem, Objective, VarId, VarKind, Variable};
pub use solution::{ConstraintViolation, Solution, SolutionStatus};
