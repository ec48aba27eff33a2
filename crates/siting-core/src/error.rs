use siting_solver::SolutionStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SitingError {
    #[error("Data inconsistency: {0}")]
    DataInconsistency(String),
    #[error("Model is infeasible for k={k}, lambda={lambda}")]
    Infeasible { k: usize, lambda: f64 },
    #[error("Time limit reached without an incumbent for k={k}, lambda={lambda}")]
    NoIncumbent { k: usize, lambda: f64 },
    #[error("Solver returned {status} for k={k}, lambda={lambda}")]
    Solver {
        status: SolutionStatus,
        k: usize,
        lambda: f64,
    },
    #[error("Invalid weight {0}: lambda must lie in [0, 1]")]
    InvalidWeight(f64),
    #[error("No baseline row for state {0}")]
    MissingBaseline(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SitingError {
    pub(crate) fn inconsistent(msg: impl Into<String>) -> Self {
        SitingError::DataInconsistency(msg.into())
    }
}

pub type Result<T, E = SitingError> = std::result::Result<T, E>;
