use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SitingError};
use crate::pareto::SearchConfig;

/// Settings of one state run. Every field has a default so a JSON file may
/// set only what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Directory holding the input tables
    pub data_dir: PathBuf,
    /// Where results are written, `data_dir` when unset
    pub output_dir: Option<PathBuf>,
    pub state: String,
    /// New-facility budgets to run, in order
    pub budgets: Vec<usize>,
    /// Solve a single weight instead of sweeping
    pub lambda: Option<f64>,
    pub time_limit_secs: u64,
    /// Opened indicators above this value count as open
    pub open_tolerance: f64,
    /// Solve the zero-facility model when the baseline table has no row
    pub derive_baseline: bool,
    pub threads: Option<usize>,
    /// Largest row or bound violation of an accepted time-limited incumbent
    pub feasibility_tolerance: f64,
    pub search: SearchConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            output_dir: None,
            state: String::new(),
            budgets: vec![1],
            lambda: None,
            time_limit_secs: 600,
            open_tolerance: 0.01,
            derive_baseline: true,
            threads: None,
            feasibility_tolerance: 1e-5,
            search: SearchConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            SitingError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&source)
    }

    pub fn validate(&self) -> Result<()> {
        if self.state.trim().is_empty() {
            return Err(SitingError::Config("state must not be empty".to_string()));
        }
        if self.budgets.is_empty() {
            return Err(SitingError::Config("at least one budget is required".to_string()));
        }
        if let Some(lambda) = self.lambda {
            if !lambda.is_finite() || !(0.0..=1.0).contains(&lambda) {
                return Err(SitingError::Config(format!("lambda must lie in [0, 1], got {}", lambda)));
            }
        }
        if self.time_limit_secs == 0 {
            return Err(SitingError::Config("time limit must be positive".to_string()));
        }
        if !(self.open_tolerance > 0.0 && self.open_tolerance < 0.5) {
            return Err(SitingError::Config(format!(
                "open tolerance must lie in (0, 0.5), got {}",
                self.open_tolerance
            )));
        }
        if self.threads == Some(0) {
            return Err(SitingError::Config("threads must be positive".to_string()));
        }
        if !(self.feasibility_tolerance.is_finite() && self.feasibility_tolerance > 0.0) {
            return Err(SitingError::Config(format!(
                "feasibility tolerance must be positive, got {}",
                self.feasibility_tolerance
            )));
        }
        self.search.validate()
    }

    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_secs)
    }

    pub fn output_dir(&self) -> &Path {
        self.output_dir.as_deref().unwrap_or(&self.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pareto::CandidateRule;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.budgets, vec![1]);
        assert_eq!(config.time_limit(), Duration::from_secs(600));
        assert!(config.derive_baseline);
        assert_eq!(config.output_dir(), Path::new("."));
        // No state yet
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_partial() {
        let config = RunConfig::from_json(
            r#"{
                "data_dir": "/data",
                "state": "Utah",
                "budgets": [1, 2, 5],
                "search": { "rule": "midpoint" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.state, "Utah");
        assert_eq!(config.budgets, vec![1, 2, 5]);
        assert_eq!(config.output_dir(), Path::new("/data"));
        assert_eq!(config.search.rule, CandidateRule::Midpoint);
        assert_eq!(config.search.max_solves, 200);
        assert_eq!(config.open_tolerance, 0.01);
        assert_eq!(config.feasibility_tolerance, 1e-5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_rejects_bad_types() {
        let err = RunConfig::from_json(r#"{"budgets": "three"}"#).unwrap_err();
        assert!(matches!(err, SitingError::Json(_)), "got {:?}", err);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{"state": "Ohio", "lambda": 0.5, "output_dir": "out"}"#).unwrap();

        let config = RunConfig::from_file(&path).unwrap();
        assert_eq!(config.lambda, Some(0.5));
        assert_eq!(config.output_dir(), Path::new("out"));

        let err = RunConfig::from_file(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, SitingError::Config(_)), "got {:?}", err);
    }

    #[test]
    fn test_validate() {
        let valid = RunConfig {
            state: "Utah".to_string(),
            ..RunConfig::default()
        };
        assert!(valid.validate().is_ok());

        let bad = [
            RunConfig {
                lambda: Some(1.2),
                ..valid.clone()
            },
            RunConfig {
                time_limit_secs: 0,
                ..valid.clone()
            },
            RunConfig {
                open_tolerance: 0.0,
                ..valid.clone()
            },
            RunConfig {
                budgets: Vec::new(),
                ..valid.clone()
            },
            RunConfig {
                threads: Some(0),
                ..valid.clone()
            },
            RunConfig {
                feasibility_tolerance: -1e-6,
                ..valid.clone()
            },
        ];
        for config in bad {
            let err = config.validate().unwrap_err();
            assert!(matches!(err, SitingError::Config(_)), "got {:?}", err);
        }
    }
}
