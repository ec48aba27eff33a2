//! Result accumulation and the once-per-run CSV flush.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use serde::Serialize;
use siting_solver::SolutionStatus;
use tracing::info;

use crate::error::Result;
use crate::instance::Location;

pub const SUMMARY_FILE: &str = "Hybrid_Results.csv";
pub const OPENED_FILE: &str = "Hybrid_New_Clinics.csv";
pub const EXISTING_FILE: &str = "Hybrid_Existing_Clinics.csv";

/// Objective decomposition of one solve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRecord {
    #[serde(rename = "State")]
    pub state: String,
    pub k: usize,
    pub lambda: f64,
    #[serde(rename = "Existing Sum Distance")]
    pub existing_sum_distance: f64,
    #[serde(rename = "New Sum Distance")]
    pub new_sum_distance: f64,
    #[serde(rename = "Reassigned Clients")]
    pub reassigned_clients: f64,
    #[serde(rename = "Reassigned Distance")]
    pub reassigned_distance: f64,
    #[serde(rename = "Unserved Clients Met")]
    pub unserved_demand_met: f64,
    #[serde(rename = "Total Distance")]
    pub total_distance: f64,
    #[serde(rename = "Objective Value")]
    pub objective_value: f64,
    /// `optimal`, or `time_limit` for an accepted incumbent
    #[serde(rename = "Status")]
    pub status: SolutionStatus,
}

/// Clients at one facility under one solve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilityRecord {
    #[serde(rename = "State")]
    pub state: String,
    pub k: usize,
    pub lambda: f64,
    #[serde(rename = "Facility")]
    pub facility: String,
    #[serde(rename = "Clients")]
    pub clients: f64,
    #[serde(rename = "Latitude")]
    pub latitude: Option<f64>,
    #[serde(rename = "Longitude")]
    pub longitude: Option<f64>,
}

impl FacilityRecord {
    pub fn new(state: &str, k: usize, lambda: f64, facility: &str, clients: f64, location: Option<Location>) -> Self {
        Self {
            state: state.to_string(),
            k,
            lambda,
            facility: facility.to_string(),
            clients,
            latitude: location.map(|l| l.latitude),
            longitude: location.map(|l| l.longitude),
        }
    }
}

/// Append-only accumulator of every record produced during a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub summaries: Vec<SummaryRecord>,
    pub opened: Vec<FacilityRecord>,
    pub existing: Vec<FacilityRecord>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, other: ResultSet) {
        self.summaries.extend(other.summaries);
        self.opened.extend(other.opened);
        self.existing.extend(other.existing);
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty() && self.opened.is_empty() && self.existing.is_empty()
    }

    /// Summaries that came from a time-limited incumbent
    pub fn degraded(&self) -> impl Iterator<Item = &SummaryRecord> {
        self.summaries.iter().filter(|s| s.status != SolutionStatus::Optimal)
    }
}

/// Writes a [`ResultSet`] to the three result tables of a directory.
///
/// Tables are appended to, so several runs can share one directory; the
/// header is written only into a new or empty file.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    dir: PathBuf,
}

impl ResultWriter {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn flush(&self, results: &ResultSet) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let mut summaries: Vec<&SummaryRecord> = results.summaries.iter().collect();
        summaries.sort_by(|a, b| a.k.cmp(&b.k).then(a.lambda.total_cmp(&b.lambda)));
        self.append(SUMMARY_FILE, &summaries)?;

        for (file, rows) in [(OPENED_FILE, &results.opened), (EXISTING_FILE, &results.existing)] {
            let mut rows: Vec<&FacilityRecord> = rows.iter().collect();
            // Stable, so facilities of one solve keep their order
            rows.sort_by(|a, b| a.k.cmp(&b.k).then(a.lambda.total_cmp(&b.lambda)));
            self.append(file, &rows)?;
        }

        info!(
            "Wrote {} summaries, {} opened and {} existing facility rows to {}",
            results.summaries.len(),
            results.opened.len(),
            results.existing.len(),
            self.dir.display()
        );
        Ok(())
    }

    fn append<T: Serialize>(&self, name: &str, rows: &[T]) -> Result<()> {
        let path = self.dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let write_header = file.metadata()?.len() == 0;

        let mut wtr = csv::WriterBuilder::new().has_headers(write_header).from_writer(file);
        for row in rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
