//! Flat-file inputs: tract demand, existing clinics, pairwise distances and
//! zero-facility baselines.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SitingError};

pub const TRACT_FILE: &str = "Full_tract_data_output.csv";
pub const CLINIC_FILE: &str = "Methadone_Clinics_2020.csv";
pub const BASELINE_FILE: &str = "k0_Solutions.csv";
pub const EXISTING_DISTANCE_DIR: &str = "Distances/Existing Clinics";
pub const SERVED_DISTANCE_DIR: &str = "Distances/Served Tracts";
pub const UNSERVED_DISTANCE_DIR: &str = "Distances/Unserved Tracts";

/// One row of the tract demand table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TractRecord {
    #[serde(rename = "GEOID")]
    pub geoid: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "Tract_Population")]
    pub population: f64,
    #[serde(rename = "Tract_methadone_served")]
    pub served: f64,
    #[serde(rename = "Tract_methadone_unserved")]
    pub unserved: f64,
    #[serde(rename = "Tract_Lat", default)]
    pub latitude: Option<f64>,
    #[serde(rename = "Tract_Long", default)]
    pub longitude: Option<f64>,
}

/// One row of the existing clinic table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicRecord {
    #[serde(rename = "ClinicID")]
    pub id: String,
    #[serde(rename = "Latitude", default)]
    pub latitude: Option<f64>,
    #[serde(rename = "Longitude", default)]
    pub longitude: Option<f64>,
}

/// One row of the zero-facility baseline table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "Unmet Demand")]
    pub unmet_demand: f64,
    #[serde(rename = "Total Distance")]
    pub total_distance: f64,
    #[serde(rename = "Average Distance", default)]
    pub average_distance: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct DistanceRecord {
    tract: String,
    facility: String,
    distance: f64,
}

/// Pairwise (tract, facility) distances
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistanceTable {
    entries: BTreeMap<(String, String), f64>,
}

impl DistanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tract: impl Into<String>, facility: impl Into<String>, distance: f64) -> Option<f64> {
        self.entries.insert((tract.into(), facility.into()), distance)
    }

    pub fn get(&self, tract: &str, facility: &str) -> Option<f64> {
        self.entries.get(&(tract.to_string(), facility.to_string())).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.entries
            .iter()
            .map(|((tract, facility), &d)| (tract.as_str(), facility.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read a `tract,facility,distance` table; a repeated pair is an error
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut table = Self::new();
        for row in read_records::<DistanceRecord>(reader)? {
            if table.insert(row.tract.clone(), row.facility.clone(), row.distance).is_some() {
                return Err(SitingError::inconsistent(format!(
                    "duplicate distance entry for tract {} and facility {}",
                    row.tract, row.facility
                )));
            }
        }
        Ok(table)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let table = Self::from_reader(open(path)?)?;
        debug!("Loaded {} distances from {}", table.len(), path.display());
        Ok(table)
    }
}

impl FromIterator<(String, String, f64)> for DistanceTable {
    fn from_iter<I: IntoIterator<Item = (String, String, f64)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (tract, facility, d) in iter {
            table.insert(tract, facility, d);
        }
        table
    }
}

/// Where the input tables of one state live
#[derive(Debug, Clone)]
pub struct InputPaths {
    pub tracts: PathBuf,
    pub clinics: PathBuf,
    pub existing_distance: PathBuf,
    pub served_distance: PathBuf,
    pub unserved_distance: PathBuf,
    pub baseline: PathBuf,
}

impl InputPaths {
    /// Conventional layout under a data directory
    pub fn in_dir(data_dir: impl AsRef<Path>, state: &str) -> Self {
        let dir = data_dir.as_ref();
        let per_state = format!("{}.csv", state);
        Self {
            tracts: dir.join(TRACT_FILE),
            clinics: dir.join(CLINIC_FILE),
            existing_distance: dir.join(EXISTING_DISTANCE_DIR).join(&per_state),
            served_distance: dir.join(SERVED_DISTANCE_DIR).join(&per_state),
            unserved_distance: dir.join(UNSERVED_DISTANCE_DIR).join(&per_state),
            baseline: dir.join(BASELINE_FILE),
        }
    }
}

/// All raw tables for one state run
#[derive(Debug, Clone)]
pub struct DataSet {
    pub tracts: Vec<TractRecord>,
    pub clinics: Vec<ClinicRecord>,
    pub existing_distance: DistanceTable,
    pub served_distance: DistanceTable,
    pub unserved_distance: DistanceTable,
    pub baseline: Option<BaselineRecord>,
}

impl DataSet {
    /// Load every table of `state`. The baseline file is optional; a missing
    /// file or a missing row for the state leaves `baseline` empty.
    pub fn load(paths: &InputPaths, state: &str) -> Result<Self> {
        let tracts: Vec<TractRecord> = read_records(open(&paths.tracts)?)?;
        let clinics: Vec<ClinicRecord> = read_records(open(&paths.clinics)?)?;
        let existing_distance = DistanceTable::load(&paths.existing_distance)?;
        let served_distance = DistanceTable::load(&paths.served_distance)?;
        let unserved_distance = DistanceTable::load(&paths.unserved_distance)?;

        let baseline = if paths.baseline.is_file() {
            let rows: Vec<BaselineRecord> = read_records(open(&paths.baseline)?)?;
            rows.into_iter().find(|row| row.state == state)
        } else {
            None
        };

        info!(
            "Loaded {} tracts, {} clinics and {}/{}/{} distances for {}",
            tracts.len(),
            clinics.len(),
            existing_distance.len(),
            served_distance.len(),
            unserved_distance.len(),
            state
        );

        Ok(Self {
            tracts,
            clinics,
            existing_distance,
            served_distance,
            unserved_distance,
            baseline,
        })
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        SitingError::Io(std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))
    })
}

/// Deserialize every row of a headed CSV table
pub fn read_records<T: DeserializeOwned>(reader: impl Read) -> Result<Vec<T>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rows = Vec::new();
    for row in rdr.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}
