pub mod config;
pub mod data;
pub mod error;
pub mod instance;
pub mod model;
pub mod pareto;
pub mod pipeline;
pub mod results;
pub mod scalarize;

pub use config::RunConfig;
pub use data::{DataSet, DistanceTable, InputPaths};
pub use error::{Result, SitingError};
pub use instance::{Facility, Instance, InstanceSummary, Location, ScalingConstants, Tract};
pub use model::{FacilityModel, ModelReading};
pub use pareto::{CandidateRule, Frontier, ParetoSearch, SearchConfig};
pub use pipeline::{RunOutput, derive_scaling, load_instance, run, run_instance};
pub use results::{FacilityRecord, ResultSet, ResultWriter, SummaryRecord};
pub use scalarize::{Outcome, Scalarizer};
