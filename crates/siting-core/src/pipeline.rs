//! One state run: load, build, assemble, then sweep or solve each budget.

use siting_solver::MilpBackend;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::data::{DataSet, InputPaths};
use crate::error::{Result, SitingError};
use crate::instance::{Instance, ScalingConstants};
use crate::model::FacilityModel;
use crate::pareto::{Frontier, ParetoSearch};
use crate::results::ResultSet;
use crate::scalarize::{Outcome, Scalarizer};

/// Everything a run produced, results not yet written
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub scaling: ScalingConstants,
    pub results: ResultSet,
    /// One per budget in sweep mode
    pub frontiers: Vec<Frontier>,
    /// One per budget in fixed-weight mode
    pub fixed: Vec<Outcome>,
}

pub fn load_instance(config: &RunConfig) -> Result<Instance> {
    let paths = InputPaths::in_dir(&config.data_dir, &config.state);
    let data = DataSet::load(&paths, &config.state)?;
    Instance::build(&config.state, &data)
}

pub fn run<B: MilpBackend>(config: &RunConfig, backend: B) -> Result<RunOutput> {
    config.validate()?;
    let instance = load_instance(config)?;
    run_instance(instance, config, backend)
}

pub fn run_instance<B: MilpBackend>(instance: Instance, config: &RunConfig, backend: B) -> Result<RunOutput> {
    let scalarizer = Scalarizer::new(backend)
        .with_time_limit(config.time_limit())
        .with_tolerance(config.open_tolerance);
    info!(
        "Running {} with the {} backend, budgets {:?}",
        instance.state,
        scalarizer.backend().name(),
        config.budgets
    );

    let preset = instance.scaling;
    let mut model = FacilityModel::assemble(instance);
    let scaling = match preset {
        Some(scaling) => scaling,
        None if config.derive_baseline => derive_scaling(&mut model, &scalarizer)?,
        None => return Err(SitingError::MissingBaseline(config.state.clone())),
    };
    info!(
        "Scaling: {:.2} unmet clients, {:.2} total distance",
        scaling.clients, scaling.distance
    );

    let search = ParetoSearch::new(&scalarizer, config.search.clone());
    let mut output = RunOutput {
        scaling,
        results: ResultSet::new(),
        frontiers: Vec::new(),
        fixed: Vec::new(),
    };

    for &k in &config.budgets {
        match config.lambda {
            Some(lambda) => {
                let outcome = search.solve_fixed(&mut model, k, lambda, &scaling, &mut output.results)?;
                output.fixed.push(outcome);
            }
            None => {
                let frontier = search.sweep(&mut model, k, &scaling, &mut output.results)?;
                output.frontiers.push(frontier);
            }
        }
    }

    let degraded = output.results.degraded().count();
    if degraded > 0 {
        warn!("{} solves ended at the time limit", degraded);
    }
    Ok(output)
}

/// Normalizers from the zero-facility solution of the assembled model.
///
/// With no new facility nothing latent is captured, so the unmet demand is
/// the instance total. Zero totals fall back to 1 as in
/// [`ScalingConstants::from_totals`].
pub fn derive_scaling<B: MilpBackend>(model: &mut FacilityModel, scalarizer: &Scalarizer<B>) -> Result<ScalingConstants> {
    let previous = model.budget();
    model.set_budget(0);
    let outcome = scalarizer.solve(model, 0.0, &ScalingConstants::unit(), &mut ResultSet::new())?;
    model.set_budget(previous);

    // Round-off can leave a tiny negative remainder
    let unmet = (model.instance().total_unserved() - outcome.unserved_demand_met).max(0.0);
    let distance = outcome.total_distance.max(0.0);
    info!("Derived baseline for {}: {:.2} unmet, {:.2} distance", model.instance().state, unmet, distance);
    ScalingConstants::from_totals(unmet, distance)
}
