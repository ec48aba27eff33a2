use std::time::{Duration, Instant};

use siting_solver::{MilpBackend, Objective, SolutionStatus};
use tracing::{info, warn};

use crate::error::{Result, SitingError};
use crate::instance::ScalingConstants;
use crate::model::FacilityModel;
use crate::results::{FacilityRecord, ResultSet, SummaryRecord};

/// Objective decomposition of one weighted solve
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub lambda: f64,
    pub k: usize,
    pub status: SolutionStatus,
    pub objective_value: f64,
    pub existing_sum_distance: f64,
    pub new_sum_distance: f64,
    pub total_distance: f64,
    pub unserved_demand_met: f64,
    pub reassigned_clients: f64,
    pub reassigned_distance: f64,
    /// Indices of opened potential facilities
    pub opened: Vec<usize>,
}

impl Outcome {
    pub fn is_optimal(&self) -> bool {
        self.status == SolutionStatus::Optimal
    }

    /// (captured demand, existing travel distance) on the normalized scales
    pub fn normalized(&self, scaling: &ScalingConstants) -> (f64, f64) {
        (
            self.unserved_demand_met / scaling.clients,
            self.existing_sum_distance / scaling.distance,
        )
    }
}

/// Solves the model under `lambda * captured - (1 - lambda) * distance`.
pub struct Scalarizer<B> {
    backend: B,
    time_limit: Duration,
    /// Opened indicators above this value count as open
    tolerance: f64,
}

impl<B: MilpBackend> Scalarizer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            time_limit: Duration::from_secs(10 * 60),
            tolerance: 0.01,
        }
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Weighted objective for `lambda`, maximized
    pub fn objective(model: &FacilityModel, lambda: f64, scaling: &ScalingConstants) -> Objective {
        let agg = model.aggregates();
        Objective::maximize(vec![
            (agg.unserved_clients, lambda / scaling.clients),
            (agg.existing_sum_dist, -(1.0 - lambda) / scaling.distance),
        ])
    }

    /// Solve at `lambda` under the model's current budget and append the
    /// summary and facility detail to `results`.
    ///
    /// A time-limited incumbent is accepted and tagged; proven infeasibility
    /// and a timeout without incumbent are errors. The model's incumbent
    /// seeds the solve and is replaced by the accepted point.
    pub fn solve(
        &self,
        model: &mut FacilityModel,
        lambda: f64,
        scaling: &ScalingConstants,
        results: &mut ResultSet,
    ) -> Result<Outcome> {
        if !lambda.is_finite() || !(0.0..=1.0).contains(&lambda) {
            return Err(SitingError::InvalidWeight(lambda));
        }
        let k = model.budget();
        let objective = Self::objective(model, lambda, scaling);

        let start = Instant::now();
        let solution = match model.incumbent() {
            Some(values) => self
                .backend
                .optimize_from(model.problem(), &objective, self.time_limit, values),
            None => self.backend.optimize(model.problem(), &objective, self.time_limit),
        };
        let elapsed = start.elapsed();

        match solution.status {
            SolutionStatus::Optimal => {}
            SolutionStatus::TimeLimit => {
                warn!(
                    "Time limit of {:?} reached at k={}, lambda={:.4}; keeping the incumbent",
                    self.time_limit, k, lambda
                );
            }
            SolutionStatus::NoIncumbent => return Err(SitingError::NoIncumbent { k, lambda }),
            SolutionStatus::Infeasible => return Err(SitingError::Infeasible { k, lambda }),
            status => return Err(SitingError::Solver { status, k, lambda }),
        }

        model.set_incumbent(solution.values.clone());
        let reading = model.read(&solution.values);
        let instance = model.instance();

        let mut opened = Vec::new();
        for (p, &y) in reading.opened.iter().enumerate() {
            if y > self.tolerance && y < 1.0 - self.tolerance {
                warn!(
                    "Opened indicator of {} is {:.4} at k={}, lambda={:.4}",
                    instance.potential[p].id, y, k, lambda
                );
            }
            if y > self.tolerance {
                opened.push(p);
            }
        }

        let outcome = Outcome {
            lambda,
            k,
            status: solution.status,
            objective_value: solution.objective_value,
            existing_sum_distance: reading.existing_sum_distance,
            new_sum_distance: reading.new_sum_distance,
            total_distance: reading.total_distance,
            unserved_demand_met: reading.unserved_demand_met,
            reassigned_clients: reading.reassigned_clients,
            reassigned_distance: reading.reassigned_distance,
            opened,
        };

        info!(
            "k={} lambda={:.4}: captured {:.2}, existing distance {:.2}, {} opened ({:.2?})",
            k,
            lambda,
            outcome.unserved_demand_met,
            outcome.existing_sum_distance,
            outcome.opened.len(),
            elapsed
        );

        let state = instance.state.as_str();
        results.summaries.push(SummaryRecord {
            state: state.to_string(),
            k,
            lambda,
            existing_sum_distance: outcome.existing_sum_distance,
            new_sum_distance: outcome.new_sum_distance,
            reassigned_clients: outcome.reassigned_clients,
            reassigned_distance: outcome.reassigned_distance,
            unserved_demand_met: outcome.unserved_demand_met,
            total_distance: outcome.total_distance,
            objective_value: outcome.objective_value,
            status: outcome.status,
        });
        for &p in &outcome.opened {
            let facility = &instance.potential[p];
            results.opened.push(FacilityRecord::new(
                state,
                k,
                lambda,
                &facility.id,
                reading.potential_clients[p],
                facility.location,
            ));
        }
        for (e, facility) in instance.existing.iter().enumerate() {
            results.existing.push(FacilityRecord::new(
                state,
                k,
                lambda,
                &facility.id,
                reading.existing_clients[e],
                facility.location,
            ));
        }

        Ok(outcome)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::DataSet;
    use crate::instance::Instance;
    use crate::instance::tests::{data_set, tract};
    use siting_solver::{HighsBackend, MilpProblem, Solution};

    const TOL: f64 = 1e-6;

    pub(crate) fn scalarizer() -> Scalarizer<HighsBackend> {
        Scalarizer::new(HighsBackend::new()).with_time_limit(Duration::from_secs(60))
    }

    /// Two tracts, one existing and two potential facilities.
    ///
    /// P1 sits next to A and attracts its served demand; P2 reaches B's large
    /// latent demand.
    pub(crate) fn two_tract_data() -> DataSet {
        data_set(
            vec![tract("A", 10.0, 1.0), tract("B", 0.0, 8.0)],
            &[("A", "E1", 5.0)],
            &[("A", "P1", 1.0)],
            &[("A", "P1", 1.0), ("B", "P2", 2.0)],
        )
    }

    pub(crate) fn two_tract_model(k: usize) -> (FacilityModel, ScalingConstants) {
        let mut model = FacilityModel::assemble(Instance::build("Utah", &two_tract_data()).unwrap());
        model.set_budget(k);
        (model, ScalingConstants::new(9.0, 50.0).unwrap())
    }

    fn opened_ids(model: &FacilityModel, outcome: &Outcome) -> Vec<String> {
        outcome
            .opened
            .iter()
            .map(|&p| model.instance().potential[p].id.clone())
            .collect()
    }

    /// Checks the structural invariants on a solved point
    fn assert_invariants(model: &mut FacilityModel, lambda: f64, scaling: &ScalingConstants) -> Outcome {
        let s = scalarizer();
        let objective = Scalarizer::<HighsBackend>::objective(model, lambda, scaling);
        let solution = s.backend().optimize(model.problem(), &objective, Duration::from_secs(60));
        assert_eq!(solution.status, SolutionStatus::Optimal);
        model.set_incumbent(solution.values.clone());
        let reading = model.read(&solution.values);
        let inst = model.instance();

        // Conservation of served demand
        for (t, tract) in inst.tracts.iter().enumerate() {
            assert!(
                (reading.served_by_tract[t] - tract.served).abs() < TOL,
                "tract {} routes {} of {}",
                tract.id,
                reading.served_by_tract[t],
                tract.served
            );
            assert!(reading.captured_by_tract[t] <= tract.unserved + TOL);
        }
        // No flow into closed facilities
        for (p, &y) in reading.opened.iter().enumerate() {
            if y < 0.5 {
                assert!(reading.potential_clients[p].abs() < TOL, "closed facility {} has flow", p);
            }
        }
        // Coverage forcing
        for (p, basin) in inst.catch_basins.iter().enumerate() {
            if reading.opened[p] > 0.5 {
                for &t in basin {
                    assert!((reading.captured_by_tract[t] - inst.tracts[t].unserved).abs() < TOL);
                }
            }
        }
        // Budget
        let opened = reading.opened.iter().filter(|&&y| y > 0.5).count();
        assert!(opened <= model.budget());

        s.solve(model, lambda, scaling, &mut ResultSet::new()).unwrap()
    }

    #[test]
    fn test_extremes_pick_opposite_facilities() {
        let (mut model, scaling) = two_tract_model(1);
        let s = scalarizer();
        let mut results = ResultSet::new();

        let low = s.solve(&mut model, 0.0, &scaling, &mut results).unwrap();
        println!("{:?}", low);
        assert_eq!(opened_ids(&model, &low), vec!["P1"]);
        assert!((low.existing_sum_distance - 10.0).abs() < TOL);

        let high = s.solve(&mut model, 1.0, &scaling, &mut results).unwrap();
        println!("{:?}", high);
        assert_eq!(opened_ids(&model, &high), vec!["P2"]);
        assert!((high.unserved_demand_met - 8.0).abs() < TOL);
        assert!((high.existing_sum_distance - 50.0).abs() < TOL);
        assert!((high.new_sum_distance - 16.0).abs() < TOL);
        assert!((high.total_distance - 66.0).abs() < TOL);

        // Intermediate weights are never dominated by an extreme
        for lambda in [0.1, 0.25, 0.5, 0.75, 0.9] {
            let mid = s.solve(&mut model, lambda, &scaling, &mut results).unwrap();
            for extreme in [&low, &high] {
                let dominated = extreme.unserved_demand_met >= mid.unserved_demand_met - TOL
                    && extreme.existing_sum_distance <= mid.existing_sum_distance + TOL
                    && (extreme.unserved_demand_met > mid.unserved_demand_met + TOL
                        || extreme.existing_sum_distance < mid.existing_sum_distance - TOL);
                assert!(!dominated, "lambda={} is dominated: {:?}", lambda, mid);
            }
        }
        assert_eq!(results.summaries.len(), 7);
    }

    #[test]
    fn test_monotone_in_lambda() {
        let (mut model, scaling) = two_tract_model(1);
        let s = scalarizer();
        let mut results = ResultSet::new();
        let mut previous: Option<Outcome> = None;

        for i in 0..=10 {
            let lambda = i as f64 / 10.0;
            let outcome = s.solve(&mut model, lambda, &scaling, &mut results).unwrap();
            if let Some(prev) = &previous {
                assert!(outcome.unserved_demand_met >= prev.unserved_demand_met - TOL);
                assert!(outcome.existing_sum_distance >= prev.existing_sum_distance - TOL);
            }
            previous = Some(outcome);
        }
    }

    #[test]
    fn test_invariants_hold_for_every_weight() {
        for k in [0, 1, 2] {
            let (mut model, scaling) = two_tract_model(k);
            for lambda in [0.0, 0.01, 0.5, 0.99, 1.0] {
                let outcome = assert_invariants(&mut model, lambda, &scaling);
                assert!(outcome.opened.len() <= k);
            }
        }
    }

    #[test]
    fn test_zero_budget_serves_nothing_new() {
        let (mut model, scaling) = two_tract_model(0);
        let s = scalarizer();
        let mut results = ResultSet::new();

        for lambda in [0.0, 0.5, 1.0] {
            let outcome = s.solve(&mut model, lambda, &scaling, &mut results).unwrap();
            assert!(outcome.opened.is_empty());
            assert!(outcome.unserved_demand_met.abs() < TOL);
            assert!(outcome.reassigned_clients.abs() < TOL);
            assert!((outcome.existing_sum_distance - 50.0).abs() < TOL);
        }
        assert!(results.opened.is_empty());
        // One existing-facility row per solve, holding all of A's clients
        assert_eq!(results.existing.len(), 3);
        assert!(results.existing.iter().all(|r| (r.clients - 10.0).abs() < TOL));
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let (mut model, scaling) = two_tract_model(1);
        let s = scalarizer();
        let mut results = ResultSet::new();

        assert!(model.incumbent().is_none());
        let first = s.solve(&mut model, 0.3, &scaling, &mut results).unwrap();
        // The second solve starts from the first one's point
        assert!(model.incumbent().is_some());
        let second = s.solve(&mut model, 0.3, &scaling, &mut results).unwrap();

        assert!((first.existing_sum_distance - second.existing_sum_distance).abs() < TOL);
        assert!((first.unserved_demand_met - second.unserved_demand_met).abs() < TOL);
        assert!((first.objective_value - second.objective_value).abs() < TOL);
        assert_eq!(first.opened, second.opened);
    }

    #[test]
    fn test_single_tract_scenario() {
        // One tract: served 10, unserved 5, existing clinic at distance 2 and a
        // potential site at distance 1 that only reaches the latent demand
        let data = data_set(vec![tract("A", 10.0, 5.0)], &[("A", "E1", 2.0)], &[], &[("A", "P", 1.0)]);
        let mut model = FacilityModel::assemble(Instance::build("Utah", &data).unwrap());
        model.set_budget(1);
        let scaling = ScalingConstants::new(5.0, 20.0).unwrap();
        let s = scalarizer();
        let mut results = ResultSet::new();

        let high = s.solve(&mut model, 1.0, &scaling, &mut results).unwrap();
        assert_eq!(high.opened, vec![0]);
        assert!((high.unserved_demand_met - 5.0).abs() < TOL);

        let low = s.solve(&mut model, 0.0, &scaling, &mut results).unwrap();
        assert!((low.existing_sum_distance - 20.0).abs() < TOL);
        assert!(low.reassigned_clients.abs() < TOL);

        // Opened facility detail counts the captured clients
        let opened: Vec<&FacilityRecord> = results.opened.iter().filter(|r| r.lambda == 1.0).collect();
        assert_eq!(opened.len(), 1);
        assert!((opened[0].clients - 5.0).abs() < TOL);
    }

    #[test]
    fn test_single_tract_scenario_with_closer_site() {
        // Same tract, but the potential site also attracts served demand: at
        // lambda = 0 opening it halves the existing clients' travel
        let data = data_set(
            vec![tract("A", 10.0, 5.0)],
            &[("A", "E1", 2.0)],
            &[("A", "P", 1.0)],
            &[("A", "P", 1.0)],
        );
        let mut model = FacilityModel::assemble(Instance::build("Utah", &data).unwrap());
        model.set_budget(1);
        let scaling = ScalingConstants::new(5.0, 20.0).unwrap();
        let s = scalarizer();
        let mut results = ResultSet::new();

        let low = s.solve(&mut model, 0.0, &scaling, &mut results).unwrap();
        assert_eq!(low.opened, vec![0]);
        assert!((low.existing_sum_distance - 10.0).abs() < TOL);
        assert!((low.reassigned_clients - 10.0).abs() < TOL);
        // Coverage forcing: opening for the served flow captures the latent demand too
        assert!((low.unserved_demand_met - 5.0).abs() < TOL);
    }

    #[test]
    fn test_invalid_weight() {
        let (mut model, scaling) = two_tract_model(1);
        let mut results = ResultSet::new();
        for lambda in [-0.1, 1.5, f64::NAN] {
            let err = scalarizer().solve(&mut model, lambda, &scaling, &mut results).unwrap_err();
            assert!(matches!(err, SitingError::InvalidWeight(_)), "got {:?}", err);
        }
        assert!(results.is_empty());
    }

    struct FixedBackend(SolutionStatus);

    impl MilpBackend for FixedBackend {
        fn optimize(&self, problem: &MilpProblem, _objective: &Objective, _time_limit: Duration) -> Solution {
            match self.0 {
                SolutionStatus::TimeLimit => Solution::time_limit(vec![0.0; problem.num_variables()], 0.0),
                SolutionStatus::NoIncumbent => Solution::no_incumbent(Vec::new()),
                SolutionStatus::Infeasible => Solution::infeasible(),
                _ => Solution::error(),
            }
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    #[test]
    fn test_status_mapping() {
        let (mut model, scaling) = two_tract_model(1);
        let mut results = ResultSet::new();

        let outcome = Scalarizer::new(FixedBackend(SolutionStatus::TimeLimit))
            .solve(&mut model, 0.5, &scaling, &mut results)
            .unwrap();
        assert_eq!(outcome.status, SolutionStatus::TimeLimit);
        assert!(!outcome.is_optimal());
        assert_eq!(results.degraded().count(), 1);

        let err = Scalarizer::new(FixedBackend(SolutionStatus::Infeasible))
            .solve(&mut model, 0.5, &scaling, &mut results)
            .unwrap_err();
        assert!(matches!(err, SitingError::Infeasible { k: 1, .. }), "got {:?}", err);

        let err = Scalarizer::new(FixedBackend(SolutionStatus::NoIncumbent))
            .solve(&mut model, 0.5, &scaling, &mut results)
            .unwrap_err();
        assert!(matches!(err, SitingError::NoIncumbent { .. }), "got {:?}", err);

        let err = Scalarizer::new(FixedBackend(SolutionStatus::Error))
            .solve(&mut model, 0.5, &scaling, &mut results)
            .unwrap_err();
        assert!(matches!(err, SitingError::Solver { status: SolutionStatus::Error, .. }), "got {:?}", err);

        // Failed solves leave no trace in the results
        assert_eq!(results.summaries.len(), 1);
    }
}
