//! Facility-location MILP.
//!
//! Variables:
//! - `xe[t,e]` served demand of tract t kept at existing facility e
//! - `xn[t,p]` served demand of tract t moved to potential facility p
//! - `v[t,p]`  unserved demand of tract t captured by potential facility p
//! - `y[p]`    1 if potential facility p is opened
//!
//! plus continuous aggregates for the distance and client bookkeeping. The
//! objective is not part of the model; it is supplied on every solve.

use siting_solver::{ConstraintId, ConstraintOp, MilpProblem, VarId};
use tracing::debug;

use crate::instance::{Edge, Instance};

/// Aggregate bookkeeping variables
#[derive(Debug, Clone, Copy)]
pub struct Aggregates {
    /// Travel distance of clients already in treatment
    pub existing_sum_dist: VarId,
    /// Travel distance of newly served clients
    pub new_sum_dist: VarId,
    pub total_dist: VarId,
    /// Unserved demand that becomes served
    pub unserved_clients: VarId,
    /// Served demand moved to a new facility
    pub reassigned_clients: VarId,
    pub reassigned_distance: VarId,
}

#[derive(Debug, Clone)]
pub struct FacilityModel {
    instance: Instance,
    problem: MilpProblem,
    /// Parallel to `instance.existing_edges`
    xe: Vec<VarId>,
    /// Parallel to `instance.served_new_edges`
    xn: Vec<VarId>,
    /// Parallel to `instance.unserved_new_edges`
    v: Vec<VarId>,
    /// Parallel to `instance.potential`
    y: Vec<VarId>,
    aggregates: Aggregates,
    budget_constraint: ConstraintId,
    budget: usize,
    /// Last accepted solution, the start point of the next solve
    incumbent: Option<Vec<f64>>,
}

/// Values of interest read back from a solution vector
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReading {
    pub existing_sum_distance: f64,
    pub new_sum_distance: f64,
    pub total_distance: f64,
    pub unserved_demand_met: f64,
    pub reassigned_clients: f64,
    pub reassigned_distance: f64,
    /// Opened indicator per potential facility
    pub opened: Vec<f64>,
    /// Clients (reassigned plus newly served) per potential facility
    pub potential_clients: Vec<f64>,
    /// Clients kept per existing facility
    pub existing_clients: Vec<f64>,
    /// Served-demand flow leaving each tract
    pub served_by_tract: Vec<f64>,
    /// Unserved-demand flow captured from each tract
    pub captured_by_tract: Vec<f64>,
}

impl FacilityModel {
    /// Build every variable and constraint of `instance` with a budget of
    /// zero new facilities.
    pub fn assemble(instance: Instance) -> Self {
        let mut problem = MilpProblem::new();
        let tracts = &instance.tracts;

        let xe: Vec<VarId> = instance
            .existing_edges
            .iter()
            .map(|e| problem.add_nonneg(format!("xe[{},{}]", tracts[e.tract].id, instance.existing[e.facility].id)))
            .collect();
        let xn: Vec<VarId> = instance
            .served_new_edges
            .iter()
            .map(|e| problem.add_nonneg(format!("xn[{},{}]", tracts[e.tract].id, instance.potential[e.facility].id)))
            .collect();
        let v: Vec<VarId> = instance
            .unserved_new_edges
            .iter()
            .map(|e| problem.add_nonneg(format!("v[{},{}]", tracts[e.tract].id, instance.potential[e.facility].id)))
            .collect();
        let y: Vec<VarId> = instance
            .potential
            .iter()
            .map(|f| problem.add_binary(format!("y[{}]", f.id)))
            .collect();

        let aggregates = Aggregates {
            existing_sum_dist: problem.add_nonneg("existing_sum_dist"),
            new_sum_dist: problem.add_nonneg("new_sum_dist"),
            total_dist: problem.add_nonneg("total_sum_dist"),
            unserved_clients: problem.add_nonneg("unserved_clients"),
            reassigned_clients: problem.add_nonneg("reassigned_clients"),
            reassigned_distance: problem.add_nonneg("reassigned_distance"),
        };

        // Per-tract outgoing flows
        let mut served_terms: Vec<Vec<(VarId, f64)>> = vec![Vec::new(); tracts.len()];
        for (e, &var) in instance.existing_edges.iter().zip(&xe) {
            served_terms[e.tract].push((var, 1.0));
        }
        for (e, &var) in instance.served_new_edges.iter().zip(&xn) {
            served_terms[e.tract].push((var, 1.0));
        }
        let mut captured_terms: Vec<Vec<(VarId, f64)>> = vec![Vec::new(); tracts.len()];
        for (e, &var) in instance.unserved_new_edges.iter().zip(&v) {
            captured_terms[e.tract].push((var, 1.0));
        }

        // Served demand is fully assigned
        for (t, terms) in tracts.iter().zip(&served_terms) {
            if t.served > 0.0 {
                problem.add_constraint(format!("served_demand[{}]", t.id), terms.clone(), ConstraintOp::Eq, t.served);
            }
        }

        // Unserved demand up to its ceiling
        for (t, terms) in tracts.iter().zip(&captured_terms) {
            if t.unserved > 0.0 && !terms.is_empty() {
                problem.add_constraint(format!("unserved_demand[{}]", t.id), terms.clone(), ConstraintOp::Le, t.unserved);
            }
        }

        // Only opened facilities receive flow
        for (e, &var) in instance.served_new_edges.iter().zip(&xn) {
            let t = &tracts[e.tract];
            problem.add_constraint(
                format!("old_demand[{},{}]", t.id, instance.potential[e.facility].id),
                vec![(var, 1.0), (y[e.facility], -t.served)],
                ConstraintOp::Le,
                0.0,
            );
        }
        for (e, &var) in instance.unserved_new_edges.iter().zip(&v) {
            let t = &tracts[e.tract];
            problem.add_constraint(
                format!("new_demand[{},{}]", t.id, instance.potential[e.facility].id),
                vec![(var, 1.0), (y[e.facility], -t.unserved)],
                ConstraintOp::Le,
                0.0,
            );
        }

        // An opened facility forces full capture of its catch basin, by any
        // opened facility
        for (p, basin) in instance.catch_basins.iter().enumerate() {
            for &t in basin {
                let mut terms = captured_terms[t].clone();
                terms.push((y[p], -tracts[t].unserved));
                problem.add_constraint(
                    format!("forced_demand[{},{}]", tracts[t].id, instance.potential[p].id),
                    terms,
                    ConstraintOp::Ge,
                    0.0,
                );
            }
        }

        let budget_constraint = problem.add_constraint("k_cons", budget_terms(&y), ConstraintOp::Le, 0.0);

        // Distance and client bookkeeping
        let weighted = |edges: &[Edge], vars: &[VarId]| -> Vec<(VarId, f64)> {
            edges.iter().zip(vars).map(|(e, &var)| (var, e.distance)).collect()
        };
        let ones = |vars: &[VarId]| -> Vec<(VarId, f64)> { vars.iter().map(|&var| (var, 1.0)).collect() };

        let mut terms = weighted(&instance.existing_edges, &xe);
        terms.extend(weighted(&instance.served_new_edges, &xn));
        terms.push((aggregates.existing_sum_dist, -1.0));
        problem.add_constraint("existing_sum_dist", terms, ConstraintOp::Eq, 0.0);

        let mut terms = weighted(&instance.unserved_new_edges, &v);
        terms.push((aggregates.new_sum_dist, -1.0));
        problem.add_constraint("new_sum_dist", terms, ConstraintOp::Eq, 0.0);

        problem.add_constraint(
            "total_dist",
            vec![
                (aggregates.total_dist, 1.0),
                (aggregates.existing_sum_dist, -1.0),
                (aggregates.new_sum_dist, -1.0),
            ],
            ConstraintOp::Eq,
            0.0,
        );

        let mut terms = ones(&v);
        terms.push((aggregates.unserved_clients, -1.0));
        problem.add_constraint("unserved_clients", terms, ConstraintOp::Eq, 0.0);

        let mut terms = ones(&xn);
        terms.push((aggregates.reassigned_clients, -1.0));
        problem.add_constraint("reassigned_clients", terms, ConstraintOp::Eq, 0.0);

        let mut terms = weighted(&instance.served_new_edges, &xn);
        terms.push((aggregates.reassigned_distance, -1.0));
        problem.add_constraint("reassigned_distance", terms, ConstraintOp::Eq, 0.0);

        debug!(
            "Assembled model for {}: {} variables, {} constraints",
            instance.state,
            problem.num_variables(),
            problem.num_constraints()
        );

        Self {
            instance,
            problem,
            xe,
            xn,
            v,
            y,
            aggregates,
            budget_constraint,
            budget: 0,
            incumbent: None,
        }
    }

    /// Replace the `sum y <= k` constraint. Nothing else in the model changes;
    /// the incumbent is kept only while it opens at most `k` facilities.
    pub fn set_budget(&mut self, k: usize) {
        if k == self.budget && self.problem.constraint(self.budget_constraint).is_some() {
            return;
        }
        self.problem.remove_constraint(self.budget_constraint);
        self.budget_constraint = self
            .problem
            .add_constraint("k_cons", budget_terms(&self.y), ConstraintOp::Le, k as f64);
        self.budget = k;

        let opened = self
            .incumbent
            .as_ref()
            .map(|values| self.y.iter().map(|var| values.get(var.0).copied().unwrap_or(0.0)).sum::<f64>());
        if let Some(opened) = opened.filter(|&n| n > k as f64 + 0.5) {
            debug!("Dropping incumbent with {:.0} opened facilities for k={}", opened, k);
            self.incumbent = None;
        }
    }

    pub fn incumbent(&self) -> Option<&[f64]> {
        self.incumbent.as_deref()
    }

    pub fn set_incumbent(&mut self, values: Vec<f64>) {
        if values.len() == self.problem.num_variables() {
            self.incumbent = Some(values);
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn problem(&self) -> &MilpProblem {
        &self.problem
    }

    pub fn aggregates(&self) -> Aggregates {
        self.aggregates
    }

    pub fn read(&self, values: &[f64]) -> ModelReading {
        let value = |var: VarId| values.get(var.0).copied().unwrap_or(0.0);
        let inst = &self.instance;

        let mut potential_clients = vec![0.0; inst.potential.len()];
        let mut existing_clients = vec![0.0; inst.existing.len()];
        let mut served_by_tract = vec![0.0; inst.tracts.len()];
        let mut captured_by_tract = vec![0.0; inst.tracts.len()];

        for (e, &var) in inst.existing_edges.iter().zip(&self.xe) {
            existing_clients[e.facility] += value(var);
            served_by_tract[e.tract] += value(var);
        }
        for (e, &var) in inst.served_new_edges.iter().zip(&self.xn) {
            potential_clients[e.facility] += value(var);
            served_by_tract[e.tract] += value(var);
        }
        for (e, &var) in inst.unserved_new_edges.iter().zip(&self.v) {
            potential_clients[e.facility] += value(var);
            captured_by_tract[e.tract] += value(var);
        }

        let agg = self.aggregates;
        ModelReading {
            existing_sum_distance: value(agg.existing_sum_dist),
            new_sum_distance: value(agg.new_sum_dist),
            total_distance: value(agg.total_dist),
            unserved_demand_met: value(agg.unserved_clients),
            reassigned_clients: value(agg.reassigned_clients),
            reassigned_distance: value(agg.reassigned_distance),
            opened: self.y.iter().map(|&var| value(var)).collect(),
            potential_clients,
            existing_clients,
            served_by_tract,
            captured_by_tract,
        }
    }
}

fn budget_terms(y: &[VarId]) -> Vec<(VarId, f64)> {
    y.iter().map(|&var| (var, 1.0)).collect()
}
