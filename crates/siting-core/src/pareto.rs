//! Weighted-sum frontier search over the scalarization weight.
//!
//! Starting from the two extreme weights, each interval between two solved
//! outcomes is tried at one candidate weight. A candidate that finds a new
//! supported point splits the interval; otherwise the interval is closed.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use siting_solver::MilpBackend;
use tracing::{debug, info, warn};

use crate::error::{Result, SitingError};
use crate::instance::ScalingConstants;
use crate::model::FacilityModel;
use crate::results::ResultSet;
use crate::scalarize::{Outcome, Scalarizer};

/// How the candidate weight of an interval is chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateRule {
    /// Weight at which both bounds score the same, midpoint if undefined
    #[default]
    EqualWeight,
    Midpoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub lambda_lo: f64,
    pub lambda_hi: f64,
    pub rule: CandidateRule,
    /// Minimum normalized difference for two outcomes to count as distinct
    pub resolution: f64,
    /// Intervals narrower than this are not searched
    pub min_lambda_gap: f64,
    pub max_solves: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            lambda_lo: 0.01,
            lambda_hi: 0.99,
            rule: CandidateRule::EqualWeight,
            resolution: 1e-4,
            min_lambda_gap: 1e-4,
            max_solves: 200,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        let in_unit = |x: f64| x.is_finite() && (0.0..=1.0).contains(&x);
        if !in_unit(self.lambda_lo) || !in_unit(self.lambda_hi) || self.lambda_lo >= self.lambda_hi {
            return Err(SitingError::Config(format!(
                "search weights must satisfy 0 <= lo < hi <= 1, got [{}, {}]",
                self.lambda_lo, self.lambda_hi
            )));
        }
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(SitingError::Config(format!(
                "resolution must be positive, got {}",
                self.resolution
            )));
        }
        if !(self.min_lambda_gap.is_finite() && self.min_lambda_gap >= 0.0) {
            return Err(SitingError::Config(format!(
                "min_lambda_gap must be non-negative, got {}",
                self.min_lambda_gap
            )));
        }
        if self.max_solves < 2 {
            return Err(SitingError::Config(format!(
                "max_solves must allow both extreme weights, got {}",
                self.max_solves
            )));
        }
        Ok(())
    }
}

/// Outcomes of one budget's sweep
#[derive(Debug, Clone)]
pub struct Frontier {
    pub k: usize,
    scaling: ScalingConstants,
    resolution: f64,
    /// Sorted by lambda
    outcomes: Vec<Outcome>,
    /// Intervals left unsearched because the solve limit was reached
    pub dropped_intervals: usize,
}

impl Frontier {
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn solves(&self) -> usize {
        self.outcomes.len()
    }

    /// Distinct outcomes not dominated by any other, by increasing lambda
    pub fn non_dominated(&self) -> Vec<&Outcome> {
        let points: Vec<(f64, f64)> = self.outcomes.iter().map(|o| o.normalized(&self.scaling)).collect();
        let mut kept: Vec<(usize, (f64, f64))> = Vec::new();

        for (i, &p) in points.iter().enumerate() {
            if points.iter().any(|&q| dominates(q, p, self.resolution)) {
                continue;
            }
            if kept.iter().any(|&(_, q)| !distinct(q, p, self.resolution)) {
                continue;
            }
            kept.push((i, p));
        }
        kept.into_iter().map(|(i, _)| &self.outcomes[i]).collect()
    }
}

/// `a` captures at least as much at no more distance, and is better somewhere
fn dominates(a: (f64, f64), b: (f64, f64), eps: f64) -> bool {
    a.0 >= b.0 - eps && a.1 <= b.1 + eps && (a.0 > b.0 + eps || a.1 < b.1 - eps)
}

fn distinct(a: (f64, f64), b: (f64, f64), eps: f64) -> bool {
    (a.0 - b.0).abs() > eps || (a.1 - b.1).abs() > eps
}

fn differs_on_both(a: (f64, f64), b: (f64, f64), eps: f64) -> bool {
    (a.0 - b.0).abs() > eps && (a.1 - b.1).abs() > eps
}

/// `c` is a new supported point between the bounds `a` and `b`: neither
/// bound dominates it and it moves away from each on both axes
fn extends(a: (f64, f64), b: (f64, f64), c: (f64, f64), eps: f64) -> bool {
    !dominates(a, c, eps) && !dominates(b, c, eps) && differs_on_both(a, c, eps) && differs_on_both(b, c, eps)
}

pub struct ParetoSearch<'a, B> {
    scalarizer: &'a Scalarizer<B>,
    config: SearchConfig,
}

impl<'a, B: MilpBackend> ParetoSearch<'a, B> {
    pub fn new(scalarizer: &'a Scalarizer<B>, config: SearchConfig) -> Self {
        Self { scalarizer, config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Single weighted solve at budget `k`
    pub fn solve_fixed(
        &self,
        model: &mut FacilityModel,
        k: usize,
        lambda: f64,
        scaling: &ScalingConstants,
        results: &mut ResultSet,
    ) -> Result<Outcome> {
        model.set_budget(k);
        self.scalarizer.solve(model, lambda, scaling, results)
    }

    /// Trace the supported frontier at budget `k`. Every solve is recorded
    /// into `results`.
    pub fn sweep(
        &self,
        model: &mut FacilityModel,
        k: usize,
        scaling: &ScalingConstants,
        results: &mut ResultSet,
    ) -> Result<Frontier> {
        self.config.validate()?;
        model.set_budget(k);
        let cfg = &self.config;
        info!(
            "Sweeping k={} over [{}, {}] with {:?} candidates",
            k, cfg.lambda_lo, cfg.lambda_hi, cfg.rule
        );

        let mut solved: Vec<Outcome> = Vec::new();
        let lo = self.solve_at(model, cfg.lambda_lo, scaling, results, &mut solved)?;
        let hi = self.solve_at(model, cfg.lambda_hi, scaling, results, &mut solved)?;

        let mut worklist: VecDeque<(usize, usize)> = VecDeque::new();
        if differs_on_both(solved[lo].normalized(scaling), solved[hi].normalized(scaling), cfg.resolution) {
            worklist.push_back((lo, hi));
        }

        let mut dropped_intervals = 0;
        while let Some((a, b)) = worklist.pop_front() {
            let (lambda_a, lambda_b) = (solved[a].lambda, solved[b].lambda);
            if lambda_b - lambda_a < cfg.min_lambda_gap {
                debug!("Interval ({:.6}, {:.6}) is below the weight gap", lambda_a, lambda_b);
                continue;
            }
            if solved.len() >= cfg.max_solves {
                // Intervals already below the weight gap would never be solved
                dropped_intervals = 1 + worklist
                    .iter()
                    .filter(|&&(x, y)| solved[y].lambda - solved[x].lambda >= cfg.min_lambda_gap)
                    .count();
                warn!(
                    "Solve limit of {} reached at k={}; dropping {} open intervals",
                    cfg.max_solves, k, dropped_intervals
                );
                break;
            }

            let lambda = self.candidate(&solved[a], &solved[b], scaling);
            let c = self.solve_at(model, lambda, scaling, results, &mut solved)?;

            let new_point = extends(
                solved[a].normalized(scaling),
                solved[b].normalized(scaling),
                solved[c].normalized(scaling),
                cfg.resolution,
            );

            if new_point {
                debug!("lambda={:.6} splits ({:.6}, {:.6})", lambda, lambda_a, lambda_b);
                worklist.push_back((a, c));
                worklist.push_back((c, b));
            } else {
                debug!("Interval ({:.6}, {:.6}) resolved", lambda_a, lambda_b);
            }
        }

        solved.sort_by(|x, y| x.lambda.total_cmp(&y.lambda));
        let frontier = Frontier {
            k,
            scaling: *scaling,
            resolution: cfg.resolution,
            outcomes: solved,
            dropped_intervals,
        };
        info!(
            "k={}: {} solves, {} non-dominated outcomes",
            k,
            frontier.solves(),
            frontier.non_dominated().len()
        );
        Ok(frontier)
    }

    /// Solve at `lambda` unless that weight was already solved; returns the
    /// outcome's index in `solved`
    fn solve_at(
        &self,
        model: &mut FacilityModel,
        lambda: f64,
        scaling: &ScalingConstants,
        results: &mut ResultSet,
        solved: &mut Vec<Outcome>,
    ) -> Result<usize> {
        if let Some(i) = solved.iter().position(|o| o.lambda == lambda) {
            return Ok(i);
        }
        let outcome = self.scalarizer.solve(model, lambda, scaling, results)?;
        solved.push(outcome);
        Ok(solved.len() - 1)
    }

    fn candidate(&self, a: &Outcome, b: &Outcome, scaling: &ScalingConstants) -> f64 {
        let mid = 0.5 * (a.lambda + b.lambda);
        if self.config.rule == CandidateRule::Midpoint {
            return mid;
        }
        match equal_weight(a.normalized(scaling), b.normalized(scaling)) {
            Some(lambda) if lambda > a.lambda && lambda < b.lambda => lambda,
            _ => mid,
        }
    }
}

/// Weight at which `lambda * f1 - (1 - lambda) * f2` is equal for both points
fn equal_weight(a: (f64, f64), b: (f64, f64)) -> Option<f64> {
    let d1 = a.0 - b.0;
    let d2 = a.1 - b.1;
    let denom = d1 + d2;
    if denom.abs() < 1e-12 {
        return None;
    }
    let lambda = d2 / denom;
    lambda.is_finite().then_some(lambda)
}
