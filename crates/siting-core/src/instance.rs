use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::data::{BaselineRecord, DataSet, DistanceTable};
use crate::error::{Result, SitingError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        Some(Self {
            latitude: latitude?,
            longitude: longitude?,
        })
    }
}

/// A demand unit with its served and latent (unserved) demand
#[derive(Debug, Clone, PartialEq)]
pub struct Tract {
    pub id: String,
    pub served: f64,
    pub unserved: f64,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Facility {
    pub id: String,
    pub location: Option<Location>,
}

/// A (tract, facility) pair that may carry flow, with its per-unit distance.
/// `facility` indexes the existing or the potential facility list depending
/// on the edge set it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub tract: usize,
    pub facility: usize,
    pub distance: f64,
}

/// Normalizers that put both objectives on comparable scales
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScalingConstants {
    /// Unmet demand of the zero-facility solution
    pub clients: f64,
    /// Total travel distance of the zero-facility solution
    pub distance: f64,
}

impl ScalingConstants {
    pub fn new(clients: f64, distance: f64) -> Result<Self> {
        for (name, value) in [("unmet demand", clients), ("total distance", distance)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(SitingError::inconsistent(format!(
                    "scaling {} must be positive, got {}",
                    name, value
                )));
            }
        }
        Ok(Self { clients, distance })
    }

    /// Normalizers from zero-facility totals. A zero total falls back to 1
    /// with a warning; negative or non-finite totals are inconsistent.
    pub fn from_totals(clients: f64, distance: f64) -> Result<Self> {
        let fallback = |name: &str, value: f64| {
            if value == 0.0 {
                warn!("Zero-facility {} is 0, normalizing by 1", name);
                1.0
            } else {
                value
            }
        };
        Self::new(fallback("unmet demand", clients), fallback("total distance", distance))
    }

    pub fn from_baseline(baseline: &BaselineRecord) -> Result<Self> {
        Self::from_totals(baseline.unmet_demand, baseline.total_distance)
    }

    /// No normalization, used for the zero-facility reference solve
    pub fn unit() -> Self {
        Self {
            clients: 1.0,
            distance: 1.0,
        }
    }
}

/// The optimization entities of one state
#[derive(Debug, Clone)]
pub struct Instance {
    pub state: String,
    pub tracts: Vec<Tract>,
    pub existing: Vec<Facility>,
    pub potential: Vec<Facility>,
    /// tract -> existing facility, carrying served demand
    pub existing_edges: Vec<Edge>,
    /// tract -> potential facility, carrying served demand
    pub served_new_edges: Vec<Edge>,
    /// tract -> potential facility, capturing unserved demand
    pub unserved_new_edges: Vec<Edge>,
    /// Per potential facility, the unserved tracts it may capture
    pub catch_basins: Vec<Vec<usize>>,
    /// From the baseline table, when a row exists for the state
    pub scaling: Option<ScalingConstants>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceSummary {
    pub state: String,
    pub tracts: usize,
    pub served_tracts: usize,
    pub unserved_tracts: usize,
    pub existing_facilities: usize,
    pub potential_facilities: usize,
    pub existing_edges: usize,
    pub served_new_edges: usize,
    pub unserved_new_edges: usize,
    pub total_served: f64,
    pub total_unserved: f64,
    pub scaling: Option<ScalingConstants>,
}

impl Instance {
    /// Build the instance of `state` from its raw tables.
    ///
    /// Only tracts of the state with positive population take part. Edges of a
    /// tract without demand of the edge's kind are dropped.
    pub fn build(state: &str, data: &DataSet) -> Result<Self> {
        // Every tract row of the table, for locating potential facilities
        let mut locations: BTreeMap<&str, Option<Location>> = BTreeMap::new();
        // Tract rows of the state: id -> has positive population
        let mut in_state: BTreeMap<&str, bool> = BTreeMap::new();
        let mut active: BTreeMap<&str, Tract> = BTreeMap::new();

        for row in &data.tracts {
            locations.insert(&row.geoid, Location::from_parts(row.latitude, row.longitude));
            if row.state != state {
                continue;
            }
            if in_state.insert(&row.geoid, row.population > 0.0).is_some() {
                return Err(SitingError::inconsistent(format!("duplicate tract {}", row.geoid)));
            }
            if row.population <= 0.0 {
                continue;
            }
            for (name, value) in [("served", row.served), ("unserved", row.unserved)] {
                if !value.is_finite() || value < 0.0 {
                    return Err(SitingError::inconsistent(format!(
                        "tract {} has invalid {} demand {}",
                        row.geoid, name, value
                    )));
                }
            }
            active.insert(
                &row.geoid,
                Tract {
                    id: row.geoid.clone(),
                    served: row.served,
                    unserved: row.unserved,
                    location: Location::from_parts(row.latitude, row.longitude),
                },
            );
        }

        let tracts: Vec<Tract> = active.into_values().collect();
        let tract_index: BTreeMap<&str, usize> =
            tracts.iter().enumerate().map(|(i, t)| (t.id.as_str(), i)).collect();

        let total_served: f64 = tracts.iter().map(|t| t.served).sum();
        let total_unserved: f64 = tracts.iter().map(|t| t.unserved).sum();
        if total_served < 0.0 || total_unserved < 0.0 {
            return Err(SitingError::inconsistent(format!(
                "negative total demand (served {}, unserved {})",
                total_served, total_unserved
            )));
        }

        let clinic_locations: BTreeMap<&str, Option<Location>> = data
            .clinics
            .iter()
            .map(|c| (c.id.as_str(), Location::from_parts(c.latitude, c.longitude)))
            .collect();

        let existing_ids: BTreeSet<&str> = data.existing_distance.iter().map(|(_, f, _)| f).collect();
        let existing: Vec<Facility> = existing_ids
            .iter()
            .map(|&id| Facility {
                id: id.to_string(),
                location: clinic_locations.get(id).copied().flatten(),
            })
            .collect();

        let potential_ids: BTreeSet<&str> = data
            .served_distance
            .iter()
            .chain(data.unserved_distance.iter())
            .map(|(_, f, _)| f)
            .collect();
        let potential: Vec<Facility> = potential_ids
            .iter()
            .map(|&id| Facility {
                id: id.to_string(),
                location: locations.get(id).copied().flatten(),
            })
            .collect();

        let existing_index: BTreeMap<&str, usize> =
            existing_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let potential_index: BTreeMap<&str, usize> =
            potential_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let resolve = EdgeResolver {
            tracts: &tracts,
            tract_index: &tract_index,
            in_state: &in_state,
        };
        let existing_edges = resolve.edges("existing", &data.existing_distance, &existing_index, |t| t.served)?;
        let served_new_edges = resolve.edges("served", &data.served_distance, &potential_index, |t| t.served)?;
        let unserved_new_edges =
            resolve.edges("unserved", &data.unserved_distance, &potential_index, |t| t.unserved)?;

        let mut catch_basins: Vec<Vec<usize>> = vec![Vec::new(); potential.len()];
        for e in &unserved_new_edges {
            catch_basins[e.facility].push(e.tract);
        }

        // A served tract nobody can serve makes the formulation infeasible
        let mut reachable = vec![false; tracts.len()];
        for e in existing_edges.iter().chain(&served_new_edges) {
            reachable[e.tract] = true;
        }
        if let Some((t, _)) = tracts.iter().zip(&reachable).find(|&(t, &r)| t.served > 0.0 && !r) {
            return Err(SitingError::inconsistent(format!(
                "tract {} has served demand {} but no facility to be served at",
                t.id, t.served
            )));
        }

        let scaling = data.baseline.as_ref().map(ScalingConstants::from_baseline).transpose()?;

        let instance = Self {
            state: state.to_string(),
            tracts,
            existing,
            potential,
            existing_edges,
            served_new_edges,
            unserved_new_edges,
            catch_basins,
            scaling,
        };

        info!(
            "Built instance for {}: {} tracts, {} existing and {} potential facilities",
            state,
            instance.tracts.len(),
            instance.existing.len(),
            instance.potential.len()
        );

        Ok(instance)
    }

    pub fn total_served(&self) -> f64 {
        self.tracts.iter().map(|t| t.served).sum()
    }

    pub fn total_unserved(&self) -> f64 {
        self.tracts.iter().map(|t| t.unserved).sum()
    }

    pub fn tract_index(&self, id: &str) -> Option<usize> {
        self.tracts.iter().position(|t| t.id == id)
    }

    pub fn potential_index(&self, id: &str) -> Option<usize> {
        self.potential.iter().position(|f| f.id == id)
    }

    pub fn summary(&self) -> InstanceSummary {
        InstanceSummary {
            state: self.state.clone(),
            tracts: self.tracts.len(),
            served_tracts: self.tracts.iter().filter(|t| t.served > 0.0).count(),
            unserved_tracts: self.tracts.iter().filter(|t| t.unserved > 0.0).count(),
            existing_facilities: self.existing.len(),
            potential_facilities: self.potential.len(),
            existing_edges: self.existing_edges.len(),
            served_new_edges: self.served_new_edges.len(),
            unserved_new_edges: self.unserved_new_edges.len(),
            total_served: self.total_served(),
            total_unserved: self.total_unserved(),
            scaling: self.scaling,
        }
    }
}

struct EdgeResolver<'a> {
    tracts: &'a [Tract],
    tract_index: &'a BTreeMap<&'a str, usize>,
    in_state: &'a BTreeMap<&'a str, bool>,
}

impl EdgeResolver<'_> {
    fn edges(
        &self,
        kind: &str,
        table: &DistanceTable,
        facilities: &BTreeMap<&str, usize>,
        demand: impl Fn(&Tract) -> f64,
    ) -> Result<Vec<Edge>> {
        let mut edges = Vec::with_capacity(table.len());
        let mut dropped = 0usize;

        for (tract_id, facility_id, distance) in table.iter() {
            if !distance.is_finite() || distance < 0.0 {
                return Err(SitingError::inconsistent(format!(
                    "{} distance from {} to {} is invalid: {}",
                    kind, tract_id, facility_id, distance
                )));
            }
            let Some(&tract) = self.tract_index.get(tract_id) else {
                if self.in_state.contains_key(tract_id) {
                    // Present but unpopulated
                    dropped += 1;
                    continue;
                }
                return Err(SitingError::inconsistent(format!(
                    "{} distance table references tract {} which has no demand entry",
                    kind, tract_id
                )));
            };
            if demand(&self.tracts[tract]) <= 0.0 {
                dropped += 1;
                continue;
            }
            // Facility keys come from the same tables, so the lookup cannot miss
            let Some(&facility) = facilities.get(facility_id) else {
                continue;
            };
            edges.push(Edge {
                tract,
                facility,
                distance,
            });
        }

        if dropped > 0 {
            debug!("Dropped {} {} edges of tracts without {} demand", dropped, kind, kind);
        }
        Ok(edges)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::{BaselineRecord, ClinicRecord, TractRecord};

    pub(crate) fn tract(id: &str, served: f64, unserved: f64) -> TractRecord {
        TractRecord {
            geoid: id.to_string(),
            state: "Utah".to_string(),
            population: 100.0,
            served,
            unserved,
            latitude: Some(40.0),
            longitude: Some(-111.0),
        }
    }

    pub(crate) fn table(rows: &[(&str, &str, f64)]) -> DistanceTable {
        rows.iter()
            .map(|&(t, f, d)| (t.to_string(), f.to_string(), d))
            .collect()
    }

    pub(crate) fn data_set(
        tracts: Vec<TractRecord>,
        existing: &[(&str, &str, f64)],
        served: &[(&str, &str, f64)],
        unserved: &[(&str, &str, f64)],
    ) -> DataSet {
        DataSet {
            tracts,
            clinics: vec![ClinicRecord {
                id: "E1".to_string(),
                latitude: Some(40.5),
                longitude: Some(-111.5),
            }],
            existing_distance: table(existing),
            served_distance: table(served),
            unserved_distance: table(unserved),
            baseline: None,
        }
    }

    #[test]
    fn test_build_sets_and_basins() {
        let data = data_set(
            vec![tract("A", 10.0, 1.0), tract("B", 0.0, 8.0)],
            &[("A", "E1", 5.0)],
            &[("A", "A", 1.0)],
            &[("A", "A", 1.0), ("B", "B", 2.0), ("B", "A", 3.0)],
        );

        let instance = Instance::build("Utah", &data).unwrap();

        assert_eq!(instance.tracts.len(), 2);
        assert_eq!(instance.existing.len(), 1);
        assert_eq!(instance.existing[0].location, Some(Location { latitude: 40.5, longitude: -111.5 }));
        let ids: Vec<&str> = instance.potential.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        // Potential facilities sit at tract centroids
        assert_eq!(instance.potential[0].location, Some(Location { latitude: 40.0, longitude: -111.0 }));

        let a = instance.tract_index("A").unwrap();
        let b = instance.tract_index("B").unwrap();
        let pa = instance.potential_index("A").unwrap();
        let pb = instance.potential_index("B").unwrap();
        let mut basin_a = instance.catch_basins[pa].clone();
        basin_a.sort();
        assert_eq!(basin_a, vec![a, b]);
        assert_eq!(instance.catch_basins[pb], vec![b]);

        assert!((instance.total_served() - 10.0).abs() < 1e-12);
        assert!((instance.total_unserved() - 9.0).abs() < 1e-12);
        assert!(instance.scaling.is_none());
    }

    #[test]
    fn test_build_filters_state_and_population() {
        let mut other = tract("X", 4.0, 4.0);
        other.state = "Idaho".to_string();
        let mut empty = tract("Z", 0.0, 0.0);
        empty.population = 0.0;
        let data = data_set(
            vec![tract("A", 10.0, 0.0), other, empty],
            &[("A", "E1", 2.0), ("Z", "E1", 1.0)],
            &[],
            &[],
        );

        let instance = Instance::build("Utah", &data).unwrap();

        assert_eq!(instance.tracts.len(), 1);
        assert_eq!(instance.tracts[0].id, "A");
        // Z is in the state but unpopulated: its edge is dropped, not an error
        assert_eq!(instance.existing_edges.len(), 1);
    }

    #[test]
    fn test_build_drops_edges_without_demand() {
        let data = data_set(
            vec![tract("A", 10.0, 0.0), tract("B", 0.0, 3.0)],
            &[("A", "E1", 2.0), ("B", "E1", 2.0)],
            &[("B", "P", 1.0)],
            &[("A", "P", 1.0), ("B", "P", 1.0)],
        );

        let instance = Instance::build("Utah", &data).unwrap();

        assert_eq!(instance.existing_edges.len(), 1);
        assert!(instance.served_new_edges.is_empty());
        assert_eq!(instance.unserved_new_edges.len(), 1);
        assert_eq!(instance.potential.len(), 1);
        assert_eq!(instance.catch_basins[0], vec![instance.tract_index("B").unwrap()]);
    }

    #[test]
    fn test_unknown_tract_is_inconsistent() {
        let data = data_set(vec![tract("A", 10.0, 0.0)], &[("A", "E1", 2.0), ("Q", "E1", 1.0)], &[], &[]);
        let err = Instance::build("Utah", &data).unwrap_err();
        assert!(matches!(err, SitingError::DataInconsistency(_)), "got {:?}", err);
        assert!(err.to_string().contains("Q"));
    }

    #[test]
    fn test_negative_demand_is_inconsistent() {
        let data = data_set(vec![tract("A", -1.0, 0.0)], &[("A", "E1", 2.0)], &[], &[]);
        let err = Instance::build("Utah", &data).unwrap_err();
        assert!(matches!(err, SitingError::DataInconsistency(_)), "got {:?}", err);
    }

    #[test]
    fn test_negative_distance_is_inconsistent() {
        let data = data_set(vec![tract("A", 1.0, 0.0)], &[("A", "E1", -2.0)], &[], &[]);
        let err = Instance::build("Utah", &data).unwrap_err();
        assert!(matches!(err, SitingError::DataInconsistency(_)), "got {:?}", err);
    }

    #[test]
    fn test_unreachable_served_tract_is_inconsistent() {
        let data = data_set(
            vec![tract("A", 10.0, 0.0), tract("B", 3.0, 0.0)],
            &[("A", "E1", 2.0)],
            &[],
            &[],
        );
        let err = Instance::build("Utah", &data).unwrap_err();
        assert!(err.to_string().contains("B"), "got {}", err);
    }

    #[test]
    fn test_duplicate_tract_is_inconsistent() {
        let data = data_set(vec![tract("A", 1.0, 0.0), tract("A", 2.0, 0.0)], &[("A", "E1", 2.0)], &[], &[]);
        let err = Instance::build("Utah", &data).unwrap_err();
        assert!(err.to_string().contains("duplicate"), "got {}", err);
    }

    #[test]
    fn test_scaling_from_baseline() {
        let mut data = data_set(vec![tract("A", 1.0, 0.0)], &[("A", "E1", 2.0)], &[], &[]);
        data.baseline = Some(BaselineRecord {
            state: "Utah".to_string(),
            unmet_demand: 5.0,
            total_distance: 20.0,
            average_distance: None,
        });
        let instance = Instance::build("Utah", &data).unwrap();
        assert_eq!(instance.scaling, Some(ScalingConstants { clients: 5.0, distance: 20.0 }));

        // A zero total normalizes by 1, same as a derived baseline
        data.baseline.as_mut().unwrap().unmet_demand = 0.0;
        let instance = Instance::build("Utah", &data).unwrap();
        assert_eq!(instance.scaling, Some(ScalingConstants { clients: 1.0, distance: 20.0 }));

        data.baseline.as_mut().unwrap().unmet_demand = -1.0;
        let err = Instance::build("Utah", &data).unwrap_err();
        assert!(matches!(err, SitingError::DataInconsistency(_)), "got {:?}", err);
    }

    #[test]
    fn test_scaling_from_totals() {
        assert_eq!(
            ScalingConstants::from_totals(0.0, 0.0).unwrap(),
            ScalingConstants::unit()
        );
        assert_eq!(
            ScalingConstants::from_totals(3.0, 7.5).unwrap(),
            ScalingConstants { clients: 3.0, distance: 7.5 }
        );
        assert!(ScalingConstants::from_totals(f64::NAN, 1.0).is_err());
        assert!(ScalingConstants::from_totals(1.0, -2.0).is_err());
    }
}
