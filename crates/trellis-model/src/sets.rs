//! Derivation of every combinatorial index set the MILP needs.
//!
//! Pure walk over the entity model. The only failure mode is inconsistent
//! entity data (a split factor or source link referencing something that is
//! not a declared connection or unit), which is a fatal configuration error
//! here, at assembly time, never a silent zero at solve time.

use std::collections::{BTreeMap, BTreeSet};
use trellis_core::{Component, Superstructure, TrellisError, TrellisResult, UnitId, UnitType};

/// All derived index sets for one optimization instance.
#[derive(Debug, Clone)]
pub struct ModelSets {
    /// Every unit id, in declaration order
    pub units: Vec<UnitId>,
    /// All `(u, uu)` pairs with a declared flow
    pub unit_connections: BTreeSet<(UnitId, UnitId)>,
    /// `(source, consumer)` pairs from `possible_sources` declarations
    pub source_links: BTreeSet<(UnitId, UnitId)>,
    /// Pairs encoded with ordinary big-M flow choice
    pub ordinary_pairs: BTreeSet<(UnitId, UnitId)>,
    /// Distributor pairs encoded with decimal expansion
    pub distributor_pairs: BTreeSet<(UnitId, UnitId)>,
    /// All-or-nothing distributor pairs (single binary each)
    pub boolean_pairs: BTreeSet<(UnitId, UnitId)>,
    /// Decimal places of the distributor expansion, `0..=resolution`; place
    /// zero carries the unit weight so one edge can take the whole stream
    pub decimal_places: Vec<usize>,
    /// Digit values a place selector can take
    pub digits: Vec<usize>,
    /// Components that can physically reach each unit
    pub components_at_unit: BTreeMap<UnitId, BTreeSet<Component>>,
    /// Components each unit can emit on its outgoing streams
    pub components_out_of: BTreeMap<UnitId, BTreeSet<Component>>,
    /// Temperature interval ids, hot to cold
    pub intervals: Vec<usize>,
    /// Declared LCA impact categories
    pub impact_categories: Vec<String>,
}

impl ModelSets {
    /// Components reaching `unit` (empty set if none do).
    pub fn components_at(&self, unit: UnitId) -> BTreeSet<Component> {
        self.components_at_unit.get(&unit).cloned().unwrap_or_default()
    }

    /// Components `unit` can emit on its outgoing streams.
    pub fn components_out(&self, unit: UnitId) -> BTreeSet<Component> {
        self.components_out_of.get(&unit).cloned().unwrap_or_default()
    }

    /// Declared downstream units of `unit`, over all stream indices.
    pub fn successors_of(&self, unit: UnitId) -> Vec<UnitId> {
        self.unit_connections
            .iter()
            .filter(|(u, _)| *u == unit)
            .map(|(_, uu)| *uu)
            .collect()
    }

    /// Declared upstream units of `unit`.
    pub fn predecessors_of(&self, unit: UnitId) -> Vec<UnitId> {
        self.unit_connections
            .iter()
            .filter(|(_, uu)| *uu == unit)
            .map(|(u, _)| *u)
            .collect()
    }
}

/// Build all index sets from the entity model.
pub fn build_sets(ss: &Superstructure, decimal_resolution: usize) -> TrellisResult<ModelSets> {
    let units: Vec<UnitId> = ss.units.iter().map(|u| u.id).collect();
    let declared: BTreeSet<UnitId> = units.iter().copied().collect();

    let mut unit_connections = BTreeSet::new();
    for (from, streams) in &ss.connections {
        if !declared.contains(from) {
            return Err(TrellisError::Config(format!(
                "connection source {} is not a declared unit",
                from
            )));
        }
        for targets in streams.values() {
            for to in targets {
                if !declared.contains(to) {
                    return Err(TrellisError::Config(format!(
                        "connection target {} (from {}) is not a declared unit",
                        to, from
                    )));
                }
                unit_connections.insert((*from, *to));
            }
        }
    }

    // Classify every pair into exactly one big-M family by the type of the
    // emitting unit.
    let mut ordinary_pairs = BTreeSet::new();
    let mut distributor_pairs = BTreeSet::new();
    let mut boolean_pairs = BTreeSet::new();
    for (from, to) in &unit_connections {
        let emitter = ss
            .unit(*from)
            .ok_or_else(|| TrellisError::Config(format!("{} is not a declared unit", from)))?;
        match emitter.unit_type {
            UnitType::Distributor => {
                distributor_pairs.insert((*from, *to));
            }
            UnitType::BooleanDistributor => {
                boolean_pairs.insert((*from, *to));
            }
            _ => {
                ordinary_pairs.insert((*from, *to));
            }
        }
    }

    // Set-consistency invariant: a split factor may only target a declared
    // connection, and distributors do not carry split factors at all.
    for unit in &ss.units {
        for key in unit.split_factors().keys() {
            if unit.unit_type.is_distributor() {
                return Err(TrellisError::Config(format!(
                    "'{}' is a distributor and may not declare split factors \
                     (pair ({}, {}) would be in both big-M families)",
                    unit.name, unit.id, key.target
                )));
            }
            if !unit_connections.contains(&(unit.id, key.target)) {
                return Err(TrellisError::Config(format!(
                    "split factor ({}, {}, '{}') has no declared connection",
                    unit.id, key.target, key.component
                )));
            }
        }
    }

    let mut source_links = BTreeSet::new();
    for unit in &ss.units {
        for source in &unit.possible_sources {
            let src = ss.unit(*source).ok_or_else(|| {
                TrellisError::Config(format!(
                    "possible source {} of '{}' is not a declared unit",
                    source, unit.name
                ))
            })?;
            if !src.unit_type.is_source() {
                return Err(TrellisError::Config(format!(
                    "possible source '{}' of '{}' is not a raw-material source",
                    src.name, unit.name
                )));
            }
            source_links.insert((*source, unit.id));
        }
    }

    if decimal_resolution == 0 && !distributor_pairs.is_empty() {
        return Err(TrellisError::Config(
            "distributors present but decimal resolution is zero".into(),
        ));
    }

    let components_at_unit = component_reachability(ss, &unit_connections);
    let components_out_of = components_at_unit
        .iter()
        .map(|(u, present)| (*u, emitted_components(ss, *u, present)))
        .collect();

    Ok(ModelSets {
        components_at_unit,
        components_out_of,
        units,
        unit_connections,
        source_links,
        ordinary_pairs,
        distributor_pairs,
        boolean_pairs,
        decimal_places: (0..=decimal_resolution).collect(),
        digits: (1..=9).collect(),
        intervals: ss.temperature_intervals.iter().map(|t| t.id).collect(),
        impact_categories: ss.impact_categories.clone(),
    })
}

/// Fixpoint propagation of which components can reach which units.
///
/// Sources emit their feed composition; reactors additionally emit their
/// produced species; generators consume everything.
fn component_reachability(
    ss: &Superstructure,
    connections: &BTreeSet<(UnitId, UnitId)>,
) -> BTreeMap<UnitId, BTreeSet<Component>> {
    let mut at_unit: BTreeMap<UnitId, BTreeSet<Component>> = BTreeMap::new();
    for unit in &ss.units {
        let mut initial = BTreeSet::new();
        if unit.unit_type.is_source() {
            initial.extend(unit.composition().keys().cloned());
        }
        at_unit.insert(unit.id, initial);
    }

    loop {
        let mut changed = false;
        for (from, to) in connections {
            let emitted = emitted_components(ss, *from, &at_unit[from]);
            let entry = at_unit.get_mut(to).map(|s| {
                let before = s.len();
                s.extend(emitted);
                s.len() != before
            });
            if entry == Some(true) {
                changed = true;
            }
        }
        if !changed {
            return at_unit;
        }
    }
}

fn emitted_components(
    ss: &Superstructure,
    unit: UnitId,
    present: &BTreeSet<Component>,
) -> BTreeSet<Component> {
    let Some(u) = ss.unit(unit) else {
        return BTreeSet::new();
    };
    match u.unit_type {
        UnitType::Source => u.composition().keys().cloned().collect(),
        UnitType::StoichReactor => {
            let mut out = present.clone();
            out.extend(
                u.stoichiometry()
                    .iter()
                    .filter(|(_, coef)| **coef > 0.0)
                    .map(|(key, _)| key.component.clone()),
            );
            out
        }
        UnitType::YieldReactor => {
            let mut out: BTreeSet<Component> = u.yields().keys().cloned().collect();
            if u.inert_carryover {
                out.extend(
                    u.inert_components
                        .iter()
                        .filter(|c| present.contains(*c))
                        .cloned(),
                );
            }
            out
        }
        UnitType::Turbine | UnitType::Furnace | UnitType::Chp => BTreeSet::new(),
        _ => present.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{LoadSpec, Reaction, UnitOperation};

    fn base_structure() -> Superstructure {
        let mut ss = Superstructure::new(
            "sets",
            LoadSpec::Substrate {
                unit: UnitId::new(1),
                tons_per_hour: 10.0,
            },
        );
        ss.components = vec![Component::new("A"), Component::new("B")];
        let mut feed = UnitOperation::new(UnitId::new(1), "Feed", UnitType::Source);
        feed.set_composition(Component::new("A"), 1.0).unwrap();
        ss.add_unit(feed).unwrap();
        ss.add_unit(UnitOperation::new(
            UnitId::new(2),
            "Pool",
            UnitType::ProductPool,
        ))
        .unwrap();
        ss.connect(UnitId::new(1), 0, UnitId::new(2)).unwrap();
        ss
    }

    #[test]
    fn test_split_factor_without_connection_is_config_error() {
        let mut ss = base_structure();
        let mut wash = UnitOperation::new(UnitId::new(3), "Wash", UnitType::PhysicalProcess);
        wash.set_split_factor(UnitId::new(2), Component::new("A"), 1.0)
            .unwrap();
        ss.add_unit(wash).unwrap();
        ss.connect(UnitId::new(1), 1, UnitId::new(3)).unwrap();
        // no (3, 2) connection declared
        let err = build_sets(&ss, 2).unwrap_err();
        assert!(err.to_string().contains("no declared connection"));
    }

    #[test]
    fn test_pair_families_are_disjoint() {
        let mut ss = base_structure();
        let dist = UnitOperation::new(UnitId::new(4), "Split", UnitType::Distributor);
        ss.add_unit(dist).unwrap();
        ss.connect(UnitId::new(1), 1, UnitId::new(4)).unwrap();
        ss.connect(UnitId::new(4), 0, UnitId::new(2)).unwrap();
        let sets = build_sets(&ss, 2).unwrap();
        assert!(sets.distributor_pairs.contains(&(UnitId::new(4), UnitId::new(2))));
        assert!(!sets.ordinary_pairs.contains(&(UnitId::new(4), UnitId::new(2))));
        assert!(sets.ordinary_pairs.contains(&(UnitId::new(1), UnitId::new(2))));
        // place 0 lets a single edge reach a fraction of exactly one
        assert_eq!(sets.decimal_places, vec![0, 1, 2]);
    }

    #[test]
    fn test_distributor_with_split_factors_rejected() {
        let mut ss = base_structure();
        let mut dist = UnitOperation::new(UnitId::new(4), "Split", UnitType::Distributor);
        dist.set_split_factor(UnitId::new(2), Component::new("A"), 0.5)
            .unwrap();
        ss.add_unit(dist).unwrap();
        ss.connect(UnitId::new(1), 1, UnitId::new(4)).unwrap();
        ss.connect(UnitId::new(4), 0, UnitId::new(2)).unwrap();
        let err = build_sets(&ss, 2).unwrap_err();
        assert!(err.to_string().contains("both big-M families"));
    }

    #[test]
    fn test_component_reachability_through_reactor() {
        let mut ss = base_structure();
        let mut reactor = UnitOperation::new(UnitId::new(5), "R1", UnitType::StoichReactor);
        reactor
            .set_stoichiometry(Component::new("B"), Reaction::new("r1"), 0.8)
            .unwrap();
        reactor
            .set_conversion(Reaction::new("r1"), Component::new("A"), 0.9)
            .unwrap();
        ss.reactions = vec![Reaction::new("r1")];
        ss.add_unit(reactor).unwrap();
        ss.connect(UnitId::new(1), 1, UnitId::new(5)).unwrap();
        ss.connect(UnitId::new(5), 0, UnitId::new(2)).unwrap();

        let sets = build_sets(&ss, 2).unwrap();
        let at_pool = sets.components_at(UnitId::new(2));
        assert!(at_pool.contains(&Component::new("A")));
        assert!(at_pool.contains(&Component::new("B")));
        let at_reactor = sets.components_at(UnitId::new(5));
        assert!(at_reactor.contains(&Component::new("A")));
        assert!(!at_reactor.contains(&Component::new("B")));
        let out_reactor = sets.components_out(UnitId::new(5));
        assert!(out_reactor.contains(&Component::new("B")));
    }

    #[test]
    fn test_possible_source_must_be_source_unit() {
        let mut ss = base_structure();
        let consumer = UnitOperation::new(UnitId::new(6), "Mixer", UnitType::PhysicalProcess)
            .with_possible_sources(vec![UnitId::new(2)]);
        ss.add_unit(consumer).unwrap();
        ss.connect(UnitId::new(1), 1, UnitId::new(6)).unwrap();
        let err = build_sets(&ss, 2).unwrap_err();
        assert!(err.to_string().contains("not a raw-material source"));
    }
}
