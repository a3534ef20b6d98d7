//! The optimization instance: superstructure, derived sets, parameter store
//! and assembler options, bundled for (re-)assembly and solving.

use crate::params::{ParameterChange, ParameterStore};
use crate::sets::{build_sets, ModelSets};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use trellis_core::{Superstructure, TrellisResult, UnitId};

/// Assembly knobs, with conservative defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblerOptions {
    /// Global big-M bound for flow-choice disjunctions (t/h scale)
    pub big_m: f64,
    /// Decimal places of the distributor split expansion
    pub decimal_resolution: usize,
    /// Segments per linearized capital-cost curve
    pub capex_segments: usize,
    /// Linearization capacity ceiling as a multiple of the load rate
    pub capacity_margin: f64,
    /// When set, activation binaries are frozen to these values and the
    /// decision-logic constraint block is omitted entirely
    pub fixed_design: Option<BTreeMap<UnitId, bool>>,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            big_m: 1e5,
            decimal_resolution: 2,
            capex_segments: 8,
            capacity_margin: 5.0,
            fixed_design: None,
        }
    }
}

impl AssemblerOptions {
    /// Effective big-M for one unit: the per-unit override when present.
    pub fn big_m_for(&self, ss: &Superstructure, unit: UnitId) -> f64 {
        ss.unit(unit)
            .and_then(|u| u.big_m_override)
            .unwrap_or(self.big_m)
    }
}

/// One scenario of the two-stage instance: a name, a probability weight and
/// an independently mutated parameter store.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub weight: f64,
    pub params: ParameterStore,
}

/// A complete optimization instance.
///
/// Cloning the problem clones the parameter store, so parallel or
/// out-of-order scenario evaluation never shares mutable state.
#[derive(Debug, Clone)]
pub struct FlowsheetProblem {
    pub superstructure: Superstructure,
    pub sets: ModelSets,
    pub base: ParameterStore,
    /// Explicit scenarios; empty means deterministic single-scenario mode
    pub scenarios: Vec<Scenario>,
    pub options: AssemblerOptions,
}

impl FlowsheetProblem {
    /// Validate the superstructure, derive the index sets and merge the
    /// parameter dictionaries into the instance's store.
    pub fn new(superstructure: Superstructure) -> TrellisResult<Self> {
        Self::with_options(superstructure, AssemblerOptions::default())
    }

    pub fn with_options(
        superstructure: Superstructure,
        options: AssemblerOptions,
    ) -> TrellisResult<Self> {
        superstructure.validate()?;
        let sets = build_sets(&superstructure, options.decimal_resolution)?;
        let base = ParameterStore::from_superstructure(&superstructure);
        Ok(Self {
            superstructure,
            sets,
            base,
            scenarios: Vec::new(),
            options,
        })
    }

    pub fn big_m(mut self, big_m: f64) -> Self {
        self.options.big_m = big_m;
        self
    }

    /// Freeze the design to the given activation pattern.
    pub fn fixed_design(mut self, design: BTreeMap<UnitId, bool>) -> Self {
        self.options.fixed_design = Some(design);
        self
    }

    /// Mutate one baseline parameter (sensitivity path).
    pub fn apply_change(&mut self, change: &ParameterChange) -> TrellisResult<()> {
        self.base.apply(change)
    }

    /// The scenario set the assembler replicates over: the declared
    /// scenarios with normalized weights, or a single unit-weight scenario
    /// built from the baseline store.
    pub fn scenario_set(&self) -> Vec<Scenario> {
        if self.scenarios.is_empty() {
            return vec![Scenario {
                name: "deterministic".to_string(),
                weight: 1.0,
                params: self.base.clone(),
            }];
        }
        let total: f64 = self.scenarios.iter().map(|s| s.weight).sum();
        self.scenarios
            .iter()
            .map(|s| Scenario {
                name: s.name.clone(),
                weight: if total > 0.0 { s.weight / total } else { 0.0 },
                params: s.params.clone(),
            })
            .collect()
    }

    /// Annual production or substrate load in t/year, the denominator of all
    /// specific objectives.
    pub fn annual_load(&self) -> f64 {
        let rate = self.superstructure.load.tons_per_hour();
        let hours = match &self.superstructure.load {
            trellis_core::LoadSpec::Substrate { unit, .. } => self
                .base
                .full_load_hours(*unit)
                .unwrap_or(self.superstructure.economics.annual_hours),
            trellis_core::LoadSpec::Product { pool, .. } => self
                .superstructure
                .unit_by_name(pool)
                .map(|u| self.base.full_load_hours(u.id).unwrap_or(u.full_load_hours))
                .unwrap_or(self.superstructure.economics.annual_hours),
        };
        rate * hours
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{Component, LoadSpec, UnitOperation, UnitType};

    fn problem() -> FlowsheetProblem {
        let mut ss = Superstructure::new(
            "toy",
            LoadSpec::Substrate {
                unit: UnitId::new(1),
                tons_per_hour: 10.0,
            },
        );
        ss.components = vec![Component::new("A")];
        let mut feed = UnitOperation::new(UnitId::new(1), "Feed", UnitType::Source);
        feed.set_composition(Component::new("A"), 1.0).unwrap();
        feed.feed_price = Some(40.0);
        ss.add_unit(feed).unwrap();
        ss.add_unit(UnitOperation::new(
            UnitId::new(2),
            "Pool",
            UnitType::ProductPool,
        ))
        .unwrap();
        ss.connect(UnitId::new(1), 0, UnitId::new(2)).unwrap();
        FlowsheetProblem::new(ss).unwrap()
    }

    #[test]
    fn test_deterministic_scenario_set() {
        let p = problem();
        let scenarios = p.scenario_set();
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].weight, 1.0);
        assert_eq!(scenarios[0].params, p.base);
    }

    #[test]
    fn test_scenario_weights_normalized() {
        let mut p = problem();
        p.scenarios = vec![
            Scenario {
                name: "sc1".into(),
                weight: 1.0,
                params: p.base.clone(),
            },
            Scenario {
                name: "sc2".into(),
                weight: 3.0,
                params: p.base.clone(),
            },
        ];
        let scenarios = p.scenario_set();
        assert!((scenarios[0].weight - 0.25).abs() < 1e-12);
        assert!((scenarios[1].weight - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_annual_load_uses_load_unit_hours() {
        let p = problem();
        // 10 t/h at the default 8000 h/a
        assert!((p.annual_load() - 80_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_product_load_reads_mutated_hours() {
        let mut p = problem();
        p.superstructure.load = LoadSpec::Product {
            pool: "Pool".into(),
            tons_per_hour: 5.0,
        };
        assert!((p.annual_load() - 5.0 * 8000.0).abs() < 1e-9);

        p.apply_change(&ParameterChange::FullLoadHours {
            unit: UnitId::new(2),
            value: 4000.0,
        })
        .unwrap();
        assert!((p.annual_load() - 5.0 * 4000.0).abs() < 1e-9);
    }

    #[test]
    fn test_clone_isolates_parameter_store() {
        let mut a = problem();
        let b = a.clone();
        a.apply_change(&ParameterChange::FeedPrice {
            unit: UnitId::new(1),
            value: 99.0,
        })
        .unwrap();
        assert_eq!(b.base.feed_price(UnitId::new(1)), Some(40.0));
        assert_eq!(a.base.feed_price(UnitId::new(1)), Some(99.0));
    }
}
