//! Per-scenario parameter-store materialization.
//!
//! Each scenario clones the base store before mutating it, so a built
//! scenario set never shares mutable state and stores can be evaluated in
//! parallel downstream.

use anyhow::{Context, Result};
use trellis_model::params::ParameterStore;
use trellis_model::problem::Scenario;

use crate::build::StochasticObject;

/// Turn the scenario matrix into concrete [`Scenario`]s over a base store.
///
/// A matrix cell of `p` percent scales the base value of its row's parameter
/// by `1 + p/100`; zero cells leave the base value untouched.
pub fn materialize(
    stochastic: &StochasticObject,
    base: &ParameterStore,
) -> Result<Vec<Scenario>> {
    let mut scenarios = Vec::with_capacity(stochastic.number_of_scenarios());
    for (name, (weight, cells)) in stochastic.scenario_names.iter().zip(
        stochastic
            .probabilities
            .iter()
            .zip(stochastic.matrix.iter()),
    ) {
        let mut params = base.clone();
        for (row, pct) in stochastic.rows.iter().zip(cells) {
            if *pct == 0.0 {
                continue;
            }
            let base_value = params
                .base_value(&row.change)
                .with_context(|| format!("resolving base value of row '{}'", row.key))?;
            let change = row.change.with_value(base_value * (1.0 + pct / 100.0));
            params
                .apply(&change)
                .with_context(|| format!("perturbing row '{}' in scenario '{}'", row.key, name))?;
        }
        scenarios.push(Scenario {
            name: name.clone(),
            weight: *weight,
            params,
        });
    }
    Ok(scenarios)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::StochasticObject;
    use crate::spec::{PerturbationRow, UncertaintySpec};
    use trellis_core::{Component, LoadSpec, Superstructure, UnitId, UnitOperation, UnitType};

    fn base_store() -> ParameterStore {
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
        ParameterStore::from_superstructure(&ss)
    }

    fn price_spec(percentage: f64) -> UncertaintySpec {
        UncertaintySpec {
            version: None,
            level: 2,
            rows: vec![PerturbationRow {
                parameter: "materialcosts".into(),
                unit: 1,
                component: None,
                reaction: None,
                target: None,
                interval: None,
                utility: None,
                category: None,
                group: None,
                correlation: None,
                percentage,
            }],
        }
    }

    #[test]
    fn test_materialize_scales_base_value() {
        let stochastic = StochasticObject::build(&price_spec(50.0)).unwrap();
        let base = base_store();
        let scenarios = materialize(&stochastic, &base).unwrap();

        assert_eq!(scenarios.len(), 2);
        assert_eq!(scenarios[0].name, "sc1");
        let up = scenarios[0].params.feed_price(UnitId::new(1)).unwrap();
        let down = scenarios[1].params.feed_price(UnitId::new(1)).unwrap();
        assert!((up - 60.0).abs() < 1e-9);
        assert!((down - 20.0).abs() < 1e-9);
        // base store untouched
        assert!((base.feed_price(UnitId::new(1)).unwrap() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_unit_is_fatal() {
        let mut spec = price_spec(10.0);
        spec.rows[0].unit = 99;
        let stochastic = StochasticObject::build(&spec).unwrap();
        let err = materialize(&stochastic, &base_store()).unwrap_err();
        assert!(format!("{:#}", err).contains("feedprice_1"));
    }
}
