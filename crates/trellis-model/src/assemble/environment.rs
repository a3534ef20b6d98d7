//! Environmental, freshwater and LCA aggregation. Pure expression building;
//! no constraints are emitted here.

use super::{ScenarioAccounts, ScenarioVars};
use crate::params::LcaIndex;
use crate::problem::{FlowsheetProblem, Scenario};
use good_lp::Expression;

pub(crate) fn add_environmental(
    problem: &FlowsheetProblem,
    scenario: &Scenario,
    sv: &ScenarioVars,
    acc: &mut ScenarioAccounts,
) {
    let ss = &problem.superstructure;
    let econ = &ss.economics;
    let hours = econ.annual_hours;

    let mut emissions = Expression::from(0.0);
    let mut freshwater = Expression::from(0.0);
    for unit in &ss.units {
        let unit_hours = scenario
            .params
            .full_load_hours(unit.id)
            .unwrap_or(unit.full_load_hours);
        if let Some(factor) = scenario.params.emission_factor(unit.id) {
            emissions += factor * unit_hours * acc.throughput_of(unit.id);
        }
        if let Some(factor) = scenario.params.freshwater_factor(unit.id) {
            freshwater += factor * unit_hours * acc.throughput_of(unit.id);
        }
    }
    emissions += econ.electricity_emission_factor * hours * sv.elec_purchase;
    emissions += econ.heat_emission_factor * hours * sv.hot_utility;
    freshwater += econ.electricity_fw_factor * hours * sv.elec_purchase;

    acc.emissions = emissions;
    acc.freshwater = freshwater;

    for category in &problem.sets.impact_categories {
        let mut impact = Expression::from(0.0);
        for unit in &ss.units {
            if let Some(factor) = scenario.params.lca_factor(&LcaIndex {
                unit: unit.id,
                category: category.clone(),
            }) {
                let unit_hours = scenario
                    .params
                    .full_load_hours(unit.id)
                    .unwrap_or(unit.full_load_hours);
                impact += factor * unit_hours * acc.throughput_of(unit.id);
            }
        }
        if let Some(factor) = econ.electricity_lca.get(category) {
            impact += *factor * hours * sv.elec_purchase;
        }
        if let Some(factor) = econ.heat_lca.get(category) {
            impact += *factor * hours * sv.hot_utility;
        }
        acc.impacts.insert(category.clone(), impact);
    }
}
