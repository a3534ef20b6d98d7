//! Energy balances: heat cascade across temperature intervals, optional
//! heat-pump insertion, generator credits and the plant electricity balance.

use super::{DesignVars, ScenarioAccounts, ScenarioVars};
use crate::params::UtilityIndex;
use crate::problem::{FlowsheetProblem, Scenario};
use good_lp::{constraint, Constraint, Expression};
use trellis_core::{TrellisError, TrellisResult, Utility};

pub(crate) fn add_energy_balances(
    problem: &FlowsheetProblem,
    scenario: &Scenario,
    design: &DesignVars,
    sv: &ScenarioVars,
    acc: &mut ScenarioAccounts,
    constraints: &mut Vec<Constraint>,
) -> TrellisResult<()> {
    let ss = &problem.superstructure;
    let econ = &ss.economics;

    // Generator units turn inlet chemical energy into electricity and heat.
    let mut generated_el = Expression::from(0.0);
    let mut generated_heat = Expression::from(0.0);
    for unit in &ss.units {
        let Some(gen) = &unit.generator else {
            continue;
        };
        let mut fuel_energy = Expression::from(0.0);
        for component in problem.sets.components_at(unit.id) {
            let lhv = ss.lhv.get(&component).copied().ok_or_else(|| {
                TrellisError::Config(format!(
                    "no lower heating value for component '{}' feeding '{}'",
                    component, unit.name
                ))
            })?;
            fuel_energy += lhv * acc.inlet_of(unit.id, &component);
        }
        generated_el += gen.efficiency_el * fuel_energy.clone();
        generated_heat += gen.efficiency_th * fuel_energy;
    }

    // Electricity and chilling demand driven by unit reference flows.
    let mut elec_demand = Expression::from(0.0);
    let mut chilling_demand = Expression::from(0.0);
    for unit in &ss.units {
        if let Some(tau) = scenario.params.utility_demand(&UtilityIndex {
            unit: unit.id,
            utility: Utility::Electricity,
        }) {
            elec_demand += tau * acc.throughput_of(unit.id);
        }
        if let Some(tau) = scenario.params.utility_demand(&UtilityIndex {
            unit: unit.id,
            utility: Utility::Chilling,
        }) {
            chilling_demand += tau * acc.throughput_of(unit.id);
        }
    }

    // Heat pump: sink duty Q, compressor work Q/COP, source extraction
    // Q(COP-1)/COP; sized by the shared first-stage capacity.
    let mut hp_work = Expression::from(0.0);
    if let (Some(hp), Some(duty)) = (&ss.heat_pump, sv.hp_duty) {
        hp_work += (1.0 / hp.cop) * duty;
        if let Some(cap) = design.hp_capacity {
            constraints.push(constraint!(duty <= cap));
        }
    }
    elec_demand += hp_work.clone();

    // Plant electricity balance (MW).
    constraints.push(constraint!(
        sv.elec_purchase + generated_el.clone() == elec_demand + sv.elec_sale
    ));

    // Shifted heat cascade, hot to cold: the residual carries interval
    // surplus downward, hot utility enters at the top, the final residual
    // sinks into cold utility. Generator heat is credited at the top.
    let intervals = &problem.sets.intervals;
    let mut previous: Option<Expression> = None;
    for (position, interval) in intervals.iter().enumerate() {
        let mut net_demand = Expression::from(0.0);
        for unit in &ss.units {
            if let Some(beta) = scenario.params.heat_coefficient(&crate::params::HeatIndex {
                unit: unit.id,
                interval: *interval,
            }) {
                net_demand += beta * acc.throughput_of(unit.id);
            }
        }

        let mut inflow = match previous.take() {
            Some(residual) => residual,
            None => Expression::from(sv.hot_utility) + generated_heat.clone(),
        };
        if let (Some(hp), Some(duty)) = (&ss.heat_pump, sv.hp_duty) {
            if hp.sink_interval == *interval {
                inflow += duty;
            }
            if hp.source_interval == *interval {
                inflow -= ((hp.cop - 1.0) / hp.cop) * duty;
            }
        }

        // Whatever enters the interval passes through its exchanger bank,
        // which must be sized for it.
        if let Some(cap) = design.hen_capacity.get(interval) {
            constraints.push(constraint!(inflow.clone() <= *cap));
        }

        let residual = sv.residual[interval];
        constraints.push(constraint!(inflow - net_demand == residual));
        previous = Some(Expression::from(residual));

        if position == intervals.len() - 1 {
            constraints.push(constraint!(sv.cold_utility == residual));
        }
    }

    // Annual utility bill; electricity sales are a credit.
    let hours = econ.annual_hours;
    acc.utility_cost += hours
        * (econ.heating_price * sv.hot_utility
            + econ.cooling_price * sv.cold_utility
            + econ.cooling_price * chilling_demand
            + econ.electricity_price * sv.elec_purchase
            - econ.electricity_sell_price * sv.elec_sale);

    Ok(())
}
