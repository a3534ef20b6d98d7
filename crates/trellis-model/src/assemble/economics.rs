//! Waste costs and economic evaluation: piecewise-linear CAPEX, OPEX
//! aggregation, annualized capital charge, TAC and EBIT per scenario.

use super::{DesignAccounts, DesignVars, ScenarioAccounts, ScenarioVars};
use crate::problem::{FlowsheetProblem, Scenario};
use good_lp::{constraint, Constraint, Expression};
use indexmap::IndexMap;
use trellis_core::TrellisResult;

pub(crate) fn add_economics(
    problem: &FlowsheetProblem,
    scenarios: &[Scenario],
    design: &DesignVars,
    scenario_vars: &[ScenarioVars],
    accounts: &mut [ScenarioAccounts],
    constraints: &mut Vec<Constraint>,
) -> TrellisResult<DesignAccounts> {
    let ss = &problem.superstructure;
    let econ = &ss.economics;

    // Convex-combination CAPEX encoding per costed unit: exactly one segment
    // active when the unit is built, adjacent lambda weights interpolate the
    // breakpoint table, the capacity variable follows the x-axis and the
    // equipment cost the y-axis.
    let mut equipment_cost: IndexMap<_, Expression> = IndexMap::new();
    let mut fixed_capital: IndexMap<_, Expression> = IndexMap::new();
    let mut total_fci = Expression::from(0.0);
    let lang_factor = econ.direct_cost_factor + econ.indirect_cost_factor;

    for (unit_id, bp) in &design.breakpoints {
        let y = design.y[unit_id];
        let cap = design.capacity[unit_id];

        let mut lambda_sum = Expression::from(0.0);
        let mut segment_sum = Expression::from(0.0);
        let mut cap_expr = Expression::from(0.0);
        let mut ec_expr = Expression::from(0.0);
        for j in 0..bp.len() {
            let lam = design.lambda[&(*unit_id, j)];
            lambda_sum += lam;
            cap_expr += bp.x[j] * lam;
            ec_expr += bp.y[j] * lam;

            // a lambda may only carry weight next to the selected segment
            let mut adjacent = Expression::from(0.0);
            if j > 0 {
                adjacent += design.segment[&(*unit_id, j - 1)];
            }
            if j < bp.segments() {
                adjacent += design.segment[&(*unit_id, j)];
            }
            constraints.push(constraint!(lam <= adjacent));
        }
        for j in 0..bp.segments() {
            segment_sum += design.segment[&(*unit_id, j)];
        }
        constraints.push(constraint!(lambda_sum == y));
        constraints.push(constraint!(segment_sum == y));
        constraints.push(constraint!(cap == cap_expr));

        let fci = lang_factor * ec_expr.clone();
        total_fci += fci.clone();
        equipment_cost.insert(*unit_id, ec_expr);
        fixed_capital.insert(*unit_id, fci);

        // installed capacity bounds the reference flow in every scenario
        for acc in accounts.iter() {
            let throughput = acc.throughput_of(*unit_id);
            constraints.push(constraint!(throughput <= cap));
        }
    }

    // HEN capital: the same convex-combination encoding over the exchanged
    // duty of each interval, gated by the interval's installation binary so
    // an interval with no heat flow carries no bank and no cost.
    let mut hen_capital = Expression::from(0.0);
    if let Some(bp) = &design.hen_breakpoints {
        for (interval, active) in &design.hen_active {
            let active = *active;
            let cap = design.hen_capacity[interval];

            let mut lambda_sum = Expression::from(0.0);
            let mut segment_sum = Expression::from(0.0);
            let mut cap_expr = Expression::from(0.0);
            let mut cost_expr = Expression::from(0.0);
            for j in 0..bp.len() {
                let lam = design.hen_lambda[&(*interval, j)];
                lambda_sum += lam;
                cap_expr += bp.x[j] * lam;
                cost_expr += bp.y[j] * lam;

                let mut adjacent = Expression::from(0.0);
                if j > 0 {
                    adjacent += design.hen_segment[&(*interval, j - 1)];
                }
                if j < bp.segments() {
                    adjacent += design.hen_segment[&(*interval, j)];
                }
                constraints.push(constraint!(lam <= adjacent));
            }
            for j in 0..bp.segments() {
                segment_sum += design.hen_segment[&(*interval, j)];
            }
            constraints.push(constraint!(lambda_sum == active));
            constraints.push(constraint!(segment_sum == active));
            constraints.push(constraint!(cap == cap_expr));

            hen_capital += lang_factor * cost_expr;
        }
        total_fci += hen_capital.clone();
    }

    let mut annualized = Expression::from(0.0);
    let crf = econ.capital_recovery_factor();
    annualized += crf * total_fci.clone();
    if let (Some(hp), Some(cap)) = (&ss.heat_pump, design.hp_capacity) {
        annualized += crf * hp.capex_per_mw * cap;
    }
    let om_cost = econ.om_factor * total_fci;

    // Per-scenario OPEX blocks and the headline cost/profit expressions.
    for ((scenario, sv), acc) in scenarios
        .iter()
        .zip(scenario_vars)
        .zip(accounts.iter_mut())
    {
        let mut raw_material = Expression::from(0.0);
        for unit in ss.source_units() {
            if let Some(price) = scenario.params.feed_price(unit.id) {
                let hours = scenario
                    .params
                    .full_load_hours(unit.id)
                    .unwrap_or(unit.full_load_hours);
                if let Some(feed) = sv.feed.get(&unit.id) {
                    raw_material += price * hours * *feed;
                }
            }
        }

        let mut waste_cost = Expression::from(0.0);
        for unit in &ss.units {
            let Some(treatment) = unit.waste_treatment else {
                continue;
            };
            let price = econ.waste_costs.get(&treatment).copied().unwrap_or(0.0);
            let hours = scenario
                .params
                .full_load_hours(unit.id)
                .unwrap_or(unit.full_load_hours);
            for component in problem.sets.components_out(unit.id) {
                if let Some(w) = sv.waste.get(&(unit.id, component)) {
                    waste_cost += price * hours * *w;
                }
            }
        }

        let mut revenue = Expression::from(0.0);
        for unit in ss.product_pools() {
            if let Some(price) = scenario.params.product_price(unit.id) {
                let hours = scenario
                    .params
                    .full_load_hours(unit.id)
                    .unwrap_or(unit.full_load_hours);
                revenue += price * hours * acc.throughput_of(unit.id);
            }
        }

        acc.raw_material_cost = raw_material.clone();
        acc.waste_cost = waste_cost.clone();
        acc.revenue = revenue.clone();
        acc.tac = annualized.clone()
            + om_cost.clone()
            + raw_material
            + acc.utility_cost.clone()
            + waste_cost;
        acc.ebit = revenue - acc.tac.clone();
    }

    Ok(DesignAccounts {
        equipment_cost,
        fixed_capital,
        hen_capital,
        annualized_capital: annualized,
        om_cost,
    })
}
