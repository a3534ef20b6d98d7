//! Mass balances: flow-choice switching, distributor expansions, reactor
//! transformations, concentration ratios and the load target.

use super::{DesignVars, ScenarioAccounts, ScenarioVars};
use crate::params::{ConversionIndex, PhiIndex, SplitIndex, StoichIndex, YieldIndex};
use crate::problem::{FlowsheetProblem, Scenario};
use good_lp::{constraint, Constraint, Expression};
use trellis_core::{
    ConcMode, LoadSpec, TrellisError, TrellisResult, UnitId, UnitType,
};

pub(crate) fn add_mass_balances(
    problem: &FlowsheetProblem,
    scenario: &Scenario,
    design: &DesignVars,
    sv: &ScenarioVars,
    acc: &mut ScenarioAccounts,
    constraints: &mut Vec<Constraint>,
) -> TrellisResult<()> {
    build_inlet_expressions(problem, sv, acc);
    add_source_balances(problem, scenario, design, sv, constraints)?;
    add_transfer_equations(problem, scenario, sv, acc, constraints)?;
    add_flow_choice(problem, scenario, design, sv, constraints);
    add_distributor_expansion(problem, design, sv, constraints);
    add_mass_closure(problem, sv, constraints);
    add_concentration_constraints(problem, sv, acc, constraints);
    add_load_target(problem, sv, acc, constraints)?;
    Ok(())
}

/// Inlet of every unit is the sum of declared incoming flows; a source's
/// reference flow is its feed rate.
fn build_inlet_expressions(problem: &FlowsheetProblem, sv: &ScenarioVars, acc: &mut ScenarioAccounts) {
    let sets = &problem.sets;
    for unit in &problem.superstructure.units {
        let mut total = Expression::from(0.0);
        for component in sets.components_at(unit.id) {
            let mut expr = Expression::from(0.0);
            for pred in sets.predecessors_of(unit.id) {
                if let Some(f) = sv.flow.get(&(pred, unit.id, component.clone())) {
                    expr += *f;
                }
            }
            total += expr.clone();
            acc.inlet.insert((unit.id, component), expr);
        }
        let throughput = if unit.unit_type.is_source() {
            sv.feed
                .get(&unit.id)
                .map(|f| Expression::from(*f))
                .unwrap_or_else(|| Expression::from(0.0))
        } else {
            total
        };
        acc.throughput.insert(unit.id, throughput);
    }
}

fn add_source_balances(
    problem: &FlowsheetProblem,
    scenario: &Scenario,
    design: &DesignVars,
    sv: &ScenarioVars,
    constraints: &mut Vec<Constraint>,
) -> TrellisResult<()> {
    let ss = &problem.superstructure;
    for unit in ss.source_units() {
        let feed = *sv
            .feed
            .get(&unit.id)
            .ok_or_else(|| TrellisError::Config(format!("no feed variable for {}", unit.id)))?;
        let y = design.y[&unit.id];

        // Outlet is the feed split by the (mutable) composition.
        for component in problem.sets.components_out(unit.id) {
            let phi = scenario
                .params
                .composition(&PhiIndex {
                    unit: unit.id,
                    component: component.clone(),
                })
                .unwrap_or(0.0);
            let out = sv.outlet[&(unit.id, component)];
            constraints.push(constraint!(out == phi * feed));
        }

        // Availability bounds, active only when the source is built.
        let upper = unit
            .feed_upper_bound
            .unwrap_or_else(|| problem.options.big_m_for(ss, unit.id));
        constraints.push(constraint!(feed <= upper * y));
        if let Some(lower) = unit.feed_lower_bound {
            constraints.push(constraint!(feed >= lower * y));
        }
    }
    Ok(())
}

/// Unit-type transfer equations defining each outlet from the inlet.
fn add_transfer_equations(
    problem: &FlowsheetProblem,
    scenario: &Scenario,
    sv: &ScenarioVars,
    acc: &ScenarioAccounts,
    constraints: &mut Vec<Constraint>,
) -> TrellisResult<()> {
    let sets = &problem.sets;
    for unit in &problem.superstructure.units {
        match unit.unit_type {
            UnitType::Source => {} // handled with the feed balance
            UnitType::Turbine | UnitType::Furnace | UnitType::Chp => {} // mass fully consumed
            UnitType::StoichReactor => {
                let conversions: Vec<(ConversionIndex, f64)> = scenario
                    .params
                    .conversions_of(unit.id)
                    .map(|(k, v)| (k.clone(), v))
                    .collect();
                for component in sets.components_out(unit.id) {
                    let mut expr = acc.inlet_of(unit.id, &component);
                    for (key, theta) in &conversions {
                        let gamma = scenario.params.stoichiometry(&StoichIndex {
                            unit: unit.id,
                            component: component.clone(),
                            reaction: key.reaction.clone(),
                        });
                        if let Some(gamma) = gamma {
                            expr += gamma * theta * acc.inlet_of(unit.id, &key.component);
                        }
                    }
                    let out = sv.outlet[&(unit.id, component)];
                    constraints.push(constraint!(out == expr));
                }
            }
            UnitType::YieldReactor => {
                add_yield_equations(problem, scenario, unit.id, sv, acc, constraints);
            }
            _ => {
                // Pass-through units: pools, physical processes, distributors.
                for component in sets.components_out(unit.id) {
                    let out = sv.outlet[&(unit.id, component.clone())];
                    let inlet = acc.inlet_of(unit.id, &component);
                    constraints.push(constraint!(out == inlet));
                }
            }
        }
    }
    Ok(())
}

fn add_yield_equations(
    problem: &FlowsheetProblem,
    scenario: &Scenario,
    unit_id: UnitId,
    sv: &ScenarioVars,
    acc: &ScenarioAccounts,
    constraints: &mut Vec<Constraint>,
) {
    let Some(unit) = problem.superstructure.unit(unit_id) else {
        return;
    };
    let sets = &problem.sets;

    // The reacting pool: every arriving component, minus declared inerts
    // when carryover is enabled.
    let mut pool = Expression::from(0.0);
    for component in sets.components_at(unit_id) {
        if unit.inert_carryover && unit.inert_components.contains(&component) {
            continue;
        }
        pool += acc.inlet_of(unit_id, &component);
    }

    for component in sets.components_out(unit_id) {
        let out = sv.outlet[&(unit_id, component.clone())];
        if unit.inert_carryover && unit.inert_components.contains(&component) {
            // inert mass bypasses the reaction unchanged
            let inlet = acc.inlet_of(unit_id, &component);
            constraints.push(constraint!(out == inlet));
            continue;
        }
        let xi = scenario
            .params
            .yield_factor(&YieldIndex {
                unit: unit_id,
                component: component.clone(),
            })
            .unwrap_or(0.0);
        constraints.push(constraint!(out == xi * pool.clone()));
    }
}

/// Ordinary big-M flow choice: with the target active the flow is pinned to
/// the nominal split of the outlet; inactive targets receive nothing.
fn add_flow_choice(
    problem: &FlowsheetProblem,
    scenario: &Scenario,
    design: &DesignVars,
    sv: &ScenarioVars,
    constraints: &mut Vec<Constraint>,
) {
    let ss = &problem.superstructure;
    for (from, to) in &problem.sets.ordinary_pairs {
        let m = problem.options.big_m_for(ss, *to);
        let y_to = design.y[to];
        for component in problem.sets.components_out(*from) {
            let f = sv.flow[&(*from, *to, component.clone())];
            let out = sv.outlet[&(*from, component.clone())];
            let split = scenario
                .params
                .split_factor(&SplitIndex {
                    unit: *from,
                    target: *to,
                    component,
                })
                .unwrap_or(0.0);
            constraints.push(constraint!(f - split * out <= m - m * y_to));
            constraints.push(constraint!(f - split * out >= -m + m * y_to));
            constraints.push(constraint!(f <= m * y_to));
        }
    }
}

/// Distributor split fractions as weighted sums of binary digit selectors,
/// with the digit-times-outlet product linearized through auxiliary flows.
fn add_distributor_expansion(
    problem: &FlowsheetProblem,
    design: &DesignVars,
    sv: &ScenarioVars,
    constraints: &mut Vec<Constraint>,
) {
    let ss = &problem.superstructure;
    let sets = &problem.sets;

    for unit in ss.distributor_units() {
        let u = unit.id;
        let y_u = design.y[&u];
        let m = problem.options.big_m_for(ss, u);

        match unit.unit_type {
            UnitType::Distributor => {
                let targets: Vec<UnitId> = sets
                    .distributor_pairs
                    .iter()
                    .filter(|(from, _)| *from == u)
                    .map(|(_, to)| *to)
                    .collect();

                // At most one digit per decimal place and edge.
                for to in &targets {
                    for place in &sets.decimal_places {
                        let mut selected = Expression::from(0.0);
                        for d in &sets.digits {
                            selected += design.digit[&(u, *to, *place, *d)];
                        }
                        constraints.push(constraint!(selected <= 1.0));
                    }
                }

                // Fractions over all edges sum to exactly the activation.
                let mut fraction_total = Expression::from(0.0);
                for to in &targets {
                    for place in &sets.decimal_places {
                        for d in &sets.digits {
                            let weight = digit_weight(*place, *d);
                            fraction_total += weight * design.digit[&(u, *to, *place, *d)];
                        }
                    }
                }
                constraints.push(constraint!(fraction_total == y_u));

                for to in &targets {
                    for component in sets.components_out(u) {
                        let out = sv.outlet[&(u, component.clone())];
                        let mut flow_expr = Expression::from(0.0);
                        for place in &sets.decimal_places {
                            for d in &sets.digits {
                                let z = design.digit[&(u, *to, *place, *d)];
                                let w =
                                    sv.digit_flow[&(u, *to, *place, *d, component.clone())];
                                flow_expr += digit_weight(*place, *d) * w;
                                // w equals the outlet when the digit is
                                // selected and zero otherwise
                                constraints.push(constraint!(w <= out));
                                constraints.push(constraint!(w <= m * z));
                                constraints.push(constraint!(w >= out + m * z - m));
                            }
                        }
                        let f = sv.flow[&(u, *to, component.clone())];
                        constraints.push(constraint!(f == flow_expr));
                        // an inactive target receives nothing, as in the
                        // ordinary flow-choice family
                        constraints.push(constraint!(f <= m * design.y[to]));
                    }
                }
            }
            UnitType::BooleanDistributor => {
                let targets: Vec<UnitId> = sets
                    .boolean_pairs
                    .iter()
                    .filter(|(from, _)| *from == u)
                    .map(|(_, to)| *to)
                    .collect();
                let mut selected = Expression::from(0.0);
                for to in &targets {
                    selected += design.edge[&(u, *to)];
                    for component in sets.components_out(u) {
                        let f = sv.flow[&(u, *to, component.clone())];
                        let e = design.edge[&(u, *to)];
                        constraints.push(constraint!(f <= m * e));
                        constraints.push(constraint!(f <= m * design.y[to]));
                    }
                }
                constraints.push(constraint!(selected == y_u));
            }
            _ => {}
        }
    }
}

fn digit_weight(place: usize, digit: usize) -> f64 {
    digit as f64 * 10f64.powi(-(place as i32))
}

/// Everything a unit emits either continues downstream or strands as waste.
fn add_mass_closure(problem: &FlowsheetProblem, sv: &ScenarioVars, constraints: &mut Vec<Constraint>) {
    let sets = &problem.sets;
    for unit in &problem.superstructure.units {
        let successors = sets.successors_of(unit.id);
        if successors.is_empty() {
            continue;
        }
        for component in sets.components_out(unit.id) {
            let out = sv.outlet[&(unit.id, component.clone())];
            let mut routed = Expression::from(0.0);
            for to in &successors {
                routed += sv.flow[&(unit.id, *to, component.clone())];
            }
            if let Some(w) = sv.waste.get(&(unit.id, component.clone())) {
                routed += *w;
            }
            constraints.push(constraint!(routed == out));
        }
    }
}

/// Required concentration ratios; skipped entirely when either side resolves
/// to the not-applicable mode.
fn add_concentration_constraints(
    problem: &FlowsheetProblem,
    sv: &ScenarioVars,
    acc: &ScenarioAccounts,
    constraints: &mut Vec<Constraint>,
) {
    for unit in &problem.superstructure.units {
        let Some(spec) = &unit.concentration else {
            continue;
        };
        if !spec.applies() {
            continue;
        }
        let side_expr = |mode: ConcMode, components: &[trellis_core::Component]| {
            let mut expr = Expression::from(0.0);
            for component in components {
                match mode {
                    ConcMode::Inlet => expr += acc.inlet_of(unit.id, component),
                    ConcMode::Outlet => {
                        if let Some(out) = sv.outlet.get(&(unit.id, component.clone())) {
                            expr += *out;
                        }
                    }
                    ConcMode::NotApplicable => {}
                }
            }
            expr
        };
        let numerator = side_expr(spec.numerator.mode, &spec.numerator.components);
        let denominator = side_expr(spec.denominator.mode, &spec.denominator.components);
        constraints.push(constraint!(numerator == spec.ratio * denominator));
    }
}

fn add_load_target(
    problem: &FlowsheetProblem,
    sv: &ScenarioVars,
    acc: &ScenarioAccounts,
    constraints: &mut Vec<Constraint>,
) -> TrellisResult<()> {
    match &problem.superstructure.load {
        LoadSpec::Substrate { unit, tons_per_hour } => {
            let feed = sv.feed.get(unit).ok_or_else(|| {
                TrellisError::Config(format!(
                    "load substrate {} is not a raw-material source",
                    unit
                ))
            })?;
            constraints.push(constraint!(*feed == *tons_per_hour));
        }
        LoadSpec::Product { pool, tons_per_hour } => {
            let unit = problem
                .superstructure
                .unit_by_name(pool)
                .ok_or_else(|| {
                    TrellisError::Config(format!("load target '{}' is not a declared unit", pool))
                })?;
            let collected = acc.throughput_of(unit.id);
            constraints.push(constraint!(collected == *tons_per_hour));
        }
    }
    Ok(())
}
