//! Stage-ordered MILP assembly.
//!
//! Assembly is a strict linear pipeline over one instance; each stage only
//! references variables and expressions declared by earlier stages:
//!
//! 1. variable declaration (first-stage design, then per-scenario recourse)
//! 2. mass balances (flow choice, distributors, reactors, concentration, load)
//! 3. energy balances (heat cascade, heat pump, electricity)
//! 4. waste costs and economic evaluation (piecewise CAPEX, OPEX, TAC, EBIT)
//! 5. environmental, freshwater and LCA aggregation
//! 6. decision-making logic (groups, successor implications)
//! 7. objective selection
//!
//! First-stage design variables (activation binaries, distributor digit
//! selectors, capacities and cost segments) are shared across scenarios;
//! every mass/energy/cost variable is declared once per scenario and tied to
//! that scenario's parameter store. The deterministic run is the
//! single-scenario special case with weight 1.

pub(crate) mod economics;
pub(crate) mod energy;
pub(crate) mod environment;
pub(crate) mod logic;
pub(crate) mod mass;
pub(crate) mod objective;

use crate::piecewise::{self, Breakpoints};
use crate::problem::{FlowsheetProblem, Scenario};
use good_lp::{constraint, variable, variables, Constraint, Expression, ProblemVariables, Variable};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use trellis_core::{Component, TrellisResult, UnitId};

/// Shared first-stage (design) variables.
pub struct DesignVars {
    /// Unit activation binaries
    pub y: IndexMap<UnitId, Variable>,
    /// Distributor digit selectors, keyed `(from, to, place, digit)`
    pub digit: IndexMap<(UnitId, UnitId, usize, usize), Variable>,
    /// All-or-nothing distributor edge binaries
    pub edge: IndexMap<(UnitId, UnitId), Variable>,
    /// Convex-combination weights per costed unit and breakpoint
    pub lambda: IndexMap<(UnitId, usize), Variable>,
    /// Segment selector binaries per costed unit
    pub segment: IndexMap<(UnitId, usize), Variable>,
    /// Installed capacity (t/h) per costed unit
    pub capacity: IndexMap<UnitId, Variable>,
    /// Linearized cost curves per costed unit
    pub breakpoints: BTreeMap<UnitId, Breakpoints>,
    /// Heat-pump sink capacity (MW), present when a pump is configured
    pub hp_capacity: Option<Variable>,
    /// HEN exchanged-duty capacity per temperature interval (MW)
    pub hen_capacity: IndexMap<usize, Variable>,
    /// HEN installation binaries per interval
    pub hen_active: IndexMap<usize, Variable>,
    /// HEN convex-combination weights, keyed `(interval, breakpoint)`
    pub hen_lambda: IndexMap<(usize, usize), Variable>,
    /// HEN segment selector binaries, keyed `(interval, segment)`
    pub hen_segment: IndexMap<(usize, usize), Variable>,
    /// Linearized HEN cost curve, shared by all intervals
    pub hen_breakpoints: Option<Breakpoints>,
}

/// Second-stage (operational) variables of one scenario.
pub struct ScenarioVars {
    pub name: String,
    pub weight: f64,
    /// Raw-material intake per source unit (t/h)
    pub feed: IndexMap<UnitId, Variable>,
    /// Component flow on each declared connection (t/h)
    pub flow: IndexMap<(UnitId, UnitId, Component), Variable>,
    /// Component outlet of each unit (t/h)
    pub outlet: IndexMap<(UnitId, Component), Variable>,
    /// Unrouted outlet remainder per unit and component (t/h)
    pub waste: IndexMap<(UnitId, Component), Variable>,
    /// Distributor product-linearization flows, keyed
    /// `(from, to, place, digit, component)`
    pub digit_flow: IndexMap<(UnitId, UnitId, usize, usize, Component), Variable>,
    /// Cascade residual leaving each temperature interval (MW)
    pub residual: IndexMap<usize, Variable>,
    /// Hot utility into the top interval (MW)
    pub hot_utility: Variable,
    /// Cold utility out of the bottom interval (MW)
    pub cold_utility: Variable,
    /// Heat delivered by the heat pump at its sink interval (MW)
    pub hp_duty: Option<Variable>,
    /// Grid electricity purchased / sold (MW)
    pub elec_purchase: Variable,
    pub elec_sale: Variable,
}

/// Named expressions accumulated per scenario while stages run; evaluated
/// against the solved model for the reporting surface.
pub struct ScenarioAccounts {
    /// Component inlet of each unit
    pub inlet: IndexMap<(UnitId, Component), Expression>,
    /// Total inlet (feed rate for sources), the reference flow of a unit
    pub throughput: IndexMap<UnitId, Expression>,
    pub raw_material_cost: Expression,
    pub utility_cost: Expression,
    pub waste_cost: Expression,
    pub revenue: Expression,
    /// Annual direct + indirect emissions (t CO2e/a)
    pub emissions: Expression,
    /// Annual freshwater demand (m3/a)
    pub freshwater: Expression,
    /// Annual LCA totals per impact category
    pub impacts: BTreeMap<String, Expression>,
    /// Total annualized cost of this scenario
    pub tac: Expression,
    pub ebit: Expression,
}

impl ScenarioAccounts {
    fn new() -> Self {
        Self {
            inlet: IndexMap::new(),
            throughput: IndexMap::new(),
            raw_material_cost: Expression::from(0.0),
            utility_cost: Expression::from(0.0),
            waste_cost: Expression::from(0.0),
            revenue: Expression::from(0.0),
            emissions: Expression::from(0.0),
            freshwater: Expression::from(0.0),
            impacts: BTreeMap::new(),
            tac: Expression::from(0.0),
            ebit: Expression::from(0.0),
        }
    }

    pub(crate) fn inlet_of(&self, unit: UnitId, component: &Component) -> Expression {
        self.inlet
            .get(&(unit, component.clone()))
            .cloned()
            .unwrap_or_else(|| Expression::from(0.0))
    }

    pub(crate) fn throughput_of(&self, unit: UnitId) -> Expression {
        self.throughput
            .get(&unit)
            .cloned()
            .unwrap_or_else(|| Expression::from(0.0))
    }
}

/// Design-level cost expressions, shared across scenarios.
pub struct DesignAccounts {
    /// Escalated equipment cost per costed unit
    pub equipment_cost: IndexMap<UnitId, Expression>,
    /// Fixed capital investment per costed unit
    pub fixed_capital: IndexMap<UnitId, Expression>,
    /// HEN capital investment summed over temperature intervals
    pub hen_capital: Expression,
    /// Annualized capital charge (CRF on total FCI, heat pump included)
    pub annualized_capital: Expression,
    /// Fixed O&M charge per year
    pub om_cost: Expression,
}

/// The fully assembled instance, ready for the solve orchestrator.
pub struct AssembledModel {
    pub variables: ProblemVariables,
    pub constraints: Vec<Constraint>,
    pub objective_expr: Expression,
    pub maximize: bool,
    pub design: DesignVars,
    pub scenario_vars: Vec<ScenarioVars>,
    pub accounts: Vec<ScenarioAccounts>,
    pub design_accounts: DesignAccounts,
    pub annual_load: f64,
}

/// Run the full assembly pipeline over `problem`.
pub fn assemble(problem: &FlowsheetProblem) -> TrellisResult<AssembledModel> {
    let scenarios = problem.scenario_set();
    let mut vars = variables!();
    let mut constraints: Vec<Constraint> = Vec::new();

    let design = declare_design_vars(problem, &mut vars)?;
    let scenario_vars: Vec<ScenarioVars> = scenarios
        .iter()
        .map(|s| declare_scenario_vars(problem, s, &mut vars))
        .collect();

    // Frozen-design mode pins every activation binary; units absent from the
    // frozen map stay inactive.
    if let Some(fixed) = &problem.options.fixed_design {
        for (unit, y) in &design.y {
            let value = if fixed.get(unit).copied().unwrap_or(false) {
                1.0
            } else {
                0.0
            };
            constraints.push(constraint!(*y == value));
        }
    }

    let mut accounts: Vec<ScenarioAccounts> = Vec::with_capacity(scenarios.len());
    for (scenario, sv) in scenarios.iter().zip(&scenario_vars) {
        let mut acc = ScenarioAccounts::new();
        mass::add_mass_balances(problem, scenario, &design, sv, &mut acc, &mut constraints)?;
        energy::add_energy_balances(problem, scenario, &design, sv, &mut acc, &mut constraints)?;
        accounts.push(acc);
    }

    let design_accounts = economics::add_economics(
        problem,
        &scenarios,
        &design,
        &scenario_vars,
        &mut accounts,
        &mut constraints,
    )?;

    for ((scenario, sv), acc) in scenarios.iter().zip(&scenario_vars).zip(accounts.iter_mut()) {
        environment::add_environmental(problem, scenario, sv, acc);
    }

    logic::add_decision_logic(problem, &design, &mut constraints);

    let annual_load = problem.annual_load();
    let (objective_expr, maximize) =
        objective::build_objective(problem, &scenarios, &accounts, annual_load)?;

    Ok(AssembledModel {
        variables: vars,
        constraints,
        objective_expr,
        maximize,
        design,
        scenario_vars,
        accounts,
        design_accounts,
        annual_load,
    })
}

fn declare_design_vars(
    problem: &FlowsheetProblem,
    vars: &mut ProblemVariables,
) -> TrellisResult<DesignVars> {
    let ss = &problem.superstructure;
    let sets = &problem.sets;
    let opts = &problem.options;

    let mut y = IndexMap::new();
    for unit in &sets.units {
        y.insert(*unit, vars.add(variable().binary()));
    }

    let mut digit = IndexMap::new();
    for (from, to) in &sets.distributor_pairs {
        for place in &sets.decimal_places {
            for d in &sets.digits {
                digit.insert((*from, *to, *place, *d), vars.add(variable().binary()));
            }
        }
    }

    let mut edge = IndexMap::new();
    for (from, to) in &sets.boolean_pairs {
        edge.insert((*from, *to), vars.add(variable().binary()));
    }

    let load_cap = ss.load.tons_per_hour() * opts.capacity_margin;
    let mut lambda = IndexMap::new();
    let mut segment = IndexMap::new();
    let mut capacity = IndexMap::new();
    let mut breakpoints = BTreeMap::new();
    for unit in &ss.units {
        let Some(curve) = &unit.capex_curve else {
            continue;
        };
        let reference_cost = problem
            .base
            .reference_cost(unit.id)
            .unwrap_or(curve.reference_cost);
        let max_cap = load_cap.max(curve.reference_capacity);
        let bp = piecewise::linearize(
            curve,
            reference_cost,
            &ss.economics,
            max_cap,
            opts.capex_segments,
        )?;
        for j in 0..bp.len() {
            lambda.insert((unit.id, j), vars.add(variable().min(0.0).max(1.0)));
        }
        for j in 0..bp.segments() {
            segment.insert((unit.id, j), vars.add(variable().binary()));
        }
        capacity.insert(unit.id, vars.add(variable().min(0.0).max(max_cap)));
        breakpoints.insert(unit.id, bp);
    }

    let hp_capacity = ss
        .heat_pump
        .as_ref()
        .map(|_| vars.add(variable().min(0.0)));

    // One exchanger bank per temperature interval, costed over the duty
    // crossing it.
    let mut hen_capacity = IndexMap::new();
    let mut hen_active = IndexMap::new();
    let mut hen_lambda = IndexMap::new();
    let mut hen_segment = IndexMap::new();
    let mut hen_breakpoints = None;
    if let Some(hen) = &ss.hen {
        let bp = piecewise::linearize(
            &hen.capex_curve,
            hen.capex_curve.reference_cost,
            &ss.economics,
            hen.max_duty_mw,
            opts.capex_segments,
        )?;
        for interval in &sets.intervals {
            hen_capacity.insert(
                *interval,
                vars.add(variable().min(0.0).max(hen.max_duty_mw)),
            );
            hen_active.insert(*interval, vars.add(variable().binary()));
            for j in 0..bp.len() {
                hen_lambda.insert((*interval, j), vars.add(variable().min(0.0).max(1.0)));
            }
            for j in 0..bp.segments() {
                hen_segment.insert((*interval, j), vars.add(variable().binary()));
            }
        }
        hen_breakpoints = Some(bp);
    }

    Ok(DesignVars {
        y,
        digit,
        edge,
        lambda,
        segment,
        capacity,
        breakpoints,
        hp_capacity,
        hen_capacity,
        hen_active,
        hen_lambda,
        hen_segment,
        hen_breakpoints,
    })
}

fn declare_scenario_vars(
    problem: &FlowsheetProblem,
    scenario: &Scenario,
    vars: &mut ProblemVariables,
) -> ScenarioVars {
    let ss = &problem.superstructure;
    let sets = &problem.sets;

    let mut feed = IndexMap::new();
    for unit in ss.source_units() {
        let upper = unit
            .feed_upper_bound
            .unwrap_or_else(|| problem.options.big_m_for(ss, unit.id));
        feed.insert(unit.id, vars.add(variable().min(0.0).max(upper)));
    }

    let mut flow = IndexMap::new();
    for (from, to) in &sets.unit_connections {
        for component in sets.components_out(*from) {
            flow.insert((*from, *to, component), vars.add(variable().min(0.0)));
        }
    }

    let mut outlet = IndexMap::new();
    for unit in &sets.units {
        for component in sets.components_out(*unit) {
            outlet.insert((*unit, component), vars.add(variable().min(0.0)));
        }
    }

    // Only ordinary-family units can strand mass; distributor closure routes
    // everything downstream.
    let mut waste = IndexMap::new();
    for unit in &ss.units {
        if unit.unit_type.is_distributor() {
            continue;
        }
        if sets.successors_of(unit.id).is_empty() {
            continue;
        }
        for component in sets.components_out(unit.id) {
            waste.insert((unit.id, component), vars.add(variable().min(0.0)));
        }
    }

    let mut digit_flow = IndexMap::new();
    for (from, to) in &sets.distributor_pairs {
        for place in &sets.decimal_places {
            for d in &sets.digits {
                for component in sets.components_out(*from) {
                    digit_flow.insert(
                        (*from, *to, *place, *d, component),
                        vars.add(variable().min(0.0)),
                    );
                }
            }
        }
    }

    let mut residual = IndexMap::new();
    for interval in &sets.intervals {
        residual.insert(*interval, vars.add(variable().min(0.0)));
    }

    let hp_duty = ss.heat_pump.as_ref().map(|_| vars.add(variable().min(0.0)));

    ScenarioVars {
        name: scenario.name.clone(),
        weight: scenario.weight,
        feed,
        flow,
        outlet,
        waste,
        digit_flow,
        residual,
        hot_utility: vars.add(variable().min(0.0)),
        cold_utility: vars.add(variable().min(0.0)),
        hp_duty,
        elec_purchase: vars.add(variable().min(0.0)),
        elec_sale: vars.add(variable().min(0.0)),
    }
}
