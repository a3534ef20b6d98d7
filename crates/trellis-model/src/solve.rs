//! Solve orchestration: assemble the instance, hand it to the MILP engine
//! and extract the named-variable surface.

use crate::assemble::{assemble, AssembledModel};
use crate::problem::FlowsheetProblem;
use crate::solution::{FlowsheetSolution, ScenarioOutcome};
use good_lp::solvers::highs::highs;
use good_lp::{Solution, SolutionStatus, SolverModel};
use std::collections::BTreeMap;
use std::time::Instant;
use trellis_core::{TrellisError, TrellisResult};

/// Solver configuration, passed through to the engine unmodified.
#[derive(Debug, Clone)]
pub struct SolveConfig {
    /// Maximum solve time (seconds)
    pub max_time_seconds: f64,
    /// Relative MIP optimality gap tolerance
    pub mip_gap: f64,
    /// Whether to enable verbose solver output
    pub verbose: bool,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            max_time_seconds: 300.0,
            mip_gap: 1e-4,
            verbose: false,
        }
    }
}

/// Assemble and solve one instance.
///
/// Solver-reported infeasibility or unboundedness surfaces opaquely as a
/// [`TrellisError::Solver`]; no diagnosis or relaxation is attempted here.
pub fn solve_flowsheet(
    problem: &FlowsheetProblem,
    config: &SolveConfig,
) -> TrellisResult<FlowsheetSolution> {
    let start = Instant::now();

    let AssembledModel {
        variables,
        constraints,
        objective_expr,
        maximize,
        design,
        scenario_vars,
        accounts,
        design_accounts,
        annual_load,
    } = assemble(problem)?;

    let unsolved = if maximize {
        variables.maximise(objective_expr.clone())
    } else {
        variables.minimise(objective_expr.clone())
    };
    let mut model = unsolved
        .using(highs)
        .set_time_limit(config.max_time_seconds);
    model.set_verbose(config.verbose);
    if config.mip_gap > 0.0 {
        model = model
            .set_mip_rel_gap(config.mip_gap as f32)
            .map_err(|e| TrellisError::Solver(format!("{:?}", e)))?;
    }
    for constraint in constraints {
        model = model.with(constraint);
    }

    let solved = model
        .solve()
        .map_err(|e| TrellisError::Solver(format!("{:?}", e)))?;
    let status = match solved.status() {
        SolutionStatus::Optimal => "Optimal",
        SolutionStatus::GapLimit => "GapLimit",
        SolutionStatus::TimeLimit => "TimeLimit",
    };

    let mut active_units = BTreeMap::new();
    for (unit, y) in &design.y {
        active_units.insert(*unit, solved.value(*y) > 0.5);
    }
    let mut capacities = BTreeMap::new();
    for (unit, cap) in &design.capacity {
        capacities.insert(*unit, solved.value(*cap));
    }
    let mut equipment_cost = BTreeMap::new();
    for (unit, expr) in &design_accounts.equipment_cost {
        equipment_cost.insert(*unit, solved.eval(expr));
    }
    let mut fixed_capital = BTreeMap::new();
    for (unit, expr) in &design_accounts.fixed_capital {
        fixed_capital.insert(*unit, solved.eval(expr));
    }

    let mut scenarios = Vec::with_capacity(scenario_vars.len());
    for (sv, acc) in scenario_vars.iter().zip(&accounts) {
        let mut flows = BTreeMap::new();
        for ((from, to, component), f) in &sv.flow {
            flows.insert(
                format!("{}->{}:{}", from.value(), to.value(), component),
                solved.value(*f),
            );
        }
        let mut feed = BTreeMap::new();
        for (unit, f) in &sv.feed {
            feed.insert(*unit, solved.value(*f));
        }
        let mut impacts = BTreeMap::new();
        for (category, expr) in &acc.impacts {
            impacts.insert(category.clone(), solved.eval(expr));
        }

        let tac = solved.eval(&acc.tac);
        let ebit = solved.eval(&acc.ebit);
        scenarios.push(ScenarioOutcome {
            name: sv.name.clone(),
            weight: sv.weight,
            tac,
            ebit,
            npc: tac / annual_load,
            npe: solved.eval(&acc.emissions) / annual_load,
            npfwd: solved.eval(&acc.freshwater) / annual_load,
            impacts,
            flows,
            feed,
            revenue: solved.eval(&acc.revenue),
            raw_material_cost: solved.eval(&acc.raw_material_cost),
            utility_cost: solved.eval(&acc.utility_cost),
            waste_cost: solved.eval(&acc.waste_cost),
            hot_utility: solved.value(sv.hot_utility),
            cold_utility: solved.value(sv.cold_utility),
            electricity_purchased: solved.value(sv.elec_purchase),
            electricity_sold: solved.value(sv.elec_sale),
        });
    }

    Ok(FlowsheetSolution {
        objective: problem.superstructure.objective.clone(),
        objective_value: solved.eval(&objective_expr),
        status: status.to_string(),
        solve_time_seconds: start.elapsed().as_secs_f64(),
        annual_load,
        active_units,
        capacities,
        equipment_cost,
        fixed_capital,
        hen_capital: solved.eval(&design_accounts.hen_capital),
        annualized_capital: solved.eval(&design_accounts.annualized_capital),
        om_cost: solved.eval(&design_accounts.om_cost),
        scenarios,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParameterChange;
    use crate::problem::Scenario;
    use trellis_core::{
        CapexCurve, Component, HenSpec, LoadSpec, Objective, Reaction, Superstructure,
        TemperatureInterval, UnitId, UnitOperation, UnitType,
    };

    /// One source feeding one product pool through a unit split factor.
    fn toy_flowsheet() -> Superstructure {
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
        feed.set_split_factor(UnitId::new(2), Component::new("A"), 1.0)
            .unwrap();
        feed.feed_price = Some(40.0);
        feed.feed_upper_bound = Some(100.0);
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
    fn test_toy_flowsheet_npc() {
        let problem = FlowsheetProblem::new(toy_flowsheet()).unwrap();
        let solution = solve_flowsheet(&problem, &SolveConfig::default()).unwrap();

        // the flow equals the source feed exactly, no loss
        let flow = solution.scenarios[0].flows["1->2:A"];
        assert!((flow - 10.0).abs() < 1e-4);
        assert!((solution.scenarios[0].feed[&UnitId::new(1)] - 10.0).abs() < 1e-4);

        // no capex, no utilities: TAC is the raw-material bill and NPC its
        // specific value at 10 t/h over 8000 h/a
        let tac = solution.scenarios[0].tac;
        assert!((tac - 40.0 * 10.0 * 8000.0).abs() / tac < 1e-4);
        assert!((solution.objective_value - 40.0).abs() < 1e-3);
        assert_eq!(solution.status, "Optimal");
    }

    #[test]
    fn test_big_m_forces_zero_flow_on_inactive_unit() {
        let mut design = BTreeMap::new();
        design.insert(UnitId::new(1), true);
        design.insert(UnitId::new(2), false);
        let problem = FlowsheetProblem::new(toy_flowsheet())
            .unwrap()
            .fixed_design(design);
        let solution = solve_flowsheet(&problem, &SolveConfig::default()).unwrap();

        assert!(!solution.active_units[&UnitId::new(2)]);
        let flow = solution.scenarios[0].flows["1->2:A"];
        assert!(flow.abs() < 1e-4);
        // the load target still holds; the mass strands as waste
        assert!((solution.scenarios[0].feed[&UnitId::new(1)] - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_group_members_activate_together() {
        let mut ss = toy_flowsheet();
        ss.add_unit(
            UnitOperation::new(UnitId::new(10), "OptionA", UnitType::PhysicalProcess)
                .with_group(1),
        )
        .unwrap();
        ss.add_unit(
            UnitOperation::new(UnitId::new(20), "OptionB", UnitType::PhysicalProcess)
                .with_group(1),
        )
        .unwrap();
        ss.connect(UnitId::new(1), 1, UnitId::new(10)).unwrap();
        ss.connect(UnitId::new(1), 1, UnitId::new(20)).unwrap();

        let problem = FlowsheetProblem::new(ss).unwrap();
        let solution = solve_flowsheet(&problem, &SolveConfig::default()).unwrap();
        assert_eq!(
            solution.active_units[&UnitId::new(10)],
            solution.active_units[&UnitId::new(20)]
        );
    }

    #[test]
    fn test_capex_follows_linearized_curve() {
        let mut ss = toy_flowsheet();
        // linear curve quoted in the pricing year: EC(10 t/h) = 1000 EUR
        ss.units[1].capex_curve = Some(CapexCurve {
            reference_capacity: 10.0,
            reference_cost: 1000.0,
            scale_exponent: 1.0,
            reference_year: ss.economics.current_year,
        });
        let problem = FlowsheetProblem::new(ss).unwrap();
        let solution = solve_flowsheet(&problem, &SolveConfig::default()).unwrap();

        let pool = UnitId::new(2);
        assert!((solution.capacities[&pool] - 10.0).abs() < 1e-3);
        assert!((solution.equipment_cost[&pool] - 1000.0).abs() < 1e-2);
        assert!(solution.annualized_capital > 0.0);
    }

    /// Source feeding a decimal distributor with two downstream pools.
    fn distributor_flowsheet() -> Superstructure {
        let mut ss = Superstructure::new(
            "split",
            LoadSpec::Substrate {
                unit: UnitId::new(1),
                tons_per_hour: 10.0,
            },
        );
        ss.components = vec![Component::new("A")];
        let mut feed = UnitOperation::new(UnitId::new(1), "Feed", UnitType::Source);
        feed.set_composition(Component::new("A"), 1.0).unwrap();
        feed.set_split_factor(UnitId::new(3), Component::new("A"), 1.0)
            .unwrap();
        feed.feed_price = Some(40.0);
        feed.feed_upper_bound = Some(100.0);
        ss.add_unit(feed).unwrap();
        ss.add_unit(UnitOperation::new(
            UnitId::new(3),
            "Splitter",
            UnitType::Distributor,
        ))
        .unwrap();
        let mut pool_a = UnitOperation::new(UnitId::new(2), "PoolA", UnitType::ProductPool);
        pool_a.product_price = Some(100.0);
        ss.add_unit(pool_a).unwrap();
        let mut pool_b = UnitOperation::new(UnitId::new(4), "PoolB", UnitType::ProductPool);
        pool_b.product_price = Some(50.0);
        ss.add_unit(pool_b).unwrap();
        ss.connect(UnitId::new(1), 0, UnitId::new(3)).unwrap();
        ss.connect(UnitId::new(3), 0, UnitId::new(2)).unwrap();
        ss.connect(UnitId::new(3), 0, UnitId::new(4)).unwrap();
        ss
    }

    #[test]
    fn test_distributor_single_edge_carries_whole_stream() {
        let mut ss = distributor_flowsheet();
        // drop PoolB so the splitter has exactly one outlet
        ss.connections.get_mut(&UnitId::new(3)).unwrap().clear();
        ss.units.retain(|u| u.id != UnitId::new(4));
        ss.connect(UnitId::new(3), 0, UnitId::new(2)).unwrap();

        let problem = FlowsheetProblem::new(ss).unwrap();
        let solution = solve_flowsheet(&problem, &SolveConfig::default()).unwrap();

        // a fraction of exactly one must be expressible on a lone edge
        assert!((solution.scenarios[0].flows["3->2:A"] - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_distributor_routes_toward_higher_price() {
        let mut ss = distributor_flowsheet();
        ss.objective = Objective::Ebit;
        let problem = FlowsheetProblem::new(ss).unwrap();
        let solution = solve_flowsheet(&problem, &SolveConfig::default()).unwrap();

        assert!((solution.scenarios[0].flows["3->2:A"] - 10.0).abs() < 1e-3);
        assert!(solution.scenarios[0].flows["3->4:A"].abs() < 1e-3);
    }

    #[test]
    fn test_fixed_design_blocks_distributor_target() {
        let mut design = BTreeMap::new();
        design.insert(UnitId::new(1), true);
        design.insert(UnitId::new(2), true);
        design.insert(UnitId::new(3), true);
        design.insert(UnitId::new(4), false);
        let problem = FlowsheetProblem::new(distributor_flowsheet())
            .unwrap()
            .fixed_design(design);
        let solution = solve_flowsheet(&problem, &SolveConfig::default()).unwrap();

        // the splitter may not route into the frozen-out pool
        assert!(solution.scenarios[0].flows["3->4:A"].abs() < 1e-3);
        assert!((solution.scenarios[0].flows["3->2:A"] - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_boolean_distributor_picks_single_edge() {
        let mut ss = distributor_flowsheet();
        ss.objective = Objective::Ebit;
        for unit in &mut ss.units {
            if unit.id == UnitId::new(3) {
                unit.unit_type = UnitType::BooleanDistributor;
            }
        }
        let problem = FlowsheetProblem::new(ss).unwrap();
        let solution = solve_flowsheet(&problem, &SolveConfig::default()).unwrap();

        assert!((solution.scenarios[0].flows["3->2:A"] - 10.0).abs() < 1e-3);
        assert!(solution.scenarios[0].flows["3->4:A"].abs() < 1e-3);
    }

    #[test]
    fn test_stoich_reactor_transforms_components() {
        let mut ss = Superstructure::new(
            "reactor",
            LoadSpec::Substrate {
                unit: UnitId::new(1),
                tons_per_hour: 10.0,
            },
        );
        ss.components = vec![Component::new("A"), Component::new("B")];
        ss.reactions = vec![Reaction::new("r1")];
        let mut feed = UnitOperation::new(UnitId::new(1), "Feed", UnitType::Source);
        feed.set_composition(Component::new("A"), 1.0).unwrap();
        feed.set_split_factor(UnitId::new(3), Component::new("A"), 1.0)
            .unwrap();
        feed.feed_price = Some(40.0);
        feed.feed_upper_bound = Some(100.0);
        ss.add_unit(feed).unwrap();
        let mut reactor = UnitOperation::new(UnitId::new(3), "R1", UnitType::StoichReactor);
        reactor
            .set_stoichiometry(Component::new("A"), Reaction::new("r1"), -1.0)
            .unwrap();
        reactor
            .set_stoichiometry(Component::new("B"), Reaction::new("r1"), 0.8)
            .unwrap();
        reactor
            .set_conversion(Reaction::new("r1"), Component::new("A"), 0.9)
            .unwrap();
        reactor
            .set_split_factor(UnitId::new(2), Component::new("A"), 1.0)
            .unwrap();
        reactor
            .set_split_factor(UnitId::new(2), Component::new("B"), 1.0)
            .unwrap();
        ss.add_unit(reactor).unwrap();
        ss.add_unit(UnitOperation::new(
            UnitId::new(2),
            "Pool",
            UnitType::ProductPool,
        ))
        .unwrap();
        ss.connect(UnitId::new(1), 0, UnitId::new(3)).unwrap();
        ss.connect(UnitId::new(3), 0, UnitId::new(2)).unwrap();

        let problem = FlowsheetProblem::new(ss).unwrap();
        let solution = solve_flowsheet(&problem, &SolveConfig::default()).unwrap();

        // 90% of A converts at 0.8 t B per t A: 1 t/h A and 7.2 t/h B leave
        assert!((solution.scenarios[0].flows["3->2:A"] - 1.0).abs() < 1e-3);
        assert!((solution.scenarios[0].flows["3->2:B"] - 7.2).abs() < 1e-3);
    }

    #[test]
    fn test_heat_cascade_charges_hen_capital() {
        let mut ss = toy_flowsheet();
        ss.temperature_intervals = vec![
            TemperatureInterval {
                id: 1,
                t_upper: 160.0,
                t_lower: 120.0,
            },
            TemperatureInterval {
                id: 2,
                t_upper: 120.0,
                t_lower: 80.0,
            },
        ];
        // the pool demands 0.2 MW per t/h in the hot interval
        for unit in &mut ss.units {
            if unit.id == UnitId::new(2) {
                unit.set_heat_coefficient(1, 0.2).unwrap();
            }
        }
        ss.hen = Some(HenSpec {
            capex_curve: CapexCurve {
                reference_capacity: 2.0,
                reference_cost: 1000.0,
                scale_exponent: 1.0,
                reference_year: ss.economics.current_year,
            },
            max_duty_mw: 4.0,
        });
        let lang = ss.economics.direct_cost_factor + ss.economics.indirect_cost_factor;
        let problem = FlowsheetProblem::new(ss).unwrap();
        let solution = solve_flowsheet(&problem, &SolveConfig::default()).unwrap();

        // 2 MW of hot utility covers the demand, nothing cascades to cooling
        assert!((solution.scenarios[0].hot_utility - 2.0).abs() < 1e-3);
        assert!(solution.scenarios[0].cold_utility.abs() < 1e-3);
        // one bank sized for 2 MW at 500 EUR/MW on the linear curve
        assert!((solution.hen_capital - lang * 1000.0).abs() < 1.0);
    }

    #[test]
    fn test_solver_limits_pass_through() {
        let config = SolveConfig {
            max_time_seconds: 30.0,
            mip_gap: 0.01,
            verbose: false,
        };
        let problem = FlowsheetProblem::new(toy_flowsheet()).unwrap();
        let solution = solve_flowsheet(&problem, &config).unwrap();
        assert!((solution.objective_value - 40.0).abs() < 1e-3);
    }

    #[test]
    fn test_scenario_replication_weights_objective() {
        let base = FlowsheetProblem::new(toy_flowsheet()).unwrap();
        let mut cheap = base.base.clone();
        cheap
            .apply(&ParameterChange::FeedPrice {
                unit: UnitId::new(1),
                value: 20.0,
            })
            .unwrap();
        let mut dear = base.base.clone();
        dear.apply(&ParameterChange::FeedPrice {
            unit: UnitId::new(1),
            value: 60.0,
        })
        .unwrap();

        let mut problem = base;
        problem.scenarios = vec![
            Scenario {
                name: "sc1".into(),
                weight: 0.5,
                params: cheap,
            },
            Scenario {
                name: "sc2".into(),
                weight: 0.5,
                params: dear,
            },
        ];
        let solution = solve_flowsheet(&problem, &SolveConfig::default()).unwrap();

        assert_eq!(solution.scenarios.len(), 2);
        // per-scenario feed bills differ, the objective is their mean
        assert!(solution.scenarios[0].tac < solution.scenarios[1].tac);
        assert!((solution.objective_value - 40.0).abs() < 1e-3);
    }
}
