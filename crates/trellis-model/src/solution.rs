//! The named-variable surface of a solved instance, for reporting and for
//! downstream stochastic aggregation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use trellis_core::{Objective, UnitId};

/// Per-scenario slice of the solved surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub name: String,
    pub weight: f64,
    /// Total annualized cost (EUR/a)
    pub tac: f64,
    pub ebit: f64,
    /// Specific cost (EUR/t of load)
    pub npc: f64,
    /// Specific emissions (t CO2e/t)
    pub npe: f64,
    /// Specific freshwater demand (m3/t)
    pub npfwd: f64,
    /// Annual totals per declared impact category
    pub impacts: BTreeMap<String, f64>,
    /// Component flows keyed `"from->to:component"` (t/h)
    pub flows: BTreeMap<String, f64>,
    /// Raw-material intake per source (t/h)
    pub feed: BTreeMap<UnitId, f64>,
    pub revenue: f64,
    pub raw_material_cost: f64,
    pub utility_cost: f64,
    pub waste_cost: f64,
    /// Hot/cold utility duties (MW)
    pub hot_utility: f64,
    pub cold_utility: f64,
    /// Grid electricity traded (MW)
    pub electricity_purchased: f64,
    pub electricity_sold: f64,
}

/// A solved flowsheet optimization instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowsheetSolution {
    pub objective: Objective,
    pub objective_value: f64,
    pub status: String,
    pub solve_time_seconds: f64,
    /// Annual load used for specific objectives (t/a)
    pub annual_load: f64,
    /// Activation decision per unit
    pub active_units: BTreeMap<UnitId, bool>,
    /// Installed capacity per costed unit (t/h)
    pub capacities: BTreeMap<UnitId, f64>,
    /// Equipment cost per costed unit (EUR)
    pub equipment_cost: BTreeMap<UnitId, f64>,
    /// Fixed capital investment per costed unit (EUR)
    pub fixed_capital: BTreeMap<UnitId, f64>,
    /// Heat-exchanger-network capital over all intervals (EUR)
    pub hen_capital: f64,
    /// Annualized capital charge (EUR/a)
    pub annualized_capital: f64,
    /// Fixed O&M charge (EUR/a)
    pub om_cost: f64,
    pub scenarios: Vec<ScenarioOutcome>,
}

impl FlowsheetSolution {
    /// Probability-weighted total annualized cost.
    pub fn expected_tac(&self) -> f64 {
        self.scenarios.iter().map(|s| s.weight * s.tac).sum()
    }

    pub fn expected_ebit(&self) -> f64 {
        self.scenarios.iter().map(|s| s.weight * s.ebit).sum()
    }

    /// The activation pattern, for freezing a design into a re-solve.
    pub fn design_map(&self) -> BTreeMap<UnitId, bool> {
        self.active_units.clone()
    }

    /// Units selected into the flowsheet.
    pub fn selected_units(&self) -> Vec<UnitId> {
        self.active_units
            .iter()
            .filter(|(_, active)| **active)
            .map(|(unit, _)| *unit)
            .collect()
    }

    /// Human-readable solution summary.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str("=== Flowsheet Synthesis Solution ===\n");
        out.push_str(&format!("Status: {}\n", self.status));
        out.push_str(&format!(
            "Objective ({:?}): {:.4}\n",
            self.objective, self.objective_value
        ));
        out.push_str(&format!("Solve time: {:.2}s\n", self.solve_time_seconds));
        out.push_str(&format!(
            "Selected units: {}\n",
            self.selected_units()
                .iter()
                .map(|u| u.value().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ));
        out.push_str(&format!(
            "Annualized capital: {:.0} EUR/a\n",
            self.annualized_capital
        ));
        out.push_str(&format!("Expected TAC: {:.0} EUR/a\n", self.expected_tac()));
        if self.scenarios.len() > 1 {
            out.push_str(&format!("Scenarios: {}\n", self.scenarios.len()));
            for sc in &self.scenarios {
                out.push_str(&format!(
                    "  {} (w={:.3}): TAC {:.0}, EBIT {:.0}\n",
                    sc.name, sc.weight, sc.tac, sc.ebit
                ));
            }
        }
        out
    }
}
