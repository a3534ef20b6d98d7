//! The superstructure container and run-level settings.
//!
//! The superstructure owns every candidate unit operation, the permitted
//! connection map between them, grouping metadata, and the settings one
//! optimization run needs (objective, load target, heat integration bounds,
//! economics). It is built once per run by whichever front end authors it
//! and consumed read-only by the set builder and the model assembler.

use crate::diagnostics::Diagnostics;
use crate::error::{TrellisError, TrellisResult};
use crate::{CapexCurve, Component, Reaction, UnitId, UnitOperation, UnitType, WasteTreatment};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Objective the assembled model optimizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "category", rename_all = "snake_case")]
pub enum Objective {
    /// Net production cost per tonne (minimize)
    Npc,
    /// Net production emissions per tonne (minimize)
    Npe,
    /// Freshwater demand per tonne (minimize)
    Fwd,
    /// Earnings before interest and taxes (maximize)
    Ebit,
    /// A named LCA impact category per tonne (minimize)
    Impact(String),
}

impl Objective {
    pub fn is_maximization(&self) -> bool {
        matches!(self, Objective::Ebit)
    }
}

/// What drives the throughput of the flowsheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadSpec {
    /// Fix the feed rate of one source unit
    Substrate { unit: UnitId, tons_per_hour: f64 },
    /// Fix the collected rate at a product pool, referenced by name
    Product { pool: String, tons_per_hour: f64 },
}

impl LoadSpec {
    pub fn tons_per_hour(&self) -> f64 {
        match self {
            LoadSpec::Substrate { tons_per_hour, .. } => *tons_per_hour,
            LoadSpec::Product { tons_per_hour, .. } => *tons_per_hour,
        }
    }
}

/// Optional heat pump moving cascade heat from a cold interval to a hot one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatPumpSpec {
    /// Coefficient of performance (delivered heat over electricity)
    pub cop: f64,
    /// Interval index the pump extracts surplus from
    pub source_interval: usize,
    /// Interval index the pump injects into (must be hotter)
    pub sink_interval: usize,
    /// Capital cost per MW of sink duty (EUR/MW)
    pub capex_per_mw: f64,
}

/// Heat-exchanger-network cost settings.
///
/// Each temperature interval gets an exchanger bank sized for the duty
/// crossing it; the bank's capital follows `capex_curve` with capacity
/// measured in MW instead of t/h.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HenSpec {
    /// Cost curve over exchanged duty per interval
    pub capex_curve: CapexCurve,
    /// Largest duty (MW) a single interval's bank can be sized for
    pub max_duty_mw: f64,
}

/// One interval of the shifted heat cascade, ordered hot to cold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperatureInterval {
    pub id: usize,
    /// Upper shifted temperature bound (deg C)
    pub t_upper: f64,
    /// Lower shifted temperature bound (deg C)
    pub t_lower: f64,
}

/// Run-level economic and environmental reference data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomicSettings {
    /// Discount rate for investment annualization
    pub interest_rate: f64,
    /// Plant lifetime in years
    pub lifetime_years: usize,
    /// Cost-index table (year -> index value) for CAPEX escalation
    pub cost_index: BTreeMap<u32, f64>,
    /// Year the optimization is priced in (must be in `cost_index`)
    pub current_year: u32,
    /// Electricity purchase price (EUR/MWh)
    pub electricity_price: f64,
    /// Electricity feed-in price (EUR/MWh)
    pub electricity_sell_price: f64,
    /// Hot utility price (EUR/MWh)
    pub heating_price: f64,
    /// Cold utility price (EUR/MWh)
    pub cooling_price: f64,
    /// Hours per year utilities are billed over
    pub annual_hours: f64,
    /// Fixed O&M as a fraction of fixed capital investment
    pub om_factor: f64,
    /// Direct installation cost factor on equipment cost
    pub direct_cost_factor: f64,
    /// Indirect cost factor on equipment cost
    pub indirect_cost_factor: f64,
    /// Disposal price per tonne by treatment route
    pub waste_costs: BTreeMap<WasteTreatment, f64>,
    /// Grid emission factor (t CO2e/MWh electricity)
    pub electricity_emission_factor: f64,
    /// Hot utility emission factor (t CO2e/MWh)
    pub heat_emission_factor: f64,
    /// Grid freshwater factor (m3/MWh electricity)
    pub electricity_fw_factor: f64,
    /// LCA characterization of grid electricity (category -> per MWh)
    pub electricity_lca: BTreeMap<String, f64>,
    /// LCA characterization of hot utility (category -> per MWh)
    pub heat_lca: BTreeMap<String, f64>,
}

impl Default for EconomicSettings {
    fn default() -> Self {
        let mut cost_index = BTreeMap::new();
        // CEPCI annual values; extend as new years are priced
        for (year, value) in [
            (2010, 550.8),
            (2014, 576.1),
            (2016, 541.7),
            (2018, 603.1),
            (2020, 596.2),
            (2022, 816.0),
        ] {
            cost_index.insert(year, value);
        }
        Self {
            interest_rate: 0.05,
            lifetime_years: 20,
            cost_index,
            current_year: 2022,
            electricity_price: 80.0,
            electricity_sell_price: 50.0,
            heating_price: 35.0,
            cooling_price: 10.0,
            annual_hours: 8000.0,
            om_factor: 0.04,
            direct_cost_factor: 2.2,
            indirect_cost_factor: 0.7,
            waste_costs: BTreeMap::new(),
            electricity_emission_factor: 0.3,
            heat_emission_factor: 0.2,
            electricity_fw_factor: 2.0,
            electricity_lca: BTreeMap::new(),
            heat_lca: BTreeMap::new(),
        }
    }
}

impl EconomicSettings {
    /// Capital Recovery Factor: `r(1+r)^n / ((1+r)^n - 1)`.
    pub fn capital_recovery_factor(&self) -> f64 {
        let r = self.interest_rate;
        let n = self.lifetime_years as f64;
        if r < 1e-10 {
            1.0 / n
        } else {
            r * (1.0 + r).powf(n) / ((1.0 + r).powf(n) - 1.0)
        }
    }

    /// Cost-index escalation factor from `year` to the current pricing year.
    ///
    /// Missing reference data is a configuration error, never a silent 1.0.
    pub fn escalation_factor(&self, year: u32) -> TrellisResult<f64> {
        let base = self.cost_index.get(&year).ok_or_else(|| {
            TrellisError::Config(format!("no cost index entry for reference year {}", year))
        })?;
        let now = self.cost_index.get(&self.current_year).ok_or_else(|| {
            TrellisError::Config(format!(
                "no cost index entry for current year {}",
                self.current_year
            ))
        })?;
        Ok(now / base)
    }
}

/// The full graph of candidate unit operations and permitted flows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Superstructure {
    pub name: String,
    /// Units in discovery order (order is used for deterministic output only)
    pub units: Vec<UnitOperation>,
    pub components: Vec<Component>,
    pub reactions: Vec<Reaction>,
    /// `unit -> stream index -> permitted downstream units`
    pub connections: BTreeMap<UnitId, BTreeMap<usize, Vec<UnitId>>>,
    pub objective: Objective,
    pub load: LoadSpec,
    pub heat_pump: Option<HeatPumpSpec>,
    /// Heat-exchanger-network costing, applied per temperature interval
    pub hen: Option<HenSpec>,
    /// Shifted temperature intervals ordered hot to cold
    pub temperature_intervals: Vec<TemperatureInterval>,
    /// LCA impact categories evaluated beyond GWP
    pub impact_categories: Vec<String>,
    /// Lower heating value per component (MWh/t), for generator units
    pub lhv: BTreeMap<Component, f64>,
    pub economics: EconomicSettings,
}

impl Superstructure {
    pub fn new(name: impl Into<String>, load: LoadSpec) -> Self {
        Self {
            name: name.into(),
            units: Vec::new(),
            components: Vec::new(),
            reactions: Vec::new(),
            connections: BTreeMap::new(),
            objective: Objective::Npc,
            load,
            heat_pump: None,
            hen: None,
            temperature_intervals: Vec::new(),
            impact_categories: Vec::new(),
            lhv: BTreeMap::new(),
            economics: EconomicSettings::default(),
        }
    }

    /// Register a unit. Ids and names must be unique.
    pub fn add_unit(&mut self, unit: UnitOperation) -> TrellisResult<()> {
        if self.units.iter().any(|u| u.id == unit.id) {
            return Err(TrellisError::Validation(format!(
                "duplicate unit id {}",
                unit.id
            )));
        }
        if self.units.iter().any(|u| u.name == unit.name) {
            return Err(TrellisError::Validation(format!(
                "duplicate unit name '{}'",
                unit.name
            )));
        }
        self.units.push(unit);
        Ok(())
    }

    /// Declare a permitted flow from `from` (on stream `stream`) to `to`.
    pub fn connect(&mut self, from: UnitId, stream: usize, to: UnitId) -> TrellisResult<()> {
        if !self.has_unit(from) {
            return Err(TrellisError::Validation(format!(
                "connection source {} is not a declared unit",
                from
            )));
        }
        if !self.has_unit(to) {
            return Err(TrellisError::Validation(format!(
                "connection target {} is not a declared unit",
                to
            )));
        }
        let targets = self
            .connections
            .entry(from)
            .or_default()
            .entry(stream)
            .or_default();
        if !targets.contains(&to) {
            targets.push(to);
        }
        Ok(())
    }

    pub fn has_unit(&self, id: UnitId) -> bool {
        self.units.iter().any(|u| u.id == id)
    }

    pub fn unit(&self, id: UnitId) -> Option<&UnitOperation> {
        self.units.iter().find(|u| u.id == id)
    }

    pub fn unit_by_name(&self, name: &str) -> Option<&UnitOperation> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn units_of_type(&self, unit_type: UnitType) -> Vec<&UnitOperation> {
        self.units
            .iter()
            .filter(|u| u.unit_type == unit_type)
            .collect()
    }

    pub fn source_units(&self) -> Vec<&UnitOperation> {
        self.units_of_type(UnitType::Source)
    }

    pub fn product_pools(&self) -> Vec<&UnitOperation> {
        self.units_of_type(UnitType::ProductPool)
    }

    pub fn distributor_units(&self) -> Vec<&UnitOperation> {
        self.units
            .iter()
            .filter(|u| u.unit_type.is_distributor())
            .collect()
    }

    /// Mutual-activation groups: `group id -> member unit ids`.
    pub fn groups(&self) -> BTreeMap<usize, Vec<UnitId>> {
        let mut groups: BTreeMap<usize, Vec<UnitId>> = BTreeMap::new();
        for unit in &self.units {
            if let Some(g) = unit.group {
                groups.entry(g).or_default().push(unit.id);
            }
        }
        groups
    }

    /// All declared `(from, to)` pairs, flattened over stream indices.
    pub fn connection_pairs(&self) -> Vec<(UnitId, UnitId)> {
        let mut pairs = Vec::new();
        for (from, streams) in &self.connections {
            for targets in streams.values() {
                for to in targets {
                    if !pairs.contains(&(*from, *to)) {
                        pairs.push((*from, *to));
                    }
                }
            }
        }
        pairs
    }

    /// Directed topology view over declared connections.
    pub fn flow_graph(&self) -> (DiGraph<UnitId, ()>, BTreeMap<UnitId, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut index = BTreeMap::new();
        for unit in &self.units {
            let idx = graph.add_node(unit.id);
            index.insert(unit.id, idx);
        }
        for (from, to) in self.connection_pairs() {
            graph.add_edge(index[&from], index[&to], ());
        }
        (graph, index)
    }

    /// Validate entity data, collecting issues into `diag`.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        if self.units.is_empty() {
            diag.add_error("structure", "superstructure has no units");
            return;
        }
        if self.source_units().is_empty() {
            diag.add_error("structure", "superstructure has no source units");
        }
        if self.product_pools().is_empty() {
            diag.add_error("structure", "superstructure has no product pools");
        }

        for unit in &self.units {
            for key in unit.split_factors().keys() {
                if !self.has_unit(key.target) {
                    diag.add_error_with_entity(
                        "reference",
                        &format!("split factor targets undeclared {}", key.target),
                        &unit.name,
                    );
                }
                if !self.components.contains(&key.component) {
                    diag.add_error_with_entity(
                        "reference",
                        &format!("split factor uses undeclared component '{}'", key.component),
                        &unit.name,
                    );
                }
            }
            for source in &unit.possible_sources {
                if !self.has_unit(*source) {
                    diag.add_error_with_entity(
                        "reference",
                        &format!("possible source {} is not a declared unit", source),
                        &unit.name,
                    );
                }
            }
            for key in unit.stoichiometry().keys() {
                if !self.reactions.contains(&key.reaction) {
                    diag.add_error_with_entity(
                        "reference",
                        &format!("stoichiometry uses undeclared reaction '{}'", key.reaction),
                        &unit.name,
                    );
                }
            }
            for interval in unit.heat_coefficients().keys() {
                if !self.temperature_intervals.iter().any(|t| t.id == *interval) {
                    diag.add_error_with_entity(
                        "reference",
                        &format!("heat coefficient uses undeclared interval {}", interval),
                        &unit.name,
                    );
                }
            }
            if unit.unit_type.is_source() {
                let total: f64 = unit.composition().values().sum();
                if unit.composition().is_empty() {
                    diag.add_error_with_entity(
                        "parameter",
                        "source has no feed composition",
                        &unit.name,
                    );
                } else if (total - 1.0).abs() > 1e-6 {
                    diag.add_warning_with_entity(
                        "parameter",
                        &format!("feed composition sums to {:.6}, expected 1", total),
                        &unit.name,
                    );
                }
            }
            if unit.unit_type.is_generator() && unit.generator.is_none() {
                diag.add_error_with_entity(
                    "parameter",
                    "generator unit has no efficiency data",
                    &unit.name,
                );
            }
        }

        for (from, streams) in &self.connections {
            if !self.has_unit(*from) {
                diag.add_error(
                    "reference",
                    &format!("connection source {} is not a declared unit", from),
                );
            }
            for targets in streams.values() {
                for to in targets {
                    if !self.has_unit(*to) {
                        diag.add_error(
                            "reference",
                            &format!("connection target {} is not a declared unit", to),
                        );
                    }
                }
            }
        }

        if let LoadSpec::Product { pool, .. } = &self.load {
            match self.unit_by_name(pool) {
                Some(u) if u.unit_type.is_product_pool() => {}
                Some(_) => diag.add_error(
                    "reference",
                    &format!("load target '{}' is not a product pool", pool),
                ),
                None => diag.add_error(
                    "reference",
                    &format!("load target '{}' is not a declared unit", pool),
                ),
            }
        }

        if let Objective::Impact(category) = &self.objective {
            if !self.impact_categories.contains(category) {
                diag.add_error(
                    "reference",
                    &format!("objective impact category '{}' is not declared", category),
                );
            }
        }

        if let Some(hp) = &self.heat_pump {
            let known = |id: usize| self.temperature_intervals.iter().any(|t| t.id == id);
            if !known(hp.source_interval) || !known(hp.sink_interval) {
                diag.add_error(
                    "reference",
                    "heat pump references an undeclared temperature interval",
                );
            }
            if hp.cop <= 1.0 {
                diag.add_error("parameter", "heat pump COP must exceed 1");
            }
        }

        if let Some(hen) = &self.hen {
            if self.temperature_intervals.is_empty() {
                diag.add_error(
                    "reference",
                    "HEN costing declared without temperature intervals",
                );
            }
            if !(hen.max_duty_mw > 0.0) {
                diag.add_error("parameter", "HEN maximum duty must be positive");
            }
        }

        self.check_reachability(diag);
    }

    /// Units with no path from any source are dead weight in the model.
    fn check_reachability(&self, diag: &mut Diagnostics) {
        let (graph, index) = self.flow_graph();
        let mut reached = vec![false; graph.node_count()];
        for source in self.source_units() {
            let mut bfs = Bfs::new(&graph, index[&source.id]);
            while let Some(node) = bfs.next(&graph) {
                reached[node.index()] = true;
            }
        }
        for unit in &self.units {
            if unit.unit_type.is_source() {
                continue;
            }
            if !reached[index[&unit.id].index()] {
                diag.add_warning_with_entity(
                    "topology",
                    "unit is unreachable from every source",
                    &unit.name,
                );
            }
        }
    }

    /// Hard validation gate; any error-severity issue is fatal.
    pub fn validate(&self) -> TrellisResult<()> {
        let mut diag = Diagnostics::new();
        self.validate_into(&mut diag);
        if diag.has_errors() {
            let joined: Vec<String> = diag.errors().map(|e| e.to_string()).collect();
            return Err(TrellisError::Validation(joined.join("; ")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UnitType;

    fn two_unit_structure() -> Superstructure {
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
    fn test_valid_structure_passes() {
        let ss = two_unit_structure();
        assert!(ss.validate().is_ok());
    }

    #[test]
    fn test_duplicate_unit_id_rejected() {
        let mut ss = two_unit_structure();
        let dup = UnitOperation::new(UnitId::new(1), "Other", UnitType::PhysicalProcess);
        assert!(ss.add_unit(dup).is_err());
    }

    #[test]
    fn test_connection_to_undeclared_unit_rejected() {
        let mut ss = two_unit_structure();
        assert!(ss.connect(UnitId::new(1), 0, UnitId::new(99)).is_err());
    }

    #[test]
    fn test_split_factor_to_undeclared_unit_is_fatal() {
        let mut ss = two_unit_structure();
        let mut wash = UnitOperation::new(UnitId::new(3), "Wash", UnitType::PhysicalProcess);
        wash.set_split_factor(UnitId::new(99), Component::new("A"), 0.5)
            .unwrap();
        ss.add_unit(wash).unwrap();
        ss.connect(UnitId::new(1), 1, UnitId::new(3)).unwrap();
        let err = ss.validate().unwrap_err();
        assert!(err.to_string().contains("unit 99"));
    }

    #[test]
    fn test_product_load_must_name_existing_pool() {
        let mut ss = two_unit_structure();
        ss.load = LoadSpec::Product {
            pool: "Nonexistent".into(),
            tons_per_hour: 5.0,
        };
        assert!(ss.validate().is_err());

        ss.load = LoadSpec::Product {
            pool: "Pool".into(),
            tons_per_hour: 5.0,
        };
        assert!(ss.validate().is_ok());
    }

    #[test]
    fn test_impact_objective_must_be_declared() {
        let mut ss = two_unit_structure();
        ss.objective = Objective::Impact("acidification".into());
        assert!(ss.validate().is_err());
        ss.impact_categories.push("acidification".into());
        assert!(ss.validate().is_ok());
    }

    #[test]
    fn test_unreachable_unit_warns() {
        let mut ss = two_unit_structure();
        ss.add_unit(UnitOperation::new(
            UnitId::new(5),
            "Orphan",
            UnitType::PhysicalProcess,
        ))
        .unwrap();
        let mut diag = Diagnostics::new();
        ss.validate_into(&mut diag);
        assert!(!diag.has_errors());
        assert!(diag.warnings().any(|w| w.message.contains("unreachable")));
    }

    #[test]
    fn test_groups_collects_members() {
        let mut ss = two_unit_structure();
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
        let groups = ss.groups();
        assert_eq!(groups[&1], vec![UnitId::new(10), UnitId::new(20)]);
    }

    #[test]
    fn test_hen_requires_temperature_intervals() {
        let mut ss = two_unit_structure();
        ss.hen = Some(HenSpec {
            capex_curve: CapexCurve {
                reference_capacity: 1.0,
                reference_cost: 50_000.0,
                scale_exponent: 0.7,
                reference_year: ss.economics.current_year,
            },
            max_duty_mw: 10.0,
        });
        let err = ss.validate().unwrap_err();
        assert!(err.to_string().contains("temperature intervals"));

        ss.temperature_intervals.push(TemperatureInterval {
            id: 1,
            t_upper: 120.0,
            t_lower: 80.0,
        });
        assert!(ss.validate().is_ok());
    }

    #[test]
    fn test_crf_matches_reference_value() {
        let mut econ = EconomicSettings::default();
        econ.interest_rate = 0.10;
        econ.lifetime_years = 10;
        // CRF for 10% over 10 years is about 0.1627
        assert!((econ.capital_recovery_factor() - 0.1627).abs() < 0.01);
    }

    #[test]
    fn test_escalation_requires_reference_year() {
        let econ = EconomicSettings::default();
        assert!(econ.escalation_factor(2018).is_ok());
        let err = econ.escalation_factor(1971).unwrap_err();
        assert!(err.to_string().contains("1971"));
    }

    #[test]
    fn test_flow_graph_edges() {
        let ss = two_unit_structure();
        let (graph, _) = ss.flow_graph();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
    }
}
