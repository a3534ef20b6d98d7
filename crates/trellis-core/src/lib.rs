//! # trellis-core: Superstructure Modeling Core
//!
//! Fundamental data structures for techno-economic flowsheet synthesis.
//!
//! ## Design Philosophy
//!
//! A candidate flowsheet is modeled as a **superstructure**: the graph of
//! every technologically plausible unit operation and inter-unit flow, from
//! which an optimizer later selects an optimal subgraph. Units are entities
//! with typed, per-family parameter dictionaries; the superstructure is the
//! container that owns units, the connection map, grouping metadata, and the
//! run-level settings (objective, load target, heat integration, economics).
//!
//! This entity model is read-only input to the downstream set builder and
//! model assembler. It is mutated only through its own setters while the
//! flowsheet is authored; after an optimization instance is created, scenario
//! mutation happens on the instance's parameter store, never here.
//!
//! ## Quick Start
//!
//! ```rust
//! use trellis_core::*;
//!
//! let mut ss = Superstructure::new(
//!     "demo",
//!     LoadSpec::Substrate { unit: UnitId::new(1), tons_per_hour: 10.0 },
//! );
//! ss.components = vec![Component::new("A")];
//!
//! let mut feed = UnitOperation::new(UnitId::new(1), "Feed", UnitType::Source);
//! feed.set_composition(Component::new("A"), 1.0).unwrap();
//! feed.feed_price = Some(40.0);
//! ss.add_unit(feed).unwrap();
//!
//! let mut pool = UnitOperation::new(UnitId::new(2), "Product", UnitType::ProductPool);
//! pool.product_price = Some(120.0);
//! ss.add_unit(pool).unwrap();
//!
//! ss.connect(UnitId::new(1), 0, UnitId::new(2)).unwrap();
//! assert!(ss.validate().is_ok());
//! ```
//!
//! ## Modules
//!
//! - [`diagnostics`] - Validation issue collection
//! - [`error`] - Unified error type
//! - [`superstructure`] - The container and run-level settings

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod diagnostics;
pub mod error;
pub mod superstructure;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{TrellisError, TrellisResult};
pub use superstructure::{
    EconomicSettings, HeatPumpSpec, HenSpec, LoadSpec, Objective, Superstructure,
    TemperatureInterval,
};

/// Struct-keyed maps serialize as entry lists; JSON map keys must be strings.
mod map_entries {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<K, V, S>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize,
        V: Serialize,
        S: Serializer,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        K: Deserialize<'de> + Ord,
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let entries = Vec::<(K, V)>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

/// Unique identifier for a unit operation.
///
/// The numeric id is the sole index key into every parameter dictionary, so
/// the same unit can be merged into the global parameter table unambiguously.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UnitId(usize);

impl UnitId {
    #[inline]
    pub fn new(value: usize) -> Self {
        UnitId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unit {}", self.0)
    }
}

/// A chemical component (species) name.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Component(String);

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Component(name.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named reaction within a stoichiometric reactor.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Reaction(String);

impl Reaction {
    pub fn new(name: impl Into<String>) -> Self {
        Reaction(name.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Reaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category of a unit operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    /// Raw-material source feeding the flowsheet
    Source,
    /// Product pool / sink collecting finished product
    ProductPool,
    /// Physical processing step (separation, drying, ...)
    PhysicalProcess,
    /// Reactor described by stoichiometry and conversion factors
    StoichReactor,
    /// Reactor described by component yield factors
    YieldReactor,
    /// Fractional stream splitter with optimizable split ratios
    Distributor,
    /// All-or-nothing stream switch
    BooleanDistributor,
    /// Electricity generator (steam turbine)
    Turbine,
    /// Heat generator (furnace/boiler)
    Furnace,
    /// Combined heat and power generator
    Chp,
}

impl UnitType {
    pub fn is_source(&self) -> bool {
        matches!(self, UnitType::Source)
    }
    pub fn is_product_pool(&self) -> bool {
        matches!(self, UnitType::ProductPool)
    }
    pub fn is_reactor(&self) -> bool {
        matches!(self, UnitType::StoichReactor | UnitType::YieldReactor)
    }
    pub fn is_distributor(&self) -> bool {
        matches!(self, UnitType::Distributor | UnitType::BooleanDistributor)
    }
    pub fn is_generator(&self) -> bool {
        matches!(self, UnitType::Turbine | UnitType::Furnace | UnitType::Chp)
    }
}

/// Which aggregate a side of a concentration-ratio constraint refers to.
///
/// Free-text tokens map as `"FIN"` -> inlet, `"FOUT"` -> outlet, anything
/// else -> not applicable. When either side resolves to not-applicable the
/// constraint is skipped for that unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcMode {
    Inlet,
    Outlet,
    NotApplicable,
}

impl ConcMode {
    /// Map a free-text mode token to a calculation mode.
    pub fn from_token(token: &str) -> Self {
        match token {
            "FIN" => ConcMode::Inlet,
            "FOUT" => ConcMode::Outlet,
            _ => ConcMode::NotApplicable,
        }
    }

    /// Integer calculation mode used by the reference data tables.
    pub fn calculation_mode(&self) -> u8 {
        match self {
            ConcMode::Inlet => 1,
            ConcMode::Outlet => 0,
            ConcMode::NotApplicable => 3,
        }
    }
}

/// One side of a concentration-ratio constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcentrationSide {
    pub mode: ConcMode,
    /// Components aggregated on this side
    pub components: Vec<Component>,
}

/// Required concentration ratio between two component aggregates of a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcentrationSpec {
    /// Required numerator/denominator ratio
    pub ratio: f64,
    pub numerator: ConcentrationSide,
    pub denominator: ConcentrationSide,
}

impl ConcentrationSpec {
    /// Whether the constraint applies at all for this unit.
    pub fn applies(&self) -> bool {
        self.numerator.mode != ConcMode::NotApplicable
            && self.denominator.mode != ConcMode::NotApplicable
    }
}

/// Waste-disposal route for the unbalanced outlet remainder of a unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WasteTreatment {
    Incineration,
    Landfill,
    WastewaterTreatment,
}

/// Utility classes a unit can demand per tonne of reference flow.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Utility {
    Electricity,
    Chilling,
}

/// Nonlinear capital-cost curve `C = C_ref * (x / x_ref)^m` with a cost-index
/// base year. Linearized into ordered breakpoints before model assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapexCurve {
    /// Reference capacity (t/h) the reference cost was quoted for
    pub reference_capacity: f64,
    /// Reference equipment cost (EUR) at the reference capacity
    pub reference_cost: f64,
    /// Economy-of-scale exponent, typically 0.6..0.8
    pub scale_exponent: f64,
    /// Year the reference cost was quoted in (for cost-index escalation)
    pub reference_year: u32,
}

/// Conversion efficiencies for turbine / furnace / CHP units.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GeneratorSpec {
    /// Fraction of inlet chemical energy converted to electricity
    pub efficiency_el: f64,
    /// Fraction of inlet chemical energy converted to usable heat
    pub efficiency_th: f64,
}

/// Split-factor index: share of a component's outlet routed to a target unit.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SplitKey {
    pub target: UnitId,
    pub component: Component,
}

/// Stoichiometric-coefficient index. Nests component before reaction; the
/// conversion-factor family nests the other way round, and the two stay
/// distinct types so they can never be transposed silently.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct StoichKey {
    pub component: Component,
    pub reaction: Reaction,
}

/// Conversion-factor index: the key (limiting) component of a reaction.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ConversionKey {
    pub reaction: Reaction,
    pub component: Component,
}

/// A unit operation in the superstructure.
///
/// Parameter dictionaries are private and written through shape-validating
/// setters; downstream code reads them through the accessor methods. Keys
/// must be drawn from sets the set builder derives from the same
/// superstructure, otherwise model construction fails with a configuration
/// error rather than a silent zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitOperation {
    pub name: String,
    pub id: UnitId,
    pub unit_type: UnitType,
    /// Units sharing a group are forced to equal activation
    pub group: Option<usize>,
    /// Raw-material sources permitted to feed this unit
    pub possible_sources: Vec<UnitId>,
    #[serde(with = "map_entries")]
    split_factors: BTreeMap<SplitKey, f64>,
    pub concentration: Option<ConcentrationSpec>,
    /// Annual operating hours of this unit
    pub full_load_hours: f64,
    pub waste_treatment: Option<WasteTreatment>,
    #[serde(with = "map_entries")]
    stoichiometry: BTreeMap<StoichKey, f64>,
    #[serde(with = "map_entries")]
    conversions: BTreeMap<ConversionKey, f64>,
    yields: BTreeMap<Component, f64>,
    /// Components declared inert for a yield reactor
    pub inert_components: Vec<Component>,
    /// When set, inert mass bypasses the reacting pool and leaves unchanged
    pub inert_carryover: bool,
    composition: BTreeMap<Component, f64>,
    /// Purchase price for source feed (EUR/t)
    pub feed_price: Option<f64>,
    /// Feed availability bounds (t/h)
    pub feed_upper_bound: Option<f64>,
    pub feed_lower_bound: Option<f64>,
    /// Sales price at a product pool (EUR/t)
    pub product_price: Option<f64>,
    utility_demands: BTreeMap<Utility, f64>,
    heat_coefficients: BTreeMap<usize, f64>,
    pub capex_curve: Option<CapexCurve>,
    pub generator: Option<GeneratorSpec>,
    /// Direct emissions per tonne of reference flow (t CO2e/t)
    pub emission_factor: Option<f64>,
    /// Freshwater demand per tonne of reference flow (m3/t)
    pub freshwater_factor: Option<f64>,
    lca_factors: BTreeMap<String, f64>,
    /// Per-unit big-M bound overriding the global default
    pub big_m_override: Option<f64>,
}

impl UnitOperation {
    pub fn new(id: UnitId, name: impl Into<String>, unit_type: UnitType) -> Self {
        Self {
            name: name.into(),
            id,
            unit_type,
            group: None,
            possible_sources: Vec::new(),
            split_factors: BTreeMap::new(),
            concentration: None,
            full_load_hours: 8000.0,
            waste_treatment: None,
            stoichiometry: BTreeMap::new(),
            conversions: BTreeMap::new(),
            yields: BTreeMap::new(),
            inert_components: Vec::new(),
            inert_carryover: false,
            composition: BTreeMap::new(),
            feed_price: None,
            feed_upper_bound: None,
            feed_lower_bound: None,
            product_price: None,
            utility_demands: BTreeMap::new(),
            heat_coefficients: BTreeMap::new(),
            capex_curve: None,
            generator: None,
            emission_factor: None,
            freshwater_factor: None,
            lca_factors: BTreeMap::new(),
            big_m_override: None,
        }
    }

    pub fn with_group(mut self, group: usize) -> Self {
        self.group = Some(group);
        self
    }

    pub fn with_possible_sources(mut self, sources: Vec<UnitId>) -> Self {
        self.possible_sources = sources;
        self
    }

    pub fn with_capex_curve(mut self, curve: CapexCurve) -> Self {
        self.capex_curve = Some(curve);
        self
    }

    /// Share of `component`'s outlet routed to `target`. Values outside
    /// `[0, 1]` or non-finite are rejected.
    pub fn set_split_factor(
        &mut self,
        target: UnitId,
        component: Component,
        value: f64,
    ) -> TrellisResult<()> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(TrellisError::Validation(format!(
                "split factor {}->{} for '{}' must be in [0, 1], got {}",
                self.id, target, component, value
            )));
        }
        self.split_factors
            .insert(SplitKey { target, component }, value);
        Ok(())
    }

    /// Mass fraction of `component` in this source's feed.
    pub fn set_composition(&mut self, component: Component, fraction: f64) -> TrellisResult<()> {
        if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
            return Err(TrellisError::Validation(format!(
                "composition of '{}' at {} must be in [0, 1], got {}",
                component, self.id, fraction
            )));
        }
        self.composition.insert(component, fraction);
        Ok(())
    }

    /// Signed stoichiometric coefficient of `component` in `reaction`
    /// (negative for consumed species).
    pub fn set_stoichiometry(
        &mut self,
        component: Component,
        reaction: Reaction,
        coefficient: f64,
    ) -> TrellisResult<()> {
        if !coefficient.is_finite() {
            return Err(TrellisError::Validation(format!(
                "stoichiometric coefficient of '{}' in '{}' at {} is not finite",
                component, reaction, self.id
            )));
        }
        self.stoichiometry
            .insert(StoichKey { component, reaction }, coefficient);
        Ok(())
    }

    /// Conversion of `reaction` expressed on its key component.
    pub fn set_conversion(
        &mut self,
        reaction: Reaction,
        component: Component,
        factor: f64,
    ) -> TrellisResult<()> {
        if !factor.is_finite() || !(0.0..=1.0).contains(&factor) {
            return Err(TrellisError::Validation(format!(
                "conversion of '{}' on '{}' at {} must be in [0, 1], got {}",
                reaction, component, self.id, factor
            )));
        }
        self.conversions
            .insert(ConversionKey { reaction, component }, factor);
        Ok(())
    }

    /// Yield of `component` per tonne of reacting inlet pool.
    pub fn set_yield(&mut self, component: Component, factor: f64) -> TrellisResult<()> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(TrellisError::Validation(format!(
                "yield factor of '{}' at {} must be non-negative, got {}",
                component, self.id, factor
            )));
        }
        self.yields.insert(component, factor);
        Ok(())
    }

    /// Utility demand per tonne of reference flow (MWh/t).
    pub fn set_utility_demand(&mut self, utility: Utility, demand: f64) -> TrellisResult<()> {
        if !demand.is_finite() || demand < 0.0 {
            return Err(TrellisError::Validation(format!(
                "utility demand at {} must be non-negative, got {}",
                self.id, demand
            )));
        }
        self.utility_demands.insert(utility, demand);
        Ok(())
    }

    /// Signed heat coefficient in a temperature interval (MWh/t; positive
    /// demands heat from the cascade, negative supplies surplus to it).
    pub fn set_heat_coefficient(&mut self, interval: usize, coefficient: f64) -> TrellisResult<()> {
        if !coefficient.is_finite() {
            return Err(TrellisError::Validation(format!(
                "heat coefficient at {} interval {} is not finite",
                self.id, interval
            )));
        }
        self.heat_coefficients.insert(interval, coefficient);
        Ok(())
    }

    /// LCA characterization factor per tonne of source feed.
    pub fn set_lca_factor(&mut self, category: impl Into<String>, factor: f64) -> TrellisResult<()> {
        if !factor.is_finite() {
            return Err(TrellisError::Validation(format!(
                "LCA factor at {} is not finite",
                self.id
            )));
        }
        self.lca_factors.insert(category.into(), factor);
        Ok(())
    }

    pub fn split_factors(&self) -> &BTreeMap<SplitKey, f64> {
        &self.split_factors
    }
    pub fn composition(&self) -> &BTreeMap<Component, f64> {
        &self.composition
    }
    pub fn stoichiometry(&self) -> &BTreeMap<StoichKey, f64> {
        &self.stoichiometry
    }
    pub fn conversions(&self) -> &BTreeMap<ConversionKey, f64> {
        &self.conversions
    }
    pub fn yields(&self) -> &BTreeMap<Component, f64> {
        &self.yields
    }
    pub fn utility_demands(&self) -> &BTreeMap<Utility, f64> {
        &self.utility_demands
    }
    pub fn heat_coefficients(&self) -> &BTreeMap<usize, f64> {
        &self.heat_coefficients
    }
    pub fn lca_factors(&self) -> &BTreeMap<String, f64> {
        &self.lca_factors
    }

    /// Units this unit's split factors route mass to.
    pub fn split_targets(&self) -> Vec<UnitId> {
        let mut targets: Vec<UnitId> = self.split_factors.keys().map(|k| k.target).collect();
        targets.dedup();
        targets
    }
}
