//! The mutable parameter surface of an optimization instance.
//!
//! [`ParameterStore`] holds every numeric parameter the assembler reads, in
//! typed per-family tables keyed by named-field index structs. It is built
//! once from the superstructure and from then on is the only thing scenario
//! and sensitivity machinery may mutate; the entity model itself stays
//! frozen after instance creation.
//!
//! Mutation goes through [`ParameterChange`], a closed set of variants. Each
//! variant carries the exact index shape its family uses, so a transposed
//! index is a type error instead of a silent zero. An index that is not
//! present in the store is a fatal mutation error naming the offending tuple
//! verbatim; a change is always a direct overwrite, never an increment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use trellis_core::{
    Component, Reaction, Superstructure, TrellisError, TrellisResult, UnitId, Utility,
};

/// Index of a split factor: share of `component` leaving `unit` toward
/// `target`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SplitIndex {
    pub unit: UnitId,
    pub target: UnitId,
    pub component: Component,
}

impl std::fmt::Display for SplitIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, '{}')", self.unit, self.target, self.component)
    }
}

/// Index of a feed composition fraction at a source unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PhiIndex {
    pub unit: UnitId,
    pub component: Component,
}

impl std::fmt::Display for PhiIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, '{}')", self.unit, self.component)
    }
}

/// Index of a stoichiometric coefficient. Component comes before reaction;
/// [`ConversionIndex`] nests the other way round and stays a distinct type
/// so the two can never be transposed silently.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoichIndex {
    pub unit: UnitId,
    pub component: Component,
    pub reaction: Reaction,
}

impl std::fmt::Display for StoichIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, ('{}', '{}'))",
            self.unit, self.component, self.reaction
        )
    }
}

/// Index of a conversion factor: a reaction and its key component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversionIndex {
    pub unit: UnitId,
    pub reaction: Reaction,
    pub component: Component,
}

impl std::fmt::Display for ConversionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, ('{}', '{}'))",
            self.unit, self.reaction, self.component
        )
    }
}

/// Index of a yield factor at a yield reactor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct YieldIndex {
    pub unit: UnitId,
    pub component: Component,
}

impl std::fmt::Display for YieldIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, '{}')", self.unit, self.component)
    }
}

/// Index of a utility demand coefficient.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtilityIndex {
    pub unit: UnitId,
    pub utility: Utility,
}

impl std::fmt::Display for UtilityIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {:?})", self.unit, self.utility)
    }
}

/// Index of a signed heat-cascade coefficient.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HeatIndex {
    pub unit: UnitId,
    pub interval: usize,
}

impl std::fmt::Display for HeatIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, interval {})", self.unit, self.interval)
    }
}

/// Index of an LCA characterization factor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LcaIndex {
    pub unit: UnitId,
    pub category: String,
}

impl std::fmt::Display for LcaIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, '{}')", self.unit, self.category)
    }
}

/// The supported parameter families.
///
/// Sensitivity and uncertainty tables name parameters as free text with an
/// optional trailing numeric disambiguator (`"myu3"` is the third row on the
/// split-factor family); [`ParameterFamily::parse_label`] resolves both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterFamily {
    SplitFactor,
    FeedComposition,
    Stoichiometry,
    Conversion,
    Yield,
    FeedPrice,
    ProductPrice,
    UtilityDemand,
    HeatCoefficient,
    EmissionFactor,
    FreshwaterFactor,
    FullLoadHours,
    ReferenceCost,
    LcaFactor,
}

impl ParameterFamily {
    /// Resolve a display label into `(family, disambiguator)`.
    ///
    /// A trailing run of ASCII digits is the row disambiguator, not part of
    /// the family name. Both the table-style short labels and the spelled-out
    /// names are accepted. Unknown labels are fatal and name the offender.
    pub fn parse_label(label: &str) -> TrellisResult<(Self, Option<u32>)> {
        let trimmed = label.trim();
        let split_at = trimmed
            .rfind(|c: char| !c.is_ascii_digit())
            .map(|i| i + 1)
            .unwrap_or(0);
        let (base, suffix) = trimmed.split_at(split_at);
        let disambiguator = if suffix.is_empty() {
            None
        } else {
            suffix.parse::<u32>().ok()
        };

        let family = match base {
            "myu" | "split_factor" => ParameterFamily::SplitFactor,
            "phi" | "composition" => ParameterFamily::FeedComposition,
            "gamma" | "stoichiometry" => ParameterFamily::Stoichiometry,
            "theta" | "conversion" => ParameterFamily::Conversion,
            "xi" | "yield" => ParameterFamily::Yield,
            "materialcosts" | "feed_price" => ParameterFamily::FeedPrice,
            "ProductPrice" | "product_price" => ParameterFamily::ProductPrice,
            "tau" | "utility_demand" => ParameterFamily::UtilityDemand,
            "beta" | "heat_coefficient" => ParameterFamily::HeatCoefficient,
            "em_fac" | "emission_factor" => ParameterFamily::EmissionFactor,
            "fw_dem" | "freshwater_factor" => ParameterFamily::FreshwaterFactor,
            "FLH" | "full_load_hours" => ParameterFamily::FullLoadHours,
            "C_Ref" | "reference_cost" => ParameterFamily::ReferenceCost,
            "lca" | "lca_factor" => ParameterFamily::LcaFactor,
            other => {
                return Err(TrellisError::Mutation(format!(
                    "unknown parameter '{}'",
                    other
                )))
            }
        };
        Ok((family, disambiguator))
    }
}

/// One declarative parameter overwrite, the only mutation surface of an
/// optimization instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ParameterChange {
    SplitFactor { index: SplitIndex, value: f64 },
    FeedComposition { index: PhiIndex, value: f64 },
    Stoichiometry { index: StoichIndex, value: f64 },
    Conversion { index: ConversionIndex, value: f64 },
    Yield { index: YieldIndex, value: f64 },
    FeedPrice { unit: UnitId, value: f64 },
    ProductPrice { unit: UnitId, value: f64 },
    UtilityDemand { index: UtilityIndex, value: f64 },
    HeatCoefficient { index: HeatIndex, value: f64 },
    EmissionFactor { unit: UnitId, value: f64 },
    FreshwaterFactor { unit: UnitId, value: f64 },
    FullLoadHours { unit: UnitId, value: f64 },
    ReferenceCost { unit: UnitId, value: f64 },
    LcaFactor { index: LcaIndex, value: f64 },
}

impl ParameterChange {
    pub fn family(&self) -> ParameterFamily {
        match self {
            ParameterChange::SplitFactor { .. } => ParameterFamily::SplitFactor,
            ParameterChange::FeedComposition { .. } => ParameterFamily::FeedComposition,
            ParameterChange::Stoichiometry { .. } => ParameterFamily::Stoichiometry,
            ParameterChange::Conversion { .. } => ParameterFamily::Conversion,
            ParameterChange::Yield { .. } => ParameterFamily::Yield,
            ParameterChange::FeedPrice { .. } => ParameterFamily::FeedPrice,
            ParameterChange::ProductPrice { .. } => ParameterFamily::ProductPrice,
            ParameterChange::UtilityDemand { .. } => ParameterFamily::UtilityDemand,
            ParameterChange::HeatCoefficient { .. } => ParameterFamily::HeatCoefficient,
            ParameterChange::EmissionFactor { .. } => ParameterFamily::EmissionFactor,
            ParameterChange::FreshwaterFactor { .. } => ParameterFamily::FreshwaterFactor,
            ParameterChange::FullLoadHours { .. } => ParameterFamily::FullLoadHours,
            ParameterChange::ReferenceCost { .. } => ParameterFamily::ReferenceCost,
            ParameterChange::LcaFactor { .. } => ParameterFamily::LcaFactor,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            ParameterChange::SplitFactor { value, .. }
            | ParameterChange::FeedComposition { value, .. }
            | ParameterChange::Stoichiometry { value, .. }
            | ParameterChange::Conversion { value, .. }
            | ParameterChange::Yield { value, .. }
            | ParameterChange::FeedPrice { value, .. }
            | ParameterChange::ProductPrice { value, .. }
            | ParameterChange::UtilityDemand { value, .. }
            | ParameterChange::HeatCoefficient { value, .. }
            | ParameterChange::EmissionFactor { value, .. }
            | ParameterChange::FreshwaterFactor { value, .. }
            | ParameterChange::FullLoadHours { value, .. }
            | ParameterChange::ReferenceCost { value, .. }
            | ParameterChange::LcaFactor { value, .. } => *value,
        }
    }

    /// The same change with a different value (used by sweep machinery).
    pub fn with_value(&self, value: f64) -> Self {
        let mut change = self.clone();
        match &mut change {
            ParameterChange::SplitFactor { value: v, .. }
            | ParameterChange::FeedComposition { value: v, .. }
            | ParameterChange::Stoichiometry { value: v, .. }
            | ParameterChange::Conversion { value: v, .. }
            | ParameterChange::Yield { value: v, .. }
            | ParameterChange::FeedPrice { value: v, .. }
            | ParameterChange::ProductPrice { value: v, .. }
            | ParameterChange::UtilityDemand { value: v, .. }
            | ParameterChange::HeatCoefficient { value: v, .. }
            | ParameterChange::EmissionFactor { value: v, .. }
            | ParameterChange::FreshwaterFactor { value: v, .. }
            | ParameterChange::FullLoadHours { value: v, .. }
            | ParameterChange::ReferenceCost { value: v, .. }
            | ParameterChange::LcaFactor { value: v, .. } => *v = value,
        }
        change
    }

    fn index_display(&self) -> String {
        match self {
            ParameterChange::SplitFactor { index, .. } => index.to_string(),
            ParameterChange::FeedComposition { index, .. } => index.to_string(),
            ParameterChange::Stoichiometry { index, .. } => index.to_string(),
            ParameterChange::Conversion { index, .. } => index.to_string(),
            ParameterChange::Yield { index, .. } => index.to_string(),
            ParameterChange::UtilityDemand { index, .. } => index.to_string(),
            ParameterChange::HeatCoefficient { index, .. } => index.to_string(),
            ParameterChange::LcaFactor { index, .. } => index.to_string(),
            ParameterChange::FeedPrice { unit, .. }
            | ParameterChange::ProductPrice { unit, .. }
            | ParameterChange::EmissionFactor { unit, .. }
            | ParameterChange::FreshwaterFactor { unit, .. }
            | ParameterChange::FullLoadHours { unit, .. }
            | ParameterChange::ReferenceCost { unit, .. } => format!("({})", unit),
        }
    }
}

fn missing(family: ParameterFamily, index: String) -> TrellisError {
    TrellisError::Mutation(format!(
        "index {} is not declared for parameter family {:?}",
        index, family
    ))
}

/// Typed per-family parameter tables; the mutable surface of one instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterStore {
    split: BTreeMap<SplitIndex, f64>,
    composition: BTreeMap<PhiIndex, f64>,
    stoichiometry: BTreeMap<StoichIndex, f64>,
    conversion: BTreeMap<ConversionIndex, f64>,
    yields: BTreeMap<YieldIndex, f64>,
    feed_price: BTreeMap<UnitId, f64>,
    product_price: BTreeMap<UnitId, f64>,
    full_load_hours: BTreeMap<UnitId, f64>,
    utility_demand: BTreeMap<UtilityIndex, f64>,
    heat_coefficient: BTreeMap<HeatIndex, f64>,
    emission_factor: BTreeMap<UnitId, f64>,
    freshwater_factor: BTreeMap<UnitId, f64>,
    reference_cost: BTreeMap<UnitId, f64>,
    lca: BTreeMap<LcaIndex, f64>,
}

impl ParameterStore {
    /// Merge every unit's parameter dictionaries into one global table set.
    pub fn from_superstructure(ss: &Superstructure) -> Self {
        let mut store = ParameterStore::default();
        for unit in &ss.units {
            let u = unit.id;
            for (key, value) in unit.split_factors() {
                store.split.insert(
                    SplitIndex {
                        unit: u,
                        target: key.target,
                        component: key.component.clone(),
                    },
                    *value,
                );
            }
            for (component, value) in unit.composition() {
                store.composition.insert(
                    PhiIndex {
                        unit: u,
                        component: component.clone(),
                    },
                    *value,
                );
            }
            for (key, value) in unit.stoichiometry() {
                store.stoichiometry.insert(
                    StoichIndex {
                        unit: u,
                        component: key.component.clone(),
                        reaction: key.reaction.clone(),
                    },
                    *value,
                );
            }
            for (key, value) in unit.conversions() {
                store.conversion.insert(
                    ConversionIndex {
                        unit: u,
                        reaction: key.reaction.clone(),
                        component: key.component.clone(),
                    },
                    *value,
                );
            }
            for (component, value) in unit.yields() {
                store.yields.insert(
                    YieldIndex {
                        unit: u,
                        component: component.clone(),
                    },
                    *value,
                );
            }
            for (utility, value) in unit.utility_demands() {
                store.utility_demand.insert(
                    UtilityIndex {
                        unit: u,
                        utility: *utility,
                    },
                    *value,
                );
            }
            for (interval, value) in unit.heat_coefficients() {
                store.heat_coefficient.insert(
                    HeatIndex {
                        unit: u,
                        interval: *interval,
                    },
                    *value,
                );
            }
            for (category, value) in unit.lca_factors() {
                store.lca.insert(
                    LcaIndex {
                        unit: u,
                        category: category.clone(),
                    },
                    *value,
                );
            }
            store.full_load_hours.insert(u, unit.full_load_hours);
            if let Some(price) = unit.feed_price {
                store.feed_price.insert(u, price);
            }
            if let Some(price) = unit.product_price {
                store.product_price.insert(u, price);
            }
            if let Some(factor) = unit.emission_factor {
                store.emission_factor.insert(u, factor);
            }
            if let Some(factor) = unit.freshwater_factor {
                store.freshwater_factor.insert(u, factor);
            }
            if let Some(curve) = &unit.capex_curve {
                store.reference_cost.insert(u, curve.reference_cost);
            }
        }
        store
    }

    /// Read the value a change would overwrite; errors exactly as the write
    /// would on a missing index.
    pub fn base_value(&self, change: &ParameterChange) -> TrellisResult<f64> {
        let family = change.family();
        let lookup = match change {
            ParameterChange::SplitFactor { index, .. } => self.split.get(index).copied(),
            ParameterChange::FeedComposition { index, .. } => self.composition.get(index).copied(),
            ParameterChange::Stoichiometry { index, .. } => self.stoichiometry.get(index).copied(),
            ParameterChange::Conversion { index, .. } => self.conversion.get(index).copied(),
            ParameterChange::Yield { index, .. } => self.yields.get(index).copied(),
            ParameterChange::FeedPrice { unit, .. } => self.feed_price.get(unit).copied(),
            ParameterChange::ProductPrice { unit, .. } => self.product_price.get(unit).copied(),
            ParameterChange::UtilityDemand { index, .. } => self.utility_demand.get(index).copied(),
            ParameterChange::HeatCoefficient { index, .. } => {
                self.heat_coefficient.get(index).copied()
            }
            ParameterChange::EmissionFactor { unit, .. } => self.emission_factor.get(unit).copied(),
            ParameterChange::FreshwaterFactor { unit, .. } => {
                self.freshwater_factor.get(unit).copied()
            }
            ParameterChange::FullLoadHours { unit, .. } => self.full_load_hours.get(unit).copied(),
            ParameterChange::ReferenceCost { unit, .. } => self.reference_cost.get(unit).copied(),
            ParameterChange::LcaFactor { index, .. } => self.lca.get(index).copied(),
        };
        lookup.ok_or_else(|| missing(family, change.index_display()))
    }

    /// Apply one overwrite. The index must already exist; a change never
    /// creates a new table entry.
    ///
    /// Feed composition carries the closure side effect: the delta on the
    /// changed component is subtracted evenly from the other currently
    /// nonzero components of the same source so the total stays 1. At least
    /// one other nonzero component must exist; otherwise the change is a
    /// mutation error, never a division by zero.
    pub fn apply(&mut self, change: &ParameterChange) -> TrellisResult<()> {
        if let ParameterChange::FeedComposition { index, value } = change {
            return self.apply_composition(index, *value);
        }
        let family = change.family();
        let display = change.index_display();
        let slot = match change {
            ParameterChange::SplitFactor { index, .. } => self.split.get_mut(index),
            ParameterChange::FeedComposition { .. } => unreachable!(),
            ParameterChange::Stoichiometry { index, .. } => self.stoichiometry.get_mut(index),
            ParameterChange::Conversion { index, .. } => self.conversion.get_mut(index),
            ParameterChange::Yield { index, .. } => self.yields.get_mut(index),
            ParameterChange::FeedPrice { unit, .. } => self.feed_price.get_mut(unit),
            ParameterChange::ProductPrice { unit, .. } => self.product_price.get_mut(unit),
            ParameterChange::UtilityDemand { index, .. } => self.utility_demand.get_mut(index),
            ParameterChange::HeatCoefficient { index, .. } => self.heat_coefficient.get_mut(index),
            ParameterChange::EmissionFactor { unit, .. } => self.emission_factor.get_mut(unit),
            ParameterChange::FreshwaterFactor { unit, .. } => self.freshwater_factor.get_mut(unit),
            ParameterChange::FullLoadHours { unit, .. } => self.full_load_hours.get_mut(unit),
            ParameterChange::ReferenceCost { unit, .. } => self.reference_cost.get_mut(unit),
            ParameterChange::LcaFactor { index, .. } => self.lca.get_mut(index),
        };
        let slot = slot.ok_or_else(|| missing(family, display))?;
        *slot = change.value();
        Ok(())
    }

    fn apply_composition(&mut self, index: &PhiIndex, value: f64) -> TrellisResult<()> {
        let old = self
            .composition
            .get(index)
            .copied()
            .ok_or_else(|| missing(ParameterFamily::FeedComposition, index.to_string()))?;
        let others: Vec<PhiIndex> = self
            .composition
            .iter()
            .filter(|(k, v)| k.unit == index.unit && k.component != index.component && **v > 0.0)
            .map(|(k, _)| k.clone())
            .collect();
        if others.is_empty() {
            return Err(TrellisError::Mutation(format!(
                "cannot redistribute composition delta at {}: no other nonzero component at {}",
                index, index.unit
            )));
        }
        let delta = value - old;
        let share = delta / others.len() as f64;
        for key in &others {
            if let Some(v) = self.composition.get_mut(key) {
                *v -= share;
            }
        }
        if let Some(v) = self.composition.get_mut(index) {
            *v = value;
        }
        Ok(())
    }

    pub fn split_factor(&self, index: &SplitIndex) -> Option<f64> {
        self.split.get(index).copied()
    }
    pub fn composition(&self, index: &PhiIndex) -> Option<f64> {
        self.composition.get(index).copied()
    }
    pub fn compositions_of(&self, unit: UnitId) -> impl Iterator<Item = (&PhiIndex, f64)> {
        self.composition
            .iter()
            .filter(move |(k, _)| k.unit == unit)
            .map(|(k, v)| (k, *v))
    }
    pub fn stoichiometry(&self, index: &StoichIndex) -> Option<f64> {
        self.stoichiometry.get(index).copied()
    }
    pub fn conversions_of(&self, unit: UnitId) -> impl Iterator<Item = (&ConversionIndex, f64)> {
        self.conversion
            .iter()
            .filter(move |(k, _)| k.unit == unit)
            .map(|(k, v)| (k, *v))
    }
    pub fn yield_factor(&self, index: &YieldIndex) -> Option<f64> {
        self.yields.get(index).copied()
    }
    pub fn yields_of(&self, unit: UnitId) -> impl Iterator<Item = (&YieldIndex, f64)> {
        self.yields
            .iter()
            .filter(move |(k, _)| k.unit == unit)
            .map(|(k, v)| (k, *v))
    }
    pub fn feed_price(&self, unit: UnitId) -> Option<f64> {
        self.feed_price.get(&unit).copied()
    }
    pub fn product_price(&self, unit: UnitId) -> Option<f64> {
        self.product_price.get(&unit).copied()
    }
    pub fn full_load_hours(&self, unit: UnitId) -> Option<f64> {
        self.full_load_hours.get(&unit).copied()
    }
    pub fn utility_demand(&self, index: &UtilityIndex) -> Option<f64> {
        self.utility_demand.get(index).copied()
    }
    pub fn heat_coefficient(&self, index: &HeatIndex) -> Option<f64> {
        self.heat_coefficient.get(index).copied()
    }
    pub fn heat_coefficients_of(&self, unit: UnitId) -> impl Iterator<Item = (&HeatIndex, f64)> {
        self.heat_coefficient
            .iter()
            .filter(move |(k, _)| k.unit == unit)
            .map(|(k, v)| (k, *v))
    }
    pub fn emission_factor(&self, unit: UnitId) -> Option<f64> {
        self.emission_factor.get(&unit).copied()
    }
    pub fn freshwater_factor(&self, unit: UnitId) -> Option<f64> {
        self.freshwater_factor.get(&unit).copied()
    }
    pub fn reference_cost(&self, unit: UnitId) -> Option<f64> {
        self.reference_cost.get(&unit).copied()
    }
    pub fn lca_factor(&self, index: &LcaIndex) -> Option<f64> {
        self.lca.get(index).copied()
    }
}
