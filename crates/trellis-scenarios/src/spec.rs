use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use trellis_core::{Component, Reaction, UnitId, Utility};
use trellis_model::params::{
    ConversionIndex, HeatIndex, LcaIndex, ParameterChange, ParameterFamily, PhiIndex, SplitIndex,
    StoichIndex, UtilityIndex, YieldIndex,
};

/// Declarative perturbation specification for a stochastic run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UncertaintySpec {
    pub version: Option<u32>,
    /// Discretization level: 2 (symmetric +/-) or 3 (+/0/-)
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub rows: Vec<PerturbationRow>,
}

fn default_level() -> u32 {
    2
}

/// One perturbable parameter row.
///
/// `parameter` names the family (table label or spelled-out name, see
/// [`ParameterFamily::parse_label`]); the index fields required depend on the
/// family and missing ones surface when the row is turned into a
/// [`ParameterChange`]. Rows sharing a `group` number are correlated and
/// resolved through their `correlation` tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerturbationRow {
    pub parameter: String,
    pub unit: usize,
    pub component: Option<String>,
    pub reaction: Option<String>,
    /// Target unit, for split-factor rows
    pub target: Option<usize>,
    /// Temperature interval, for heat-coefficient rows
    pub interval: Option<usize>,
    /// Utility kind, for utility-demand rows
    pub utility: Option<Utility>,
    /// Impact category, for LCA rows
    pub category: Option<String>,
    pub group: Option<usize>,
    /// `reference`, `equal` or `opposite`; omitted on uncorrelated rows
    pub correlation: Option<String>,
    /// Variation magnitude in percent
    pub percentage: f64,
}

impl PerturbationRow {
    /// Build the change template this row perturbs, with a placeholder value.
    pub fn to_change(&self) -> Result<ParameterChange> {
        let (family, _) = ParameterFamily::parse_label(&self.parameter)
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("resolving parameter '{}'", self.parameter))?;
        let unit = UnitId::new(self.unit);
        let component = || -> Result<Component> {
            self.component
                .as_deref()
                .map(Component::new)
                .ok_or_else(|| self.missing_field("component"))
        };
        let reaction = || -> Result<Reaction> {
            self.reaction
                .as_deref()
                .map(Reaction::new)
                .ok_or_else(|| self.missing_field("reaction"))
        };

        let value = 0.0;
        let change = match family {
            ParameterFamily::SplitFactor => ParameterChange::SplitFactor {
                index: SplitIndex {
                    unit,
                    target: UnitId::new(
                        self.target.ok_or_else(|| self.missing_field("target"))?,
                    ),
                    component: component()?,
                },
                value,
            },
            ParameterFamily::FeedComposition => ParameterChange::FeedComposition {
                index: PhiIndex {
                    unit,
                    component: component()?,
                },
                value,
            },
            ParameterFamily::Stoichiometry => ParameterChange::Stoichiometry {
                index: StoichIndex {
                    unit,
                    component: component()?,
                    reaction: reaction()?,
                },
                value,
            },
            ParameterFamily::Conversion => ParameterChange::Conversion {
                index: ConversionIndex {
                    unit,
                    reaction: reaction()?,
                    component: component()?,
                },
                value,
            },
            ParameterFamily::Yield => ParameterChange::Yield {
                index: YieldIndex {
                    unit,
                    component: component()?,
                },
                value,
            },
            ParameterFamily::FeedPrice => ParameterChange::FeedPrice { unit, value },
            ParameterFamily::ProductPrice => ParameterChange::ProductPrice { unit, value },
            ParameterFamily::UtilityDemand => ParameterChange::UtilityDemand {
                index: UtilityIndex {
                    unit,
                    utility: self.utility.ok_or_else(|| self.missing_field("utility"))?,
                },
                value,
            },
            ParameterFamily::HeatCoefficient => ParameterChange::HeatCoefficient {
                index: HeatIndex {
                    unit,
                    interval: self.interval.ok_or_else(|| self.missing_field("interval"))?,
                },
                value,
            },
            ParameterFamily::EmissionFactor => ParameterChange::EmissionFactor { unit, value },
            ParameterFamily::FreshwaterFactor => {
                ParameterChange::FreshwaterFactor { unit, value }
            }
            ParameterFamily::FullLoadHours => ParameterChange::FullLoadHours { unit, value },
            ParameterFamily::ReferenceCost => ParameterChange::ReferenceCost { unit, value },
            ParameterFamily::LcaFactor => ParameterChange::LcaFactor {
                index: LcaIndex {
                    unit,
                    category: self
                        .category
                        .clone()
                        .ok_or_else(|| self.missing_field("category"))?,
                },
                value,
            },
        };
        Ok(change)
    }

    fn missing_field(&self, field: &str) -> anyhow::Error {
        anyhow!(
            "parameter '{}' on unit {} requires a '{}' field",
            self.parameter,
            self.unit,
            field
        )
    }
}

pub fn load_spec_from_path(path: &Path) -> Result<UncertaintySpec> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading uncertainty spec '{}'", path.display()))?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
            serde_yaml::from_str(&data).context("parsing uncertainty spec yaml")
        }
        Some(ext) if ext.eq_ignore_ascii_case("json") => {
            serde_json::from_str(&data).context("parsing uncertainty spec json")
        }
        _ => serde_yaml::from_str(&data)
            .or_else(|_| serde_json::from_str(&data))
            .context("parsing uncertainty spec"),
    }
}
