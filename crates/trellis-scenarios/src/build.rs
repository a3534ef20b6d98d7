//! Full-factorial scenario matrix construction.
//!
//! Rows are grouped by their correlation group; each independent group
//! contributes one discretization axis, so the scenario count is
//! `level^groups`. Within a multi-row group one row is the reference and the
//! others copy or negate its column.

use anyhow::{anyhow, bail, Result};
use itertools::Itertools;
use trellis_model::params::ParameterChange;

use crate::spec::UncertaintySpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    Reference,
    Equal,
    Opposite,
}

impl Correlation {
    fn parse(tag: Option<&str>) -> Result<Self> {
        match tag {
            None | Some("reference") => Ok(Correlation::Reference),
            Some("equal") => Ok(Correlation::Equal),
            Some("opposite") => Ok(Correlation::Opposite),
            Some(other) => bail!("correlation '{}' is not supported", other),
        }
    }

    fn sign(self) -> f64 {
        match self {
            Correlation::Reference | Correlation::Equal => 1.0,
            Correlation::Opposite => -1.0,
        }
    }
}

/// One ingested perturbation row, resolved against its group.
#[derive(Debug, Clone)]
pub struct ResolvedRow {
    /// Family-scoped row key, `"{family}_{n}"`
    pub key: String,
    /// The change this row perturbs, value field unused
    pub change: ParameterChange,
    pub percentage: f64,
    pub group: usize,
    pub correlation: Correlation,
}

/// The scenario table: names, probabilities and the signed percentage
/// perturbation per scenario and row. Immutable once built.
#[derive(Debug, Clone)]
pub struct StochasticObject {
    pub level: u32,
    pub rows: Vec<ResolvedRow>,
    pub scenario_names: Vec<String>,
    pub probabilities: Vec<f64>,
    /// `matrix[scenario][row]`, percent
    pub matrix: Vec<Vec<f64>>,
}

impl StochasticObject {
    pub fn number_of_scenarios(&self) -> usize {
        self.scenario_names.len()
    }

    pub fn build(spec: &UncertaintySpec) -> Result<Self> {
        if spec.level != 2 && spec.level != 3 {
            bail!("discretization level must be 2 or 3, got {}", spec.level);
        }
        if spec.rows.is_empty() {
            bail!("uncertainty spec contains no perturbation rows");
        }

        // Ingest: family-scoped row keys, explicit groups first, then fresh
        // singleton ids past the largest explicit group number.
        let max_explicit = spec.rows.iter().filter_map(|r| r.group).max().unwrap_or(0);
        let mut next_singleton = max_explicit + 1;
        let mut family_counter: std::collections::BTreeMap<String, usize> = Default::default();
        let mut rows = Vec::with_capacity(spec.rows.len());
        for row in &spec.rows {
            let change = row.to_change()?;
            let family = format!("{:?}", change.family()).to_lowercase();
            let n = family_counter.entry(family.clone()).or_insert(0);
            *n += 1;
            let group = match row.group {
                Some(g) => g,
                None => {
                    let g = next_singleton;
                    next_singleton += 1;
                    g
                }
            };
            rows.push(ResolvedRow {
                key: format!("{}_{}", family, n),
                change,
                percentage: row.percentage,
                group,
                correlation: Correlation::parse(row.correlation.as_deref())?,
            });
        }

        // Group order is declaration order (first appearance).
        let mut group_order: Vec<usize> = Vec::new();
        for row in &rows {
            if !group_order.contains(&row.group) {
                group_order.push(row.group);
            }
        }
        for group in &group_order {
            let members: Vec<&ResolvedRow> = rows.iter().filter(|r| r.group == *group).collect();
            let references = members
                .iter()
                .filter(|r| r.correlation == Correlation::Reference)
                .count();
            if references != 1 {
                return Err(anyhow!(
                    "correlation group {} must contain exactly one reference row, found {}",
                    group,
                    references
                ));
            }
        }

        let states: Vec<f64> = match spec.level {
            2 => vec![1.0, -1.0],
            _ => vec![1.0, 0.0, -1.0],
        };

        // Cartesian product over groups, first-declared group varying slowest.
        let mut matrix = Vec::new();
        for assignment in group_order
            .iter()
            .map(|_| states.iter().copied())
            .multi_cartesian_product()
        {
            let mut scenario_row = Vec::with_capacity(rows.len());
            for row in &rows {
                let axis = group_order
                    .iter()
                    .position(|g| *g == row.group)
                    .ok_or_else(|| anyhow!("row '{}' lost its group", row.key))?;
                scenario_row.push(assignment[axis] * row.correlation.sign() * row.percentage);
            }
            matrix.push(scenario_row);
        }

        let count = matrix.len();
        let scenario_names = (1..=count).map(|i| format!("sc{}", i)).collect();
        let probabilities = vec![1.0 / count as f64; count];
        Ok(Self {
            level: spec.level,
            rows,
            scenario_names,
            probabilities,
            matrix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::PerturbationRow;

    fn row(parameter: &str, unit: usize, group: Option<usize>, tag: Option<&str>) -> PerturbationRow {
        PerturbationRow {
            parameter: parameter.into(),
            unit,
            component: None,
            reaction: None,
            target: None,
            interval: None,
            utility: None,
            category: None,
            group,
            correlation: tag.map(String::from),
            percentage: 10.0,
        }
    }

    fn spec(level: u32, rows: Vec<PerturbationRow>) -> UncertaintySpec {
        UncertaintySpec {
            version: None,
            level,
            rows,
        }
    }

    #[test]
    fn test_level_two_single_group() {
        let built =
            StochasticObject::build(&spec(2, vec![row("materialcosts", 1, None, None)])).unwrap();
        assert_eq!(built.number_of_scenarios(), 2);
        assert_eq!(built.scenario_names, vec!["sc1", "sc2"]);
        assert_eq!(built.matrix, vec![vec![10.0], vec![-10.0]]);
        assert!((built.probabilities[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_scenario_count_is_level_pow_groups() {
        let built = StochasticObject::build(&spec(
            3,
            vec![
                row("materialcosts", 1, None, None),
                row("FLH", 2, None, None),
            ],
        ))
        .unwrap();
        assert_eq!(built.number_of_scenarios(), 9);
        // first group varies slowest
        assert_eq!(built.matrix[0], vec![10.0, 10.0]);
        assert_eq!(built.matrix[1], vec![10.0, 0.0]);
        assert_eq!(built.matrix[3], vec![0.0, 10.0]);
    }

    #[test]
    fn test_opposite_row_negates_reference() {
        let built = StochasticObject::build(&spec(
            2,
            vec![
                row("materialcosts", 1, Some(1), Some("reference")),
                row("materialcosts", 2, Some(1), Some("opposite")),
                row("materialcosts", 3, Some(1), Some("equal")),
            ],
        ))
        .unwrap();
        assert_eq!(built.number_of_scenarios(), 2);
        for scenario in &built.matrix {
            assert!((scenario[1] + scenario[0]).abs() < 1e-12);
            assert!((scenario[2] - scenario[0]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_row_keys_are_family_scoped() {
        let built = StochasticObject::build(&spec(
            2,
            vec![
                row("materialcosts", 1, None, None),
                row("materialcosts", 2, None, None),
                row("FLH", 2, None, None),
            ],
        ))
        .unwrap();
        let keys: Vec<&str> = built.rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["feedprice_1", "feedprice_2", "fullloadhours_1"]);
    }

    #[test]
    fn test_two_references_in_group_is_fatal() {
        let err = StochasticObject::build(&spec(
            2,
            vec![
                row("materialcosts", 1, Some(1), Some("reference")),
                row("materialcosts", 2, Some(1), Some("reference")),
            ],
        ))
        .unwrap_err();
        assert!(err.to_string().contains("exactly one reference"));
    }

    #[test]
    fn test_unknown_correlation_tag_is_fatal() {
        let err = StochasticObject::build(&spec(
            2,
            vec![
                row("materialcosts", 1, Some(1), Some("reference")),
                row("materialcosts", 2, Some(1), Some("inverse")),
            ],
        ))
        .unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn test_bad_level_is_fatal() {
        let err = StochasticObject::build(&spec(4, vec![row("materialcosts", 1, None, None)]))
            .unwrap_err();
        assert!(err.to_string().contains("level"));
    }

    #[test]
    fn test_singleton_groups_continue_past_explicit() {
        let built = StochasticObject::build(&spec(
            2,
            vec![
                row("materialcosts", 1, Some(3), None),
                row("FLH", 2, None, None),
            ],
        ))
        .unwrap();
        assert_eq!(built.rows[0].group, 3);
        assert_eq!(built.rows[1].group, 4);
        assert_eq!(built.number_of_scenarios(), 4);
    }
}
