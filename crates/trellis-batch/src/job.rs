use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use trellis_model::params::ParameterStore;
use trellis_model::problem::Scenario;
use trellis_scenarios::{load_spec_from_path, materialize, StochasticObject};

/// Batch run categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunKind {
    /// Stochastic recourse: one solve with replicated scenarios
    Recourse,
    /// Deterministic design frozen and re-evaluated across scenarios
    ExpectedValue,
    /// Per-scenario individual solves with full knowledge
    WaitAndSee,
    /// One parameter swept over a value list
    Sensitivity,
    /// The same instance re-solved under several objectives
    MultiObjective,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Recourse => "recourse",
            RunKind::ExpectedValue => "expected-value",
            RunKind::WaitAndSee => "wait-and-see",
            RunKind::Sensitivity => "sensitivity",
            RunKind::MultiObjective => "multi-objective",
        }
    }
}

/// Outcome record of one solve within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub scenario: Option<String>,
    pub status: String,
    pub error: Option<String>,
    pub objective: Option<f64>,
    pub expected_tac: Option<f64>,
}

impl RunRecord {
    pub fn ok(run_id: String, scenario: Option<String>, objective: f64, tac: f64) -> Self {
        Self {
            run_id,
            scenario,
            status: "ok".to_string(),
            error: None,
            objective: Some(objective),
            expected_tac: Some(tac),
        }
    }

    pub fn failed(run_id: String, scenario: Option<String>, error: String) -> Self {
        Self {
            run_id,
            scenario,
            status: "error".to_string(),
            error: Some(error),
            objective: None,
            expected_tac: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Load an uncertainty spec and materialize its scenario set over a base
/// parameter store, ready for [`run_stochastic`](crate::run_stochastic).
pub fn scenarios_from_spec(path: &Path, base: &ParameterStore) -> Result<Vec<Scenario>> {
    let spec = load_spec_from_path(path)?;
    let stochastic = StochasticObject::build(&spec)?;
    materialize(&stochastic, base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_kind_labels() {
        assert_eq!(RunKind::WaitAndSee.as_str(), "wait-and-see");
        assert_eq!(RunKind::Sensitivity.as_str(), "sensitivity");
    }

    #[test]
    fn test_record_constructors() {
        let ok = RunRecord::ok("rp".into(), None, 40.0, 3.2e6);
        assert!(ok.is_ok());
        let failed = RunRecord::failed("ws:sc1".into(), Some("sc1".into()), "infeasible".into());
        assert!(!failed.is_ok());
        assert!(failed.objective.is_none());
    }

    #[test]
    fn test_scenarios_from_spec() {
        use std::io::Write;
        use trellis_core::{Component, LoadSpec, Superstructure, UnitId, UnitOperation, UnitType};

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
        feed.feed_price = Some(40.0);
        ss.add_unit(feed).unwrap();
        let base = ParameterStore::from_superstructure(&ss);

        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(
            b"level: 2\nrows:\n  - parameter: materialcosts\n    unit: 1\n    percentage: 25.0\n",
        )
        .unwrap();
        let scenarios = scenarios_from_spec(file.path(), &base).unwrap();
        assert_eq!(scenarios.len(), 2);
        assert!((scenarios[0].params.feed_price(UnitId::new(1)).unwrap() - 50.0).abs() < 1e-9);
        assert!((scenarios[1].params.feed_price(UnitId::new(1)).unwrap() - 30.0).abs() < 1e-9);
    }
}
