//! # trellis-batch: Stochastic and Sensitivity Run Orchestration
//!
//! Drives repeated flowsheet solves over cloned problem instances:
//!
//! - [`run_stochastic`] - recourse (RP), expected-value design re-evaluation
//!   (EEV) and per-scenario wait-and-see (WS) solves, with the VSS and EVPI
//!   gap metrics.
//! - [`run_sensitivity`] - one parameter swept over a value list.
//! - [`run_multi_objective`] - the same instance under several objectives.
//!
//! Scenario evaluation is parallel over a Rayon pool; every worker owns its
//! own problem clone because parameter mutation is destructive.

pub mod job;
pub mod manifest;
pub mod runner;

pub use job::{scenarios_from_spec, RunKind, RunRecord};
pub use manifest::{load_run_manifest, write_run_manifest, RunManifest};
pub use runner::{
    run_multi_objective, run_sensitivity, run_stochastic, BatchConfig, StochasticReport,
};
