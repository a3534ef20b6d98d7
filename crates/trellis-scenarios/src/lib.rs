//! # trellis-scenarios: Stochastic Data Preprocessing
//!
//! Turns a declarative uncertainty specification (YAML or JSON) into a
//! full-factorial scenario set over a base parameter store:
//!
//! 1. [`load_spec_from_path`] reads the perturbation rows.
//! 2. [`StochasticObject::build`] resolves correlation groups and enumerates
//!    the `level^groups` scenario matrix with names `sc1..scN`.
//! 3. [`materialize`] clones the base [`ParameterStore`](trellis_model::params::ParameterStore)
//!    per scenario and applies the scaled perturbations through the
//!    parameter mutator.

pub mod apply;
pub mod build;
pub mod spec;

pub use apply::materialize;
pub use build::{Correlation, ResolvedRow, StochasticObject};
pub use spec::{load_spec_from_path, PerturbationRow, UncertaintySpec};
