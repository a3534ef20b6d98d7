//! # trellis-model: MILP Synthesis of Process Superstructures
//!
//! This crate turns a validated [`Superstructure`](trellis_core::Superstructure)
//! into a mixed-integer linear program and solves it with HiGHS through
//! `good_lp`.
//!
//! ## Pipeline
//!
//! | Stage | Entry point | What it produces |
//! |-------|-------------|------------------|
//! | Parameter extraction | [`ParameterStore::from_superstructure`] | Mutable numeric tables keyed by typed indices |
//! | Set construction | [`build_sets`] | Connection pairs, component reachability, cascade intervals |
//! | Instance definition | [`FlowsheetProblem`] | Superstructure + base parameters + scenarios + options |
//! | Assembly | [`assemble::assemble`] | Variables, constraints and the objective expression |
//! | Solve | [`solve_flowsheet`] | A [`FlowsheetSolution`] with the named-variable surface |
//!
//! ## Formulation
//!
//! Unit activation is a shared first-stage binary per unit; big-M
//! constraints couple component flows to it. Distributor units route
//! through a decimal (or boolean) expansion of their outlet fractions,
//! equipment cost follows an SOS2 piecewise linearization of the scaling
//! curve ([`piecewise`]), and heating demand clears through a temperature
//! interval cascade. With multiple [`Scenario`]s the model becomes a
//! two-stage stochastic program: design variables are shared, operation is
//! replicated per scenario, and the objective is the probability-weighted
//! sum.
//!
//! Parameter uncertainty and sensitivity sweeps enter through the closed
//! [`ParameterChange`] enum; each variant carries the typed index of the
//! coefficient it overwrites.

pub mod assemble;
pub mod params;
pub mod piecewise;
pub mod problem;
pub mod sets;
pub mod solution;
pub mod solve;

pub use assemble::{assemble, AssembledModel};
pub use params::{
    ConversionIndex, HeatIndex, LcaIndex, ParameterChange, ParameterFamily, ParameterStore,
    PhiIndex, SplitIndex, StoichIndex, UtilityIndex, YieldIndex,
};
pub use piecewise::{interpolate, linearize, Breakpoints};
pub use problem::{AssemblerOptions, FlowsheetProblem, Scenario};
pub use sets::{build_sets, ModelSets};
pub use solution::{FlowsheetSolution, ScenarioOutcome};
pub use solve::{solve_flowsheet, SolveConfig};
