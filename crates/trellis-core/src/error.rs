//! Unified error types for the trellis workspace.
//!
//! [`TrellisError`] represents every failure class the optimization core can
//! produce. Configuration and mutation errors are fatal by contract: an
//! inconsistent model is never silently solved.

use thiserror::Error;

/// Unified error type for all trellis operations.
#[derive(Error, Debug)]
pub enum TrellisError {
    /// I/O errors (spec files, manifests)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Superstructure validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors raised before or during model assembly
    #[error("Configuration error: {0}")]
    Config(String),

    /// Scenario/sensitivity parameter mutation errors
    #[error("Mutation error: {0}")]
    Mutation(String),

    /// Solver-reported failures, surfaced opaquely
    #[error("Solver error: {0}")]
    Solver(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using TrellisError.
pub type TrellisResult<T> = Result<T, TrellisError>;

impl From<anyhow::Error> for TrellisError {
    fn from(err: anyhow::Error) -> Self {
        TrellisError::Other(err.to_string())
    }
}

impl From<String> for TrellisError {
    fn from(s: String) -> Self {
        TrellisError::Other(s)
    }
}

impl From<&str> for TrellisError {
    fn from(s: &str) -> Self {
        TrellisError::Other(s.to_string())
    }
}
