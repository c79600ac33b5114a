//! Error types for importing, solving and reporting.
//!
//! Field- and record-level problems in the input never surface here: they are
//! recovered locally and recorded in [`crate::diagnostics::ImportDiagnostics`].
//! Only conditions that leave the model unusable are errors.

use thiserror::Error;

/// Invalid configuration or a base quantity that cannot be divided by.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g. `"import.base_mva"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Failure reported by a power-flow backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("power flow did not converge: {0}")]
    NonConvergence(String),
}

#[derive(Error, Debug)]
pub enum PwfError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to parse config: {0}")]
    ConfigSyntax(#[from] toml::de::Error),

    /// Nothing was parsed, so there is nothing to solve.
    #[error("no buses were parsed from the input")]
    NoBuses,

    #[error("no slack bus declared and no fallback bus available")]
    NoSlack,

    #[error("several slack buses in the network: {0:?}")]
    MultipleSlack(Vec<usize>),

    #[error(transparent)]
    Solve(#[from] SolveError),

    /// The solver returned without a value for an in-service device.
    #[error("incomplete solver results: {0}")]
    IncompleteResults(String),

    #[error("malformed report: {0}")]
    Report(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type PwfResult<T> = Result<T, PwfError>;
