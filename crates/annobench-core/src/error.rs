//! Core domain errors.

use thiserror::Error;

/// Core domain errors for annobench.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Unknown experiment type name.
    #[error("Unknown experiment type: {0}")]
    UnknownExperimentType(String),

    /// Unknown matching name.
    #[error("Unknown matching: {0}")]
    UnknownMatching(String),

    /// Unknown call kind name.
    #[error("Unknown call kind: {0}")]
    UnknownCallKind(String),

    /// Invalid state transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },
}
