//! Orchestrator-level errors and the run-fatality policy.

use super::{ExtractError, SchemaError, StoreError};

/// Errors that abort an indexing run.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("fidelity mismatch for {file}: extractor reported {expected} {record_kind} records, store committed {actual}")]
    FidelityMismatch {
        file: String,
        record_kind: String,
        expected: usize,
        actual: usize,
    },

    #[error("io error on {path}: {message}")]
    Io { path: String, message: String },
}

impl IndexError {
    pub fn io(path: impl Into<String>, e: &std::io::Error) -> Self {
        Self::Io { path: path.into(), message: e.to_string() }
    }
}
