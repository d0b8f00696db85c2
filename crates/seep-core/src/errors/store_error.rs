//! Relational and graph store errors.

use super::SchemaError;

/// Errors that can occur in the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {message}")]
    Sqlite { message: String },

    #[error("constraint violation in table {table} at batch row {row_index}: {message}")]
    Constraint {
        table: String,
        row_index: usize,
        message: String,
    },

    #[error("attempted to write to undeclared table {table}")]
    UnknownTable { table: String },

    #[error("unresolved temporary CFG block id {temp_id} at flush")]
    UnresolvedTempId { temp_id: i64 },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl StoreError {
    pub fn sqlite(e: impl std::fmt::Display) -> Self {
        Self::Sqlite { message: e.to_string() }
    }
}
