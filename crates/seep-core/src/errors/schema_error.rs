//! Schema registry and stamp-gate errors.

/// Errors raised by the schema registry and its startup gate.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("schema is stale: registry hash {current} does not match stamped hash {stamped}")]
    Stale { current: String, stamped: String },

    #[error("table {table} is not declared in the schema registry")]
    UnknownTable { table: String },

    #[error("schema stamp missing from database (not created by this engine?)")]
    MissingStamp,
}
