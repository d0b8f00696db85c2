//! Error taxonomy for the Seep engine.
//!
//! Errors are classified by kind, never by provenance: callers match on
//! variants to decide between "re-run required", "fatal", and "record and
//! continue".

mod exit_code;
mod extract_error;
mod index_error;
mod schema_error;
mod store_error;

pub use exit_code::ExitCode;
pub use extract_error::ExtractError;
pub use index_error::IndexError;
pub use schema_error::SchemaError;
pub use store_error::StoreError;
