//! # seep-core
//!
//! Foundation crate for the Seep taint-analysis engine.
//! Defines errors, config, the schema registry, path normalization,
//! and shared collection types. Every other crate depends on this.

pub mod config;
pub mod errors;
pub mod paths;
pub mod schema;
pub mod types;

pub use config::SeepConfig;
pub use errors::{ExitCode, IndexError, SchemaError, StoreError};
pub use types::{FxHashMap, FxHashSet};
