//! Data-flow and call graph construction from the relational model.

pub mod builder;

pub use builder::{build_graphs, GraphStats};

/// Canonical node id: `file::function::var[.fields…]`.
pub fn node_id(file: &str, function: &str, var: &str) -> String {
    let function = if function.is_empty() { "global" } else { function };
    format!("{file}::{function}::{var}")
}
