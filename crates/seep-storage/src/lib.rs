//! # seep-storage
//!
//! SQLite persistence layer for the Seep engine. Two databases, both
//! regenerated per run: `repo_index.db` (the relational model, written
//! through a batched writer) and `graphs.db` (data-flow and call edges).

pub mod batch;
pub mod database;
pub mod graph;
pub mod queries;

pub use batch::RepoStore;
pub use graph::GraphStore;
