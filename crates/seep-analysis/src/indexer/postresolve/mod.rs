//! Post-resolution: cross-file name resolution over the relational
//! store. Runs after the first indexing pass and before the second JSX
//! pass. Every sub-pass reads and writes `repo_index.db` only and is
//! idempotent: re-running after a full re-index yields identical
//! database contents.

mod handlers;
mod imports;
mod mounts;
mod params;

use rusqlite::Connection;
use seep_core::errors::StoreError;
use tracing::info;

pub use handlers::resolve_handler_files;
pub use imports::resolve_import_paths;
pub use mounts::resolve_router_mounts;
pub use params::resolve_parameter_names;

/// What each sub-pass accomplished, including rows skipped as ambiguous.
#[derive(Debug, Default, Clone)]
pub struct PostResolveReport {
    pub params_resolved: usize,
    pub mounts_resolved: usize,
    pub handlers_resolved: usize,
    pub imports_resolved: usize,
    /// Rows the resolver could not bind to a unique target, by
    /// description.
    pub ambiguous: Vec<String>,
}

/// Run all four sub-passes in order.
pub fn run_all(conn: &Connection) -> Result<PostResolveReport, StoreError> {
    let mut report = PostResolveReport::default();

    report.params_resolved = resolve_parameter_names(conn, &mut report.ambiguous)?;
    report.mounts_resolved = resolve_router_mounts(conn)?;
    report.handlers_resolved = resolve_handler_files(conn, &mut report.ambiguous)?;
    report.imports_resolved = resolve_import_paths(conn)?;

    info!(
        params = report.params_resolved,
        mounts = report.mounts_resolved,
        handlers = report.handlers_resolved,
        imports = report.imports_resolved,
        ambiguous = report.ambiguous.len(),
        "post-resolution complete"
    );
    Ok(report)
}
