//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Top-level configuration for a Seep run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SeepConfig {
    pub scan: ScanConfig,
    pub store: StoreConfig,
    pub taint: TaintConfig,
}

/// Configuration for the file walker.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScanConfig {
    /// Maximum file size in bytes. Default: 2MB.
    pub max_file_size: Option<u64>,
    /// Number of walker threads. 0 = auto-detect.
    pub threads: Option<usize>,
    /// Additional ignore patterns beyond .gitignore and the defaults.
    #[serde(default)]
    pub extra_ignore: Vec<String>,
    /// Follow symbolic links. Default: false.
    pub follow_symlinks: Option<bool>,
}

impl ScanConfig {
    pub fn effective_max_file_size(&self) -> u64 {
        self.max_file_size.unwrap_or(2 * 1024 * 1024)
    }

    pub fn effective_threads(&self) -> usize {
        self.threads.unwrap_or(0)
    }

    pub fn effective_follow_symlinks(&self) -> bool {
        self.follow_symlinks.unwrap_or(false)
    }
}

/// Configuration for the relational store.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// Rows buffered per table before a full flush. Default: 200, cap 2000.
    pub batch_size: Option<usize>,
}

pub const DEFAULT_BATCH_SIZE: usize = 200;
pub const MAX_BATCH_SIZE: usize = 2000;

impl StoreConfig {
    pub fn effective_batch_size(&self) -> usize {
        match self.batch_size {
            Some(n) if n == 0 => DEFAULT_BATCH_SIZE,
            Some(n) => n.min(MAX_BATCH_SIZE),
            None => DEFAULT_BATCH_SIZE,
        }
    }
}

/// Configuration for the taint engines.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TaintConfig {
    /// Backward traversal depth bound. Default: 10.
    pub max_depth: Option<usize>,
    /// Paths recorded per sink before the worklist stops. Default: 100.
    pub max_paths_per_sink: Option<usize>,
    /// Worklist iteration bound per sink. Default: 10,000.
    pub max_iterations: Option<usize>,
    /// Access path k-limit. Default: 5.
    pub max_fields: Option<usize>,
}

impl TaintConfig {
    pub fn effective_max_depth(&self) -> usize {
        self.max_depth.unwrap_or(10)
    }

    pub fn effective_max_paths_per_sink(&self) -> usize {
        self.max_paths_per_sink.unwrap_or(100)
    }

    pub fn effective_max_iterations(&self) -> usize {
        self.max_iterations.unwrap_or(10_000)
    }

    pub fn effective_max_fields(&self) -> usize {
        self.max_fields.unwrap_or(5)
    }
}

/// Name of the single debug environment variable. Setting it to any
/// non-empty value widens the default trace filter; it never alters
/// behavior.
pub const DEBUG_ENV_VAR: &str = "SEEP_DEBUG";

/// Whether verbose tracing was requested.
pub fn debug_enabled() -> bool {
    std::env::var(DEBUG_ENV_VAR).map(|v| !v.is_empty()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_is_capped() {
        let cfg = StoreConfig { batch_size: Some(50_000) };
        assert_eq!(cfg.effective_batch_size(), MAX_BATCH_SIZE);
        let cfg = StoreConfig { batch_size: Some(0) };
        assert_eq!(cfg.effective_batch_size(), DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn taint_defaults() {
        let cfg = TaintConfig::default();
        assert_eq!(cfg.effective_max_depth(), 10);
        assert_eq!(cfg.effective_max_paths_per_sink(), 100);
        assert_eq!(cfg.effective_max_fields(), 5);
    }
}
