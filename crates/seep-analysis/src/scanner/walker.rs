//! Parallel file walker using the `ignore` crate's `WalkParallel`.
//!
//! Respects `.gitignore` plus a default excluded-directory set. Output is
//! sorted by path: the orchestrator's walk order is part of the engine's
//! determinism contract.

use std::path::Path;

use crossbeam_channel as channel;
use seep_core::config::ScanConfig;
use seep_core::paths;

use super::language::Language;

/// Directories excluded from every scan.
pub const DEFAULT_IGNORES: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    "target",
    ".next",
    "__pycache__",
    ".pytest_cache",
    "coverage",
    "vendor",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".pf",
];

/// A file selected for indexing. `path` is repo-relative and normalized.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: String,
    pub ext: String,
    pub bytes: u64,
    pub language: Option<Language>,
}

/// Walk `root`, collecting indexable files sorted by path.
pub fn walk_directory(root: &Path, config: &ScanConfig) -> Vec<DiscoveredFile> {
    let (tx, rx) = channel::unbounded();

    let max_file_size = config.effective_max_file_size();

    let mut builder = ignore::WalkBuilder::new(root);
    builder
        .hidden(false)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .max_filesize(Some(max_file_size))
        .follow_links(config.effective_follow_symlinks());

    let threads = config.effective_threads();
    if threads > 0 {
        builder.threads(threads);
    }

    let mut overrides = ignore::overrides::OverrideBuilder::new(root);
    for pattern in DEFAULT_IGNORES {
        let _ = overrides.add(&format!("!{pattern}/**"));
        let _ = overrides.add(&format!("!{pattern}"));
    }
    for pattern in &config.extra_ignore {
        let _ = overrides.add(&format!("!{pattern}"));
    }
    if let Ok(built) = overrides.build() {
        builder.overrides(built);
    }

    let root_owned = root.to_path_buf();
    let walker = builder.build_parallel();
    walker.run(|| {
        let tx = tx.clone();
        let root = root_owned.clone();
        Box::new(move |entry| {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => return ignore::WalkState::Continue,
            };
            match entry.file_type() {
                Some(ft) if ft.is_file() => {}
                _ => return ignore::WalkState::Continue,
            }

            let bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let rel = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .to_string();
            let path = paths::normalize(&rel);
            let ext = paths::extension(&path);
            let language = Language::detect(&path);

            let _ = tx.send(DiscoveredFile { path, ext, bytes, language });
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut files: Vec<DiscoveredFile> = rx.into_iter().collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}
