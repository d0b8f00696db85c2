//! JavaScript/TypeScript extraction through the out-of-process
//! `extractor.cjs`.
//!
//! The extractor is invoked once per batch of file paths and returns a
//! JSON map `path → { extracted_data: … }`. Results are cached on disk
//! keyed by content hash, so unchanged files never re-invoke Node
//! across runs. `.jsx`/`.tsx` files get a second, JSX-preserved pass.

pub mod build_guard;
pub mod subprocess;

use std::path::{Path, PathBuf};
use std::process::Command;

use seep_core::errors::ExtractError;
use seep_core::FxHashMap;
use serde::Deserialize;
use tracing::debug;

use super::ExtractedFacts;
use crate::scanner::hasher::sha256_hex;

pub use build_guard::JsBuildGuard;

/// Extraction mode for the two-pass JSX scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsxMode {
    /// JSX lowered to factory calls (the default view).
    Transform,
    /// JSX preserved; results land in the `*_jsx` tables.
    Preserved,
}

impl JsxMode {
    fn flag(self) -> &'static str {
        match self {
            Self::Transform => "transform",
            Self::Preserved => "preserved",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFileResult {
    #[serde(default)]
    extracted_data: ExtractedFacts,
}

/// Client for the batched extractor subprocess.
pub struct JsExtractorClient {
    node_binary: String,
    artifact: PathBuf,
    cache_dir: PathBuf,
}

impl JsExtractorClient {
    pub fn new(artifact: PathBuf, cache_dir: PathBuf) -> Self {
        Self { node_binary: "node".to_string(), artifact, cache_dir }
    }

    /// Extract facts for a batch of `(path, content)` pairs. Cached
    /// results are served from disk; only misses reach the subprocess.
    pub fn extract_batch(
        &self,
        root: &Path,
        files: &[(String, String)],
        mode: JsxMode,
    ) -> Result<FxHashMap<String, ExtractedFacts>, ExtractError> {
        let mut results: FxHashMap<String, ExtractedFacts> = FxHashMap::default();
        let mut misses: Vec<&(String, String)> = Vec::new();

        for entry in files {
            let (path, content) = entry;
            match self.read_cache(content, mode) {
                Some(facts) => {
                    results.insert(path.clone(), facts);
                }
                None => misses.push(entry),
            }
        }
        debug!(
            total = files.len(),
            cached = results.len(),
            mode = mode.flag(),
            "extractor batch"
        );

        if misses.is_empty() {
            return Ok(results);
        }

        let paths: Vec<&str> = misses.iter().map(|(p, _)| p.as_str()).collect();
        let stdin = serde_json::to_vec(&paths).map_err(|e| ExtractError::SubprocessFailed {
            message: format!("failed to encode batch: {e}"),
        })?;

        let mut command = Command::new(&self.node_binary);
        command
            .arg(&self.artifact)
            .arg("--mode")
            .arg(mode.flag())
            .arg("--root")
            .arg(root);
        let output = subprocess::run_with_stdin(command, &stdin, &self.artifact)?;
        if !output.status.success() {
            return Err(ExtractError::SubprocessFailed {
                message: format!(
                    "extractor exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }

        let raw: FxHashMap<String, RawFileResult> = serde_json::from_slice(&output.stdout)
            .map_err(|e| ExtractError::MalformedOutput {
                file: self.artifact.display().to_string(),
                message: e.to_string(),
            })?;

        for (path, content) in &misses {
            let normalized = seep_core::paths::normalize(path);
            let Some(result) = raw.get(&normalized).or_else(|| raw.get(path.as_str())) else {
                return Err(ExtractError::MalformedOutput {
                    file: path.clone(),
                    message: "extractor output missing this file".to_string(),
                });
            };
            self.write_cache(content, mode, &result.extracted_data);
            results.insert(path.clone(), result.extracted_data.clone());
        }

        Ok(results)
    }

    fn cache_path(&self, content: &str, mode: JsxMode) -> PathBuf {
        let hash = sha256_hex(content.as_bytes());
        self.cache_dir.join(format!("{hash}-{}.json", mode.flag()))
    }

    fn read_cache(&self, content: &str, mode: JsxMode) -> Option<ExtractedFacts> {
        let data = std::fs::read(self.cache_path(content, mode)).ok()?;
        serde_json::from_slice(&data).ok()
    }

    fn write_cache(&self, content: &str, mode: JsxMode, facts: &ExtractedFacts) {
        // Cache misses are survivable; failures here only cost a
        // re-parse next run.
        if std::fs::create_dir_all(&self.cache_dir).is_err() {
            return;
        }
        if let Ok(data) = serde_json::to_vec(facts) {
            let _ = std::fs::write(self.cache_path(content, mode), data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_round_trips_facts() {
        let tmp = tempfile::tempdir().unwrap();
        let client = JsExtractorClient::new(
            tmp.path().join("extractor.cjs"),
            tmp.path().join("cache"),
        );

        let mut facts = ExtractedFacts::default();
        facts.symbols.push(crate::extractors::SymbolFact {
            name: "create".into(),
            kind: "function".into(),
            line: 3,
            col: 0,
            end_line: Some(9),
            type_annotation: None,
            parameters_json: Some("[{\"name\":\"req\"},{\"name\":\"res\"}]".into()),
        });

        let content = "export function create(req, res) {}";
        client.write_cache(content, JsxMode::Transform, &facts);

        let hit = client.read_cache(content, JsxMode::Transform).unwrap();
        assert_eq!(hit.symbols.len(), 1);
        assert_eq!(hit.symbols[0].name, "create");
        // Modes cache independently.
        assert!(client.read_cache(content, JsxMode::Preserved).is_none());
    }
}
