//! Build guard for the out-of-process JS/TS extractor.
//!
//! The compiled `dist/extractor.cjs` must match its TypeScript sources.
//! A deterministic SHA-256 over an explicit watched-file list (sorted,
//! filename + content) is compared against `dist/.build_signature`; a
//! mismatch triggers `npm run build` and the caller must re-run.

use std::path::{Path, PathBuf};

use seep_core::errors::ExtractError;
use sha2::{Digest, Sha256};
use tracing::warn;

use super::subprocess::run_with_timeout;

/// Files whose content participates in the build signature. An explicit
/// list: structure changes must be deliberate.
const WATCH_FILES: &[&str] = &[
    "package.json",
    "tsconfig.json",
    "src/main.ts",
    "src/schema.ts",
    "src/types/index.ts",
    "src/extractors/cfg_extractor.ts",
    "src/extractors/core_language.ts",
    "src/extractors/data_flow.ts",
    "src/extractors/framework_extractors.ts",
    "src/extractors/module_framework.ts",
    "src/extractors/security_extractors.ts",
];

pub struct JsBuildGuard {
    project_path: PathBuf,
}

impl JsBuildGuard {
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self { project_path: project_path.into() }
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.project_path.join("dist").join("extractor.cjs")
    }

    fn signature_path(&self) -> PathBuf {
        self.project_path.join("dist").join(".build_signature")
    }

    /// SHA-256 over the sorted watched files (filename + content).
    /// Every watched file must exist; a missing file is an error, not a
    /// fallback.
    pub fn source_hash(&self) -> Result<String, ExtractError> {
        let mut watched: Vec<&str> = WATCH_FILES.to_vec();
        watched.sort_unstable();

        let mut hasher = Sha256::new();
        for rel in watched {
            let path = self.project_path.join(rel);
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            hasher.update(name.as_bytes());
            let content = std::fs::read(&path).map_err(|e| ExtractError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            hasher.update(&content);
        }

        let digest = hasher.finalize();
        let mut out = String::with_capacity(64);
        for byte in digest {
            use std::fmt::Write;
            let _ = write!(out, "{byte:02x}");
        }
        Ok(out)
    }

    fn stored_signature(&self) -> Option<String> {
        std::fs::read_to_string(self.signature_path())
            .ok()
            .map(|s| s.trim().to_string())
    }

    /// Is the artifact current? (signature matches AND artifact exists)
    pub fn is_up_to_date(&self) -> Result<bool, ExtractError> {
        if !self.artifact_path().exists() {
            return Ok(false);
        }
        let current = self.source_hash()?;
        Ok(self.stored_signature().as_deref() == Some(current.as_str()))
    }

    /// Rebuild if stale. Returns `Ok(true)` when a rebuild happened;
    /// the caller must convert this into a re-run-required exit.
    pub fn ensure_up_to_date(&self) -> Result<bool, ExtractError> {
        if self.is_up_to_date()? {
            return Ok(false);
        }
        warn!(project = %self.project_path.display(), "extractor sources changed, rebuilding");
        self.run_build()?;

        if !self.artifact_path().exists() {
            return Err(ExtractError::SubprocessFailed {
                message: format!(
                    "build completed but {} was not produced",
                    self.artifact_path().display()
                ),
            });
        }
        let signature = self.source_hash()?;
        std::fs::write(self.signature_path(), &signature).map_err(|e| ExtractError::Io {
            path: self.signature_path().display().to_string(),
            message: e.to_string(),
        })?;
        Ok(true)
    }

    fn run_build(&self) -> Result<(), ExtractError> {
        let mut command = std::process::Command::new(npm_binary());
        command.arg("run").arg("build").current_dir(&self.project_path);
        let output = run_with_timeout(command, Path::new("npm run build"))?;
        if !output.status.success() {
            return Err(ExtractError::SubprocessFailed {
                message: format!(
                    "npm run build exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }
        Ok(())
    }
}

fn npm_binary() -> &'static str {
    if cfg!(windows) {
        "npm.cmd"
    } else {
        "npm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_project(dir: &Path) {
        for rel in WATCH_FILES {
            let path = dir.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, format!("// {rel}\n")).unwrap();
        }
        std::fs::create_dir_all(dir.join("dist")).unwrap();
    }

    #[test]
    fn hash_is_deterministic_and_content_sensitive() {
        let tmp = tempfile::tempdir().unwrap();
        seed_project(tmp.path());
        let guard = JsBuildGuard::new(tmp.path());

        let first = guard.source_hash().unwrap();
        assert_eq!(first, guard.source_hash().unwrap());

        std::fs::write(tmp.path().join("src/main.ts"), "changed\n").unwrap();
        assert_ne!(first, guard.source_hash().unwrap());
    }

    #[test]
    fn matching_signature_is_up_to_date() {
        let tmp = tempfile::tempdir().unwrap();
        seed_project(tmp.path());
        let guard = JsBuildGuard::new(tmp.path());

        std::fs::write(guard.artifact_path(), "module.exports = {}\n").unwrap();
        std::fs::write(
            tmp.path().join("dist/.build_signature"),
            guard.source_hash().unwrap(),
        )
        .unwrap();
        assert!(guard.is_up_to_date().unwrap());

        std::fs::write(tmp.path().join("src/schema.ts"), "changed\n").unwrap();
        assert!(!guard.is_up_to_date().unwrap());
    }
}
