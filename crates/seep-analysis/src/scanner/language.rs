//! Language detection by file extension and well-known filenames.

/// Languages and file classes the indexer routes to extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    JavaScript,
    TypeScript,
    Python,
    Bash,
    Dockerfile,
    Yaml,
    Sql,
    Config,
}

impl Language {
    /// Detect from a normalized path. Extension first, then well-known
    /// filenames (Dockerfile). Polyglot files route to their
    /// primary-language extractor.
    pub fn detect(path: &str) -> Option<Self> {
        let name = path.rsplit('/').next().unwrap_or(path);
        if name == "Dockerfile" || name.starts_with("Dockerfile.") {
            return Some(Self::Dockerfile);
        }
        let ext = seep_core::paths::extension(path);
        match ext.as_str() {
            ".js" | ".jsx" | ".mjs" | ".cjs" => Some(Self::JavaScript),
            ".ts" | ".tsx" | ".mts" | ".cts" | ".vue" => Some(Self::TypeScript),
            ".py" => Some(Self::Python),
            ".sh" | ".bash" => Some(Self::Bash),
            ".yml" | ".yaml" => Some(Self::Yaml),
            ".sql" => Some(Self::Sql),
            ".json" | ".toml" | ".ini" | ".env" => Some(Self::Config),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Python => "python",
            Self::Bash => "bash",
            Self::Dockerfile => "dockerfile",
            Self::Yaml => "yaml",
            Self::Sql => "sql",
            Self::Config => "config",
        }
    }

    /// Whether this language goes through the out-of-process JS/TS
    /// extractor.
    pub fn is_js_family(self) -> bool {
        matches!(self, Self::JavaScript | Self::TypeScript)
    }

    /// Whether the file gets a second, JSX-preserved extraction pass.
    pub fn has_jsx_pass(path: &str) -> bool {
        let ext = seep_core::paths::extension(path);
        matches!(ext.as_str(), ".jsx" | ".tsx")
    }
}

/// Language of a file for taint-registry lookups (coarser than the
/// extractor routing above).
pub fn taint_language(path: &str) -> &'static str {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".py") {
        "python"
    } else if lower.ends_with(".js")
        || lower.ends_with(".ts")
        || lower.ends_with(".jsx")
        || lower.ends_with(".tsx")
        || lower.ends_with(".mjs")
        || lower.ends_with(".cjs")
    {
        "javascript"
    } else if lower.ends_with(".sh") || lower.ends_with(".bash") {
        "bash"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_by_extension_and_filename() {
        assert_eq!(Language::detect("src/app.tsx"), Some(Language::TypeScript));
        assert_eq!(Language::detect("scripts/run.sh"), Some(Language::Bash));
        assert_eq!(Language::detect("Dockerfile"), Some(Language::Dockerfile));
        assert_eq!(Language::detect("Dockerfile.prod"), Some(Language::Dockerfile));
        assert_eq!(Language::detect("a/b/unknown.xyz"), None);
    }

    #[test]
    fn jsx_pass_only_for_jsx_extensions() {
        assert!(Language::has_jsx_pass("src/App.tsx"));
        assert!(Language::has_jsx_pass("src/App.jsx"));
        assert!(!Language::has_jsx_pass("src/app.ts"));
    }
}
