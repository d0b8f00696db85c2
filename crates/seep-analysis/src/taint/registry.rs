//! Taint registry: per-language source and sanitizer name patterns, and
//! the framework pattern seeds written into the relational store.
//!
//! Constructed once per analyzer instance and passed by reference;
//! immutable after construction.

use seep_core::FxHashMap;

/// Per-language pattern registry.
pub struct TaintRegistry {
    source_patterns: FxHashMap<&'static str, Vec<&'static str>>,
    sanitizer_patterns: FxHashMap<&'static str, Vec<&'static str>>,
}

impl TaintRegistry {
    /// Registry with the built-in pattern sets.
    pub fn with_defaults() -> Self {
        let mut source_patterns: FxHashMap<&'static str, Vec<&'static str>> =
            FxHashMap::default();
        source_patterns.insert(
            "javascript",
            vec![
                "req.body",
                "req.params",
                "req.query",
                "req.headers",
                "req.cookies",
                "request.body",
                "request.params",
                "request.query",
                "process.env",
                "process.argv",
                "location.search",
                "location.hash",
            ],
        );
        source_patterns.insert(
            "python",
            vec![
                "request.args",
                "request.form",
                "request.json",
                "request.data",
                "request.values",
                "request.files",
                "request.GET",
                "request.POST",
                "os.environ",
                "sys.argv",
                "input",
            ],
        );
        source_patterns.insert("bash", vec!["$1", "$2", "$3", "$@", "$*", "read"]);

        let mut sanitizer_patterns: FxHashMap<&'static str, Vec<&'static str>> =
            FxHashMap::default();
        sanitizer_patterns.insert(
            "javascript",
            vec![
                "sanitize",
                "escape",
                "validate",
                "encodeURIComponent",
                "encodeURI",
                "DOMPurify",
                "purify",
                "parameterize",
                "clean",
            ],
        );
        sanitizer_patterns.insert(
            "python",
            vec![
                "sanitize",
                "escape",
                "validate",
                "quote",
                "bleach",
                "secure_filename",
                "clean",
            ],
        );
        sanitizer_patterns.insert("bash", vec!["printf '%q'", "quote"]);

        Self { source_patterns, sanitizer_patterns }
    }

    /// Untrusted-input name patterns for a language ("unknown" gets the
    /// union, so lone config files still match env/argv shapes).
    pub fn source_patterns(&self, language: &str) -> Vec<&'static str> {
        match self.source_patterns.get(language) {
            Some(patterns) => patterns.clone(),
            None => {
                let mut all: Vec<&'static str> =
                    self.source_patterns.values().flatten().copied().collect();
                all.sort_unstable();
                all.dedup();
                all
            }
        }
    }

    /// Validator/sanitizer name patterns for a language.
    pub fn sanitizer_patterns(&self, language: &str) -> Vec<&'static str> {
        match self.sanitizer_patterns.get(language) {
            Some(patterns) => patterns.clone(),
            None => {
                let mut all: Vec<&'static str> =
                    self.sanitizer_patterns.values().flatten().copied().collect();
                all.sort_unstable();
                all.dedup();
                all
            }
        }
    }

    /// Request-shaped source patterns (the subset used for HTTP entry
    /// detection).
    pub fn request_patterns(&self, language: &str) -> Vec<&'static str> {
        self.source_patterns(language)
            .into_iter()
            .filter(|p| {
                let lower = p.to_ascii_lowercase();
                ["req", "request", "body", "params", "query", "form", "args", "json"]
                    .iter()
                    .any(|kw| lower.contains(kw))
            })
            .collect()
    }

    /// Languages with registered source patterns, sorted.
    pub fn languages(&self) -> Vec<&'static str> {
        let mut langs: Vec<&'static str> = self.source_patterns.keys().copied().collect();
        langs.sort_unstable();
        langs
    }
}

/// A framework pattern seed row: (pattern, direction, category).
pub type FrameworkPattern = (&'static str, &'static str, &'static str);

/// A framework safe-sink seed row: (sink_pattern, sink_type, reason).
pub type FrameworkSafeSink = (&'static str, &'static str, &'static str);

/// Express seed data.
pub fn express_patterns() -> (&'static [FrameworkPattern], &'static [FrameworkSafeSink]) {
    const PATTERNS: &[FrameworkPattern] = &[
        ("req.body", "source", "http_request"),
        ("req.params", "source", "http_request"),
        ("req.query", "source", "http_request"),
        ("req.headers", "source", "http_request"),
        ("req.cookies", "source", "http_request"),
        ("res.send", "sink", "response"),
        ("res.render", "sink", "response"),
        ("res.redirect", "sink", "redirect"),
        ("res.write", "sink", "response"),
    ];
    const SAFE_SINKS: &[FrameworkSafeSink] = &[
        ("res.json", "response", "JSON serialization encodes output"),
        ("res.jsonp", "response", "JSON serialization encodes output"),
        ("res.sendStatus", "response", "status-only response carries no data"),
    ];
    (PATTERNS, SAFE_SINKS)
}

/// Flask seed data.
pub fn flask_patterns() -> (&'static [FrameworkPattern], &'static [FrameworkSafeSink]) {
    const PATTERNS: &[FrameworkPattern] = &[
        ("request.args", "source", "http_request"),
        ("request.form", "source", "http_request"),
        ("request.json", "source", "http_request"),
        ("request.files", "source", "http_request"),
        ("render_template_string", "sink", "template"),
        ("make_response", "sink", "response"),
    ];
    const SAFE_SINKS: &[FrameworkSafeSink] = &[
        ("jsonify", "response", "JSON serialization encodes output"),
        ("render_template", "template", "autoescaping template engine"),
    ];
    (PATTERNS, SAFE_SINKS)
}

/// Django seed data.
pub fn django_patterns() -> (&'static [FrameworkPattern], &'static [FrameworkSafeSink]) {
    const PATTERNS: &[FrameworkPattern] = &[
        ("request.GET", "source", "http_request"),
        ("request.POST", "source", "http_request"),
        ("request.FILES", "source", "http_request"),
        ("HttpResponse", "sink", "response"),
        ("mark_safe", "sink", "template"),
    ];
    const SAFE_SINKS: &[FrameworkSafeSink] = &[
        ("JsonResponse", "response", "JSON serialization encodes output"),
        ("escape", "template", "HTML escaping"),
    ];
    (PATTERNS, SAFE_SINKS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_language_patterns() {
        let registry = TaintRegistry::with_defaults();
        assert!(registry.source_patterns("javascript").contains(&"req.body"));
        assert!(registry.source_patterns("python").contains(&"request.args"));
    }

    #[test]
    fn unknown_language_gets_union() {
        let registry = TaintRegistry::with_defaults();
        let all = registry.source_patterns("unknown");
        assert!(all.contains(&"req.body"));
        assert!(all.contains(&"os.environ"));
    }

    #[test]
    fn request_patterns_are_request_shaped() {
        let registry = TaintRegistry::with_defaults();
        let req = registry.request_patterns("javascript");
        assert!(req.contains(&"req.body"));
        assert!(!req.contains(&"process.env"));
    }
}
