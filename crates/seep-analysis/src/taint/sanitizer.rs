//! Sanitizer detection shared by both taint engines.
//!
//! Three signals, checked in order for every hop:
//! 1. name-based safe sinks seen at the hop's `(file, line)` call sites,
//! 2. validation-framework anchors within ±10 lines,
//! 3. language-specific validator name patterns inside the node id.
//!
//! The first positive match kills the taint; the path is recorded as
//! sanitized (annotated, not dropped) with the match metadata.

use rusqlite::Connection;
use seep_core::errors::StoreError;
use seep_core::{FxHashMap, FxHashSet};
use seep_storage::queries::{self, ValidationUsage};
use tracing::debug;

use crate::scanner::language::taint_language;
use crate::taint::path::Hop;
use crate::taint::registry::TaintRegistry;

/// Line window for validation-framework anchors.
const VALIDATION_LINE_WINDOW: i64 = 10;

/// Metadata of a sanitizer match: where the taint was killed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizerMatch {
    pub file: String,
    pub line: i64,
    pub method: String,
}

/// Sanitizer registry; all lookup state is loaded at construction so the
/// per-hop scan is allocation-free on the hot path.
pub struct SanitizerRegistry<'r> {
    registry: &'r TaintRegistry,
    safe_sinks: FxHashSet<String>,
    validation_sanitizers: Vec<ValidationUsage>,
    call_args_cache: FxHashMap<(String, i64), Vec<String>>,
}

impl<'r> SanitizerRegistry<'r> {
    pub fn new(conn: &Connection, registry: &'r TaintRegistry) -> Result<Self, StoreError> {
        let safe_sinks: FxHashSet<String> =
            queries::safe_sink_patterns(conn)?.into_iter().collect();
        let validation_sanitizers = queries::validation_usages(conn)?;

        let mut call_args_cache: FxHashMap<(String, i64), Vec<String>> = FxHashMap::default();
        for (file, line, callee) in queries::call_arg_locations(conn)? {
            call_args_cache.entry((file, line)).or_default().push(callee);
        }

        debug!(
            safe_sinks = safe_sinks.len(),
            validation_sites = validation_sanitizers.len(),
            call_arg_locations = call_args_cache.len(),
            "sanitizer registry loaded"
        );

        Ok(Self { registry, safe_sinks, validation_sanitizers, call_args_cache })
    }

    /// Does a callee name match a safe-sink pattern? Exact equality or
    /// bidirectional substring containment.
    pub fn is_safe_sink(&self, function_name: &str) -> bool {
        if self.safe_sinks.contains(function_name) {
            return true;
        }
        self.safe_sinks
            .iter()
            .any(|sink| function_name.contains(sink.as_str()) || sink.contains(function_name))
    }

    /// Scan a hop chain; the first sanitizer signal wins.
    pub fn scan(&self, hops: &[Hop]) -> Option<SanitizerMatch> {
        for hop in hops {
            let file = if !hop.from_file.is_empty() { &hop.from_file } else { &hop.to_file };
            if file.is_empty() {
                continue;
            }
            let line = hop.line;
            let node = if !hop.from.is_empty() { &hop.from } else { &hop.to };

            // Signal 1: safe-sink callee at this location.
            if line > 0 {
                if let Some(callees) = self.call_args_cache.get(&(file.clone(), line)) {
                    for callee in callees {
                        if self.is_safe_sink(callee) {
                            debug!(%callee, %file, line, "taint killed by safe sink");
                            return Some(SanitizerMatch {
                                file: file.clone(),
                                line,
                                method: callee.clone(),
                            });
                        }
                    }
                }
            }

            // Signal 2: validation-framework anchor near this line.
            if line > 0 {
                for site in &self.validation_sanitizers {
                    let file_matches =
                        site.file.ends_with(file.as_str()) || file.ends_with(site.file.as_str());
                    if file_matches && (site.line - line).abs() <= VALIDATION_LINE_WINDOW {
                        debug!(framework = %site.framework, %file, line, "taint killed by validation middleware");
                        // The reported line is the anchor's own line, so
                        // reporters can surface the middleware evidence.
                        return Some(SanitizerMatch {
                            file: file.clone(),
                            line: site.line,
                            method: format!(
                                "{}:{}",
                                site.framework,
                                site.schema.as_deref().unwrap_or("validation")
                            ),
                        });
                    }
                }
            }

            // Signal 3: validator name pattern inside the node id.
            if !node.is_empty() {
                let patterns = self.registry.sanitizer_patterns(taint_language(file));
                for pattern in patterns {
                    if node.contains(pattern) {
                        debug!(pattern, %node, "taint killed by validator name pattern");
                        return Some(SanitizerMatch {
                            file: file.clone(),
                            line,
                            method: pattern.to_string(),
                        });
                    }
                }
            }
        }
        None
    }

    /// Scan a bare node-id path (the forward resolver's representation).
    pub fn scan_node_path(&self, node_ids: &[String]) -> Option<SanitizerMatch> {
        for node in node_ids {
            let mut parts = node.split("::");
            let file = parts.next().unwrap_or("");
            let function = parts.next().unwrap_or("");
            if file.is_empty() {
                continue;
            }

            let patterns = self.registry.sanitizer_patterns(taint_language(file));
            for pattern in &patterns {
                if !function.is_empty() && function.contains(pattern) {
                    return Some(SanitizerMatch {
                        file: file.to_string(),
                        line: 0,
                        method: function.to_string(),
                    });
                }
                if node.contains(pattern) {
                    return Some(SanitizerMatch {
                        file: file.to_string(),
                        line: 0,
                        method: pattern.to_string(),
                    });
                }
            }
        }
        None
    }
}
