//! Demand-driven backward taint engine over the pre-computed graph.
//!
//! For each sink the engine walks reverse data-flow and call edges toward
//! sources. A source match is a waypoint, not a termination: exploration
//! continues to `max_depth` or a node with no predecessors, so recorded
//! paths carry the full call chain. Paths crossing a sanitizer are
//! recorded as sanitized, with the kill site annotated.

use std::collections::VecDeque;

use rusqlite::Connection;
use seep_core::config::TaintConfig;
use seep_core::errors::StoreError;
use seep_core::FxHashSet;
use seep_storage::graph::{EdgeMeta, GraphStore};
use seep_storage::queries;
use tracing::debug;

use crate::scanner::language::taint_language;
use crate::taint::access_path::AccessPath;
use crate::taint::path::{FlowEndpoint, Hop, TaintPath};
use crate::taint::registry::TaintRegistry;
use crate::taint::sanitizer::SanitizerRegistry;

struct Frame {
    ap: AccessPath,
    depth: usize,
    hops: Vec<Hop>,
    matched_source: Option<FlowEndpoint>,
}

/// Field-sensitive IFDS backward reachability engine.
pub struct IfdsAnalyzer<'a> {
    repo: &'a Connection,
    graph: &'a GraphStore,
    registry: &'a TaintRegistry,
    sanitizers: SanitizerRegistry<'a>,
    max_depth: usize,
    max_paths_per_sink: usize,
    max_iterations: usize,
}

impl<'a> IfdsAnalyzer<'a> {
    pub fn new(
        repo: &'a Connection,
        graph: &'a GraphStore,
        registry: &'a TaintRegistry,
        config: &TaintConfig,
    ) -> Result<Self, StoreError> {
        let sanitizers = SanitizerRegistry::new(repo, registry)?;
        Ok(Self {
            repo,
            graph,
            registry,
            sanitizers,
            max_depth: config.effective_max_depth(),
            max_paths_per_sink: config.effective_max_paths_per_sink(),
            max_iterations: config.effective_max_iterations(),
        })
    }

    /// Find all taint paths from a sink back to any of the sources.
    /// Returns `(vulnerable, sanitized)`, each sorted for determinism.
    pub fn analyze_sink_to_sources(
        &self,
        sink: &FlowEndpoint,
        sources: &[FlowEndpoint],
    ) -> Result<(Vec<TaintPath>, Vec<TaintPath>), StoreError> {
        let mut source_aps: Vec<(FlowEndpoint, AccessPath)> = Vec::new();
        for source in sources {
            if let Some(ap) = self.endpoint_to_access_path(source)? {
                source_aps.push((source.clone(), ap));
            }
        }
        source_aps.sort_by(|a, b| a.1.node_id().cmp(&b.1.node_id()));

        let Some(sink_ap) = self.endpoint_to_access_path(sink)? else {
            return Ok((Vec::new(), Vec::new()));
        };

        debug!(sink = %sink.pattern, sources = source_aps.len(), "tracing backward from sink");

        let mut vulnerable: Vec<TaintPath> = Vec::new();
        let mut sanitized: Vec<TaintPath> = Vec::new();

        let mut worklist: VecDeque<Frame> = VecDeque::new();
        worklist.push_back(Frame {
            ap: sink_ap,
            depth: 0,
            hops: Vec::new(),
            matched_source: None,
        });
        let mut visited: FxHashSet<String> = FxHashSet::default();
        let mut iterations = 0usize;

        while let Some(frame) = worklist.pop_front() {
            if vulnerable.len() + sanitized.len() >= self.max_paths_per_sink {
                break;
            }
            iterations += 1;
            if iterations > self.max_iterations {
                debug!("iteration cap reached");
                break;
            }

            let node_id = frame.ap.node_id();
            if !visited.insert(node_id.clone()) {
                continue;
            }
            // Per-path cycle break.
            if frame.hops.iter().any(|h| h.to == node_id) {
                continue;
            }

            let mut matched_source = frame.matched_source.clone();
            if self.is_true_entry_point(&node_id)? {
                matched_source = Some(FlowEndpoint {
                    file: frame.ap.file().to_string(),
                    line: 0,
                    name: node_id.clone(),
                    pattern: frame.ap.base().to_string(),
                });
            } else {
                for (source, source_ap) in &source_aps {
                    if access_paths_match(&frame.ap, source_ap) {
                        matched_source = Some(source.clone());
                        break;
                    }
                }
            }

            if frame.depth >= self.max_depth {
                if let Some(source) = matched_source {
                    self.record(source, sink, frame.hops, &mut vulnerable, &mut sanitized);
                }
                continue;
            }

            let predecessors = self.predecessors(&frame.ap)?;
            if predecessors.is_empty() {
                if let Some(source) = matched_source {
                    self.record(source, sink, frame.hops, &mut vulnerable, &mut sanitized);
                }
                continue;
            }

            for (pred_ap, edge_type, meta) in predecessors {
                let hop = Hop {
                    edge_type,
                    from: pred_ap.node_id(),
                    to: node_id.clone(),
                    from_file: pred_ap.file().to_string(),
                    to_file: frame.ap.file().to_string(),
                    line: meta.line,
                    depth: frame.depth + 1,
                };
                let mut hops = Vec::with_capacity(frame.hops.len() + 1);
                hops.push(hop);
                hops.extend(frame.hops.iter().cloned());
                worklist.push_back(Frame {
                    ap: pred_ap,
                    depth: frame.depth + 1,
                    hops,
                    matched_source: matched_source.clone(),
                });
            }
        }

        sort_paths(&mut vulnerable);
        sort_paths(&mut sanitized);
        Ok((vulnerable, sanitized))
    }

    fn record(
        &self,
        source: FlowEndpoint,
        sink: &FlowEndpoint,
        hops: Vec<Hop>,
        vulnerable: &mut Vec<TaintPath>,
        sanitized: &mut Vec<TaintPath>,
    ) {
        let mut path = TaintPath::new(source, sink.clone(), hops);
        match self.sanitizers.scan(&path.hops) {
            Some(kill) => {
                path.mark_sanitized(kill.file, kill.line, kill.method);
                debug!(hops = path.hops.len(), "recorded sanitized path");
                sanitized.push(path);
            }
            None => {
                debug!(hops = path.hops.len(), "recorded vulnerable path");
                vulnerable.push(path);
            }
        }
    }

    /// All access paths flowing into `ap`: stored reverse data-flow
    /// edges, stored call edges, and on-demand `parameter_call`
    /// synthesis when `ap` names a parameter of its function.
    ///
    /// Stored edges are keyed by exact node id, so the lookup walks the
    /// access path's prefixes (field stripping) and re-appends the
    /// stripped suffix onto each predecessor: the field-transfer flow
    /// function over prefix-matched aliases. Suffixes that would exceed
    /// the k-limit are dropped, not lengthened.
    fn predecessors(
        &self,
        ap: &AccessPath,
    ) -> Result<Vec<(AccessPath, String, EdgeMeta)>, StoreError> {
        let mut out: Vec<(AccessPath, String, EdgeMeta)> = Vec::new();

        for strip in 0..=ap.fields().len() {
            let prefix_ap = ap.strip_fields(strip);
            let suffix = &ap.fields()[ap.fields().len() - strip..];
            let node_id = prefix_ap.node_id();

            for (target, edge_type, meta) in self.graph.reverse_predecessors(&node_id)? {
                match parse_and_reappend(&target, suffix) {
                    Some(pred) => out.push((pred, edge_type, meta)),
                    None => debug!(node = %target, "dropping malformed or over-limit node id"),
                }
            }

            for (source, edge_type, meta) in self.graph.call_predecessors(&node_id)? {
                match parse_and_reappend(&source, suffix) {
                    Some(pred) => out.push((pred, edge_type, meta)),
                    None => debug!(node = %source, "dropping malformed or over-limit node id"),
                }
            }
        }

        out.extend(self.parameter_call_predecessors(ap)?);
        // One frame per predecessor node, deterministic order. The
        // synthesized parameter_call wins over a stored duplicate so
        // recorded hops name the interprocedural step.
        out.sort_by(|a, b| {
            let pa = u8::from(a.1 != "parameter_call");
            let pb = u8::from(b.1 != "parameter_call");
            a.0.node_id()
                .cmp(&b.0.node_id())
                .then(pa.cmp(&pb))
                .then_with(|| a.1.cmp(&b.1))
        });
        out.dedup_by(|a, b| a.0 == b.0);
        Ok(out)
    }

    /// Flow function for parameters: when the backward trace reaches a
    /// function parameter, look up every call site binding that
    /// parameter and step into each caller's argument expression. This
    /// is the only place edges are computed on demand.
    fn parameter_call_predecessors(
        &self,
        ap: &AccessPath,
    ) -> Result<Vec<(AccessPath, String, EdgeMeta)>, StoreError> {
        let mut out = Vec::new();
        let mut call_sites =
            queries::call_sites_of(self.repo, ap.file(), ap.function(), ap.base())?;

        // Object-literal handler tables ({ get: handleGet }) dispatch
        // through dotted aliases; expand the call-site set with them.
        for alias in queries::object_literal_aliases(self.repo, ap.function())? {
            call_sites.extend(queries::call_sites_by_callee(self.repo, &alias, ap.base())?);
        }

        for site in call_sites {
            let Some(arg_var) = parse_argument_variable(&site.argument_expr) else {
                continue;
            };
            let caller_function = if site.caller_function.is_empty() {
                "global".to_string()
            } else {
                site.caller_function.clone()
            };
            let mut caller_ap = AccessPath::from_pattern(&site.file, caller_function, &arg_var);
            // The tracked fields ride along into the caller's argument.
            let mut over_limit = false;
            for field in ap.fields() {
                match caller_ap.append_field(field) {
                    Some(next) => caller_ap = next,
                    None => {
                        over_limit = true;
                        break;
                    }
                }
            }
            if over_limit {
                continue;
            }
            let meta = EdgeMeta {
                line: site.line,
                file: Some(site.file.clone()),
                call: Some(site.callee_function.clone()),
            };
            debug!(from = %caller_ap.node_id(), to = %ap.node_id(), "parameter flow");
            out.push((caller_ap, "parameter_call".to_string(), meta));
        }
        Ok(out)
    }

    /// Convert a source/sink endpoint to the access path the trace
    /// starts from. `name` carries the traced expression (a sink's
    /// tainted argument); `pattern` is the classification pattern and
    /// the fallback.
    fn endpoint_to_access_path(
        &self,
        endpoint: &FlowEndpoint,
    ) -> Result<Option<AccessPath>, StoreError> {
        let traced = if !endpoint.name.is_empty() { &endpoint.name } else { &endpoint.pattern };
        if endpoint.file.is_empty() || traced.is_empty() {
            return Ok(None);
        }
        let function = queries::containing_function(self.repo, &endpoint.file, endpoint.line)?;
        Ok(Some(AccessPath::from_pattern(&endpoint.file, function, traced)))
    }

    /// True entry points: definitionally untrusted data. HTTP request
    /// shapes are confirmed against the middleware-chain tables; env and
    /// argv shapes match unconditionally.
    fn is_true_entry_point(&self, node_id: &str) -> Result<bool, StoreError> {
        let parts: Vec<&str> = node_id.split("::").collect();
        if parts.len() < 3 {
            return Ok(false);
        }
        let file = parts[0];
        let function = parts[1];
        let variable = parts[2..].join("::");

        let request_patterns = self.registry.request_patterns(taint_language(file));
        if request_patterns.iter().any(|p| variable.contains(p))
            && queries::middleware_handler_count(self.repo, function)? > 0
        {
            debug!(node_id, "true entry point (middleware chain)");
            return Ok(true);
        }

        if variable.contains("process.env") || variable.contains("env.") {
            debug!(node_id, "true entry point (env var)");
            return Ok(true);
        }
        if variable.contains("process.argv") || variable.contains("argv") {
            debug!(node_id, "true entry point (CLI arg)");
            return Ok(true);
        }

        Ok(false)
    }
}

/// Parse a stored node id and re-append a stripped field suffix.
/// Returns `None` on malformed ids or when the k-limit blocks the
/// append.
fn parse_and_reappend(node_id: &str, suffix: &[String]) -> Option<AccessPath> {
    let mut ap = AccessPath::parse(node_id)?;
    for field in suffix {
        ap = ap.append_field(field)?;
    }
    Some(ap)
}

/// Do two access paths represent the same data? Exact match or
/// conservative prefix aliasing.
fn access_paths_match(a: &AccessPath, b: &AccessPath) -> bool {
    if a.base() == b.base() && a.fields() == b.fields() {
        return true;
    }
    a.matches(b)
}

/// Extract a plain variable reference from an argument expression.
/// Literals, calls, and arithmetic are rejected; only identifier or
/// dotted-path arguments bind taint through a call.
pub fn parse_argument_variable(arg_expr: &str) -> Option<String> {
    let expr = arg_expr.trim();
    if expr.is_empty() {
        return None;
    }
    if expr.starts_with('"') || expr.starts_with('\'') || expr.starts_with('`') {
        return None;
    }
    if expr.contains('(') {
        return None;
    }
    if ["+", "-", "*", "/", "%", "=", "<", ">", "!"].iter().any(|op| expr.contains(op)) {
        return None;
    }
    if expr.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let first = expr.chars().next()?;
    if !(first.is_alphabetic() || first == '_' || first == '$') {
        return None;
    }
    Some(expr.to_string())
}

fn sort_paths(paths: &mut [TaintPath]) {
    paths.sort_by(|a, b| {
        (&a.source.file, a.source.line, &a.source.pattern, a.hops.len()).cmp(&(
            &b.source.file,
            b.source.line,
            &b.source.pattern,
            b.hops.len(),
        ))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_variable_filtering() {
        assert_eq!(parse_argument_variable("userId"), Some("userId".into()));
        assert_eq!(parse_argument_variable("req.body.id"), Some("req.body.id".into()));
        assert_eq!(parse_argument_variable("\"literal\""), None);
        assert_eq!(parse_argument_variable("fn(x)"), None);
        assert_eq!(parse_argument_variable("a + b"), None);
        assert_eq!(parse_argument_variable("42"), None);
    }
}
