//! Forward flow resolution: materialize every source→exit path into the
//! `resolved_flow_audit` table for audit and truth-table output.
//!
//! DFS from each entry node along forward data-flow edges with adaptive
//! throttling: infrastructure entries (configs, env vars, ALL_CAPS
//! constants) get a small effort budget, user code a larger one.
//! Flows deduplicate semantically, keeping the shortest path per
//! signature.

use rusqlite::Connection;
use seep_core::errors::StoreError;
use seep_core::{FxHashMap, FxHashSet};
use seep_storage::graph::GraphStore;
use seep_storage::queries;
use tracing::{debug, info, warn};

use crate::taint::path::classify_vulnerability;
use crate::taint::registry::TaintRegistry;
use crate::taint::sanitizer::{SanitizerMatch, SanitizerRegistry};

const INFRASTRUCTURE_MAX_EFFORT: usize = 5_000;
const INFRASTRUCTURE_MAX_VISITS: usize = 2;
const USERCODE_MAX_EFFORT: usize = 25_000;
const USERCODE_MAX_VISITS: usize = 10;

const MAX_DEPTH: usize = 20;
const MAX_FLOWS: usize = 100_000;
const MAX_FLOWS_PER_ENTRY: usize = 1_000;

type FlowSignature = (String, String, String, String, &'static str, Option<String>);

/// Resolves all forward flows in the codebase.
pub struct FlowResolver<'a> {
    repo: &'a Connection,
    graph: &'a GraphStore,
    registry: &'a TaintRegistry,
    sanitizers: SanitizerRegistry<'a>,
    flows_resolved: usize,
    best_paths: FxHashMap<FlowSignature, usize>,
}

impl<'a> FlowResolver<'a> {
    pub fn new(
        repo: &'a Connection,
        graph: &'a GraphStore,
        registry: &'a TaintRegistry,
    ) -> Result<Self, StoreError> {
        let sanitizers = SanitizerRegistry::new(repo, registry)?;
        Ok(Self {
            repo,
            graph,
            registry,
            sanitizers,
            flows_resolved: 0,
            best_paths: FxHashMap::default(),
        })
    }

    /// Complete forward flow resolution. Returns the number of flows
    /// recorded.
    pub fn resolve_all_flows(&mut self) -> Result<usize, StoreError> {
        self.repo
            .execute("DELETE FROM resolved_flow_audit WHERE engine = 'FlowResolver'", [])
            .map_err(StoreError::sqlite)?;

        let entry_nodes = self.entry_nodes()?;
        let exit_nodes = self.exit_nodes()?;
        info!(entries = entry_nodes.len(), exits = exit_nodes.len(), "starting flow resolution");

        for entry_id in &entry_nodes {
            if self.flows_resolved >= MAX_FLOWS {
                warn!(max = MAX_FLOWS, "reached maximum flow limit");
                break;
            }
            self.trace_from_entry(entry_id, &exit_nodes)?;
        }

        info!(flows = self.flows_resolved, "flow resolution complete");
        Ok(self.flows_resolved)
    }

    /// Entry points: registry source patterns present as graph nodes,
    /// targets of `cross_boundary_api` edges, and environment-variable
    /// usage sites.
    fn entry_nodes(&self) -> Result<Vec<String>, StoreError> {
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut entries: Vec<String> = Vec::new();

        let mut patterns: Vec<&'static str> = Vec::new();
        for lang in self.registry.languages() {
            for p in self.registry.source_patterns(lang) {
                if !patterns.contains(&p) {
                    patterns.push(p);
                }
            }
        }
        for pattern in patterns {
            for node_id in self.graph.nodes_matching_pattern(pattern)? {
                if seen.insert(node_id.clone()) {
                    entries.push(node_id);
                }
            }
        }

        for target in self.graph.cross_boundary_targets()? {
            if seen.insert(target.clone()) {
                entries.push(target);
            }
        }

        for (file, _line, var_name, in_function) in queries::env_var_usages(self.repo)? {
            let function = if in_function.is_empty() { "global".to_string() } else { in_function };
            let node_id = format!("{file}::{function}::{var_name}");
            if self.graph.node_exists(&node_id)? && seen.insert(node_id.clone()) {
                entries.push(node_id);
            }
        }

        Ok(entries)
    }

    /// Exit points: data leaving the system through persistence,
    /// query execution, HTTP responses, or outbound calls.
    fn exit_nodes(&self) -> Result<FxHashSet<String>, StoreError> {
        let mut exits: FxHashSet<String> = FxHashSet::default();

        let groups: &[(&[&str], &[&str])] = &[
            (
                &[
                    "%.create%",
                    "%.update%",
                    "%.delete%",
                    "%.findOne%",
                    "%.findMany%",
                    "%.save%",
                    "%.destroy%",
                    "%.upsert%",
                    "prisma.%",
                    "sequelize.query%",
                ],
                &["%test%", "%node_modules%"],
            ),
            (
                &["%.query", "%.execute", "%.exec", "%.run"],
                &["%test%", "%migration%", "%node_modules%"],
            ),
            (
                &["res.send", "res.json", "res.render", "res.write", "res.status", "res.end"],
                &["%test%", "%node_modules%"],
            ),
            (
                &[
                    "axios.post",
                    "axios.get",
                    "fetch",
                    "request",
                    "fs.writeFile",
                    "fs.writeFileSync",
                    "fs.appendFile",
                    "console.log",
                    "console.error",
                    "logger.info",
                ],
                &["%test%", "%node_modules%"],
            ),
        ];

        for &(callee_likes, exclude_likes) in groups {
            for row in queries::exit_candidate_args(self.repo, callee_likes, exclude_likes)? {
                let Some(var_name) = super::ifds::parse_argument_variable(&row.argument_expr)
                else {
                    continue;
                };
                let node_id = format!("{}::{}::{var_name}", row.file, row.caller_function);
                if self.graph.node_exists(&node_id)? {
                    exits.insert(node_id);
                }

                // Response sinks also terminate at raw request fields
                // passed straight through.
                if row.callee_function.starts_with("res.") {
                    for req_field in ["req", "req.body", "req.params", "req.query"] {
                        if row.argument_expr.contains(req_field) {
                            let alt =
                                format!("{}::{}::{req_field}", row.file, row.caller_function);
                            if self.graph.node_exists(&alt)? {
                                exits.insert(alt);
                            }
                        }
                    }
                }
            }
        }

        Ok(exits)
    }

    /// DFS from one entry with adaptive throttling.
    fn trace_from_entry(
        &mut self,
        entry_id: &str,
        exit_nodes: &FxHashSet<String>,
    ) -> Result<(), StoreError> {
        let parts: Vec<&str> = entry_id.split("::").collect();
        let file_path = parts.first().map(|s| s.to_lowercase()).unwrap_or_default();
        let var_name = parts.last().copied().unwrap_or("");

        let is_all_caps = var_name.len() > 1
            && var_name.chars().any(|c| c.is_ascii_uppercase())
            && !var_name.chars().any(|c| c.is_ascii_lowercase());
        let is_infrastructure = file_path.contains("config")
            || file_path.contains("env")
            || is_all_caps
            || var_name.contains("process.env");

        let (max_effort, max_visits) = if is_infrastructure {
            (INFRASTRUCTURE_MAX_EFFORT, INFRASTRUCTURE_MAX_VISITS)
        } else {
            (USERCODE_MAX_EFFORT, USERCODE_MAX_VISITS)
        };

        let mut worklist: Vec<(String, Vec<String>)> =
            vec![(entry_id.to_string(), vec![entry_id.to_string()])];
        let mut visited_edges: FxHashSet<(String, String)> = FxHashSet::default();
        let mut node_visit_counts: FxHashMap<String, usize> = FxHashMap::default();

        let mut flows_from_this_entry = 0usize;
        let mut effort = 0usize;

        while let Some((current_id, path)) = {
            if self.flows_resolved >= MAX_FLOWS || flows_from_this_entry >= MAX_FLOWS_PER_ENTRY {
                None
            } else {
                worklist.pop()
            }
        } {
            effort += 1;
            if effort > max_effort {
                debug!(entry_id, effort, "effort budget exhausted");
                break;
            }

            if path.len() > MAX_DEPTH {
                self.record_flow(entry_id, &current_id, &path, "VULNERABLE", None)?;
                continue;
            }

            if exit_nodes.contains(&current_id) {
                let sanitizer = self.sanitizers.scan_node_path(&path);
                let status = if sanitizer.is_some() { "SANITIZED" } else { "VULNERABLE" };
                self.record_flow(entry_id, &current_id, &path, status, sanitizer)?;
                flows_from_this_entry += 1;
            }

            for successor_id in self.graph.successors(&current_id)?.iter() {
                let edge = (current_id.clone(), successor_id.clone());
                if visited_edges.contains(&edge) {
                    continue;
                }
                let visits = node_visit_counts.entry(successor_id.clone()).or_insert(0);
                if *visits >= max_visits {
                    continue;
                }
                *visits += 1;
                visited_edges.insert(edge);

                let mut new_path = path.clone();
                new_path.push(successor_id.clone());
                worklist.push((successor_id.clone(), new_path));
            }
        }
        Ok(())
    }

    /// Record a resolved flow with semantic deduplication: one row per
    /// `(source, sink, status, sanitizer)` signature, shortest path wins.
    fn record_flow(
        &mut self,
        source: &str,
        sink: &str,
        path: &[String],
        status: &'static str,
        sanitizer: Option<SanitizerMatch>,
    ) -> Result<(), StoreError> {
        if source == sink || path.len() < 2 {
            return Ok(());
        }

        let source_parts: Vec<&str> = source.split("::").collect();
        let source_file = source_parts.first().copied().unwrap_or("").to_string();
        let source_pattern = if source_parts.len() > 2 {
            source_parts[2..].join("::")
        } else {
            source.to_string()
        };

        let sink_parts: Vec<&str> = sink.split("::").collect();
        let sink_file = sink_parts.first().copied().unwrap_or("").to_string();
        let sink_function = sink_parts.get(1).copied().unwrap_or("global");
        let sink_pattern = if sink_parts.len() > 2 {
            sink_parts[2..].join("::")
        } else {
            sink.to_string()
        };

        let sanitizer_method = sanitizer.as_ref().map(|s| s.method.clone());
        // Lengths are hop counts throughout (cache, DB, inserted row).
        let current_length = path.len() - 1;

        let signature: FlowSignature = (
            source_file.clone(),
            source_pattern.clone(),
            sink_file.clone(),
            sink_pattern.clone(),
            status,
            sanitizer_method.clone(),
        );
        if let Some(&best) = self.best_paths.get(&signature) {
            if best <= current_length {
                return Ok(());
            }
        }
        self.best_paths.insert(signature, current_length);

        // A longer path for the same signature may already be persisted;
        // replace it.
        let existing: Option<(i64, i64)> = {
            let mut stmt = self
                .repo
                .prepare_cached(
                    "SELECT id, path_length FROM resolved_flow_audit
                     WHERE source_file = ?1 AND source_pattern = ?2
                       AND sink_file = ?3 AND sink_pattern = ?4
                       AND status = ?5
                       AND (sanitizer_method = ?6 OR (sanitizer_method IS NULL AND ?6 IS NULL))
                       AND engine = 'FlowResolver'
                     LIMIT 1",
                )
                .map_err(StoreError::sqlite)?;
            stmt.query_row(
                rusqlite::params![
                    source_file,
                    source_pattern,
                    sink_file,
                    sink_pattern,
                    status,
                    sanitizer_method
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::sqlite(other)),
            })?
        };

        if let Some((existing_id, existing_length)) = existing {
            if existing_length as usize <= current_length {
                return Ok(());
            }
            self.repo
                .execute(
                    "DELETE FROM resolved_flow_audit WHERE id = ?1",
                    rusqlite::params![existing_id],
                )
                .map_err(StoreError::sqlite)?;
        }

        let source_line = queries::min_source_line(self.repo, &source_file, &source_pattern)?;
        let sink_line =
            queries::min_sink_line(self.repo, &sink_file, &sink_pattern, sink_function)?;

        let mut hop_chain = Vec::with_capacity(path.len().saturating_sub(1));
        for (i, window) in path.windows(2).enumerate() {
            let edge_type = self.graph.edge_type(&window[0], &window[1])?;
            hop_chain.push(serde_json::json!({
                "from": window[0],
                "to": window[1],
                "hop_number": i,
                "type": edge_type.as_ref(),
            }));
        }
        let path_json = serde_json::Value::Array(hop_chain).to_string();

        let vulnerability_type = classify_vulnerability(&sink_pattern, Some(&source_pattern));

        let mut stmt = self
            .repo
            .prepare_cached(
                "INSERT INTO resolved_flow_audit (
                     source_file, source_line, source_pattern,
                     sink_file, sink_line, sink_pattern,
                     vulnerability_type, path_length, hops, path_json, flow_sensitive,
                     status, sanitizer_file, sanitizer_line, sanitizer_method, engine
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, ?11, ?12, ?13, ?14,
                           'FlowResolver')",
            )
            .map_err(StoreError::sqlite)?;
        stmt.execute(rusqlite::params![
            source_file,
            source_line,
            source_pattern,
            sink_file,
            sink_line,
            sink_pattern,
            vulnerability_type,
            current_length as i64,
            current_length as i64,
            path_json,
            status,
            sanitizer.as_ref().map(|s| s.file.clone()),
            sanitizer.as_ref().map(|s| s.line),
            sanitizer_method,
        ])
        .map_err(StoreError::sqlite)?;

        self.flows_resolved += 1;
        if self.flows_resolved % 1000 == 0 {
            debug!(flows = self.flows_resolved, "recorded semantic flows");
        }
        Ok(())
    }
}
