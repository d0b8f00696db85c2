//! End-to-end pipeline: index → build graphs → taint analysis.
//!
//! The indexer and graph builder populate `.pf/repo_index.db` and
//! `.pf/graphs.db`; the taint phase then discovers sinks and sources
//! from the relational model and runs both engines.

use std::path::Path;

use rusqlite::Connection;
use seep_core::config::SeepConfig;
use seep_core::errors::{IndexError, StoreError};
use seep_core::FxHashSet;
use seep_storage::queries;
use seep_storage::GraphStore;
use tracing::info;

use crate::graph::{build_graphs, GraphStats};
use crate::indexer::{IndexOutcome, Indexer};
use crate::taint::{FlowEndpoint, FlowResolver, IfdsAnalyzer, TaintPath, TaintRegistry};

/// Findings from a full analysis run.
#[derive(Debug, Default)]
pub struct TaintReport {
    pub vulnerable: Vec<TaintPath>,
    pub sanitized: Vec<TaintPath>,
    pub flows_resolved: usize,
}

/// Outcome of the whole pipeline.
pub struct PipelineOutcome {
    pub index: IndexOutcome,
    pub graph: GraphStats,
    pub taint: TaintReport,
}

/// Run the complete pipeline over a project root.
pub fn run(root: &Path, config: &SeepConfig) -> Result<PipelineOutcome, IndexError> {
    let indexer = Indexer::new(root, config.clone());
    let index = indexer.index()?;

    let repo = seep_storage::database::open(&indexer.repo_db_path()).map_err(IndexError::Store)?;
    let graph = GraphStore::create(&indexer.graph_db_path()).map_err(IndexError::Store)?;
    let graph_stats = build_graphs(&repo, &graph).map_err(IndexError::Store)?;

    let taint = analyze_taint(&repo, &graph, config).map_err(IndexError::Store)?;

    Ok(PipelineOutcome { index, graph: graph_stats, taint })
}

/// Run both taint engines over already-built databases.
pub fn analyze_taint(
    repo: &Connection,
    graph: &GraphStore,
    config: &SeepConfig,
) -> Result<TaintReport, StoreError> {
    let registry = TaintRegistry::with_defaults();
    let sources = discover_sources(repo, &registry)?;
    let sinks = discover_sinks(repo)?;
    info!(sources = sources.len(), sinks = sinks.len(), "taint discovery");

    let mut report = TaintReport::default();

    let analyzer = IfdsAnalyzer::new(repo, graph, &registry, &config.taint)?;
    for sink in &sinks {
        let (vulnerable, sanitized) = analyzer.analyze_sink_to_sources(sink, &sources)?;
        report.vulnerable.extend(vulnerable);
        report.sanitized.extend(sanitized);
    }

    let mut resolver = FlowResolver::new(repo, graph, &registry)?;
    report.flows_resolved = resolver.resolve_all_flows()?;

    info!(
        vulnerable = report.vulnerable.len(),
        sanitized = report.sanitized.len(),
        flows = report.flows_resolved,
        "taint analysis complete"
    );
    Ok(report)
}

/// Sources: assignment right-hand sides matching a registry source
/// pattern.
pub fn discover_sources(
    repo: &Connection,
    registry: &TaintRegistry,
) -> Result<Vec<FlowEndpoint>, StoreError> {
    let mut stmt = repo
        .prepare_cached(
            "SELECT DISTINCT file, line, source_var_name FROM assignment_sources
             ORDER BY file, line, source_var_name",
        )
        .map_err(StoreError::sqlite)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .map_err(StoreError::sqlite)?;

    let mut sources = Vec::new();
    for row in rows {
        let (file, line, var) = row.map_err(StoreError::sqlite)?;
        let language = crate::scanner::language::taint_language(&file);
        let patterns = registry.source_patterns(language);
        if patterns.iter().any(|p| var.starts_with(p) || var == *p) {
            sources.push(FlowEndpoint::new(&file, line, &var, &var));
        }
    }
    Ok(sources)
}

/// Sinks: call sites whose callee matches a dangerous-sink shape.
pub fn discover_sinks(repo: &Connection) -> Result<Vec<FlowEndpoint>, StoreError> {
    const SINK_LIKES: &[&str] = &[
        "%.query%",
        "%.execute%",
        "%.exec%",
        "%raw%",
        "res.send",
        "res.render",
        "res.write",
        "res.redirect",
        "%.spawn%",
        "%system%",
        "%popen%",
        "eval",
        "%.writeFile%",
        "%.readFile%",
        "%sendFile%",
        "%innerHTML%",
    ];
    const EXCLUDES: &[&str] = &["%test%", "%node_modules%"];

    let rows = queries::exit_candidate_args(repo, SINK_LIKES, EXCLUDES)?;
    let mut seen: FxHashSet<(String, i64, String)> = FxHashSet::default();
    let mut sinks = Vec::new();
    for row in rows {
        // Only variable arguments can carry taint into the sink; the
        // traced expression rides in `name`, the sink pattern in
        // `pattern`.
        let Some(arg_var) = crate::taint::ifds::parse_argument_variable(&row.argument_expr)
        else {
            continue;
        };
        let key = (row.file.clone(), row.line, arg_var.clone());
        if !seen.insert(key) {
            continue;
        }
        sinks.push(FlowEndpoint::new(&row.file, row.line, &arg_var, &row.callee_function));
    }
    Ok(sinks)
}
