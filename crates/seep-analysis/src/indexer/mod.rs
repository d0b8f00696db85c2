//! Indexer orchestrator: walks the tree, dispatches extractors, stores
//! facts through the batched writer, reconciles fidelity manifests, and
//! runs post-resolution plus the second JSX pass.

pub mod postresolve;

use std::collections::BTreeMap;
use std::path::PathBuf;

use rayon::prelude::*;
use seep_core::config::SeepConfig;
use seep_core::errors::{ExtractError, IndexError, StoreError};
use seep_core::{schema, FxHashMap};
use seep_storage::batch::{Pass, RepoStore};
use seep_storage::database;
use tracing::{debug, info, warn};

use crate::extractors::bash::BashExtractor;
use crate::extractors::docker::DockerExtractor;
use crate::extractors::generic::GenericConfigExtractor;
use crate::extractors::javascript::{JsBuildGuard, JsExtractorClient, JsxMode};
use crate::extractors::python::PythonExtractor;
use crate::extractors::sql::SqlExtractor;
use crate::extractors::yaml::YamlExtractor;
use crate::extractors::{ExtractedFacts, Extractor, FileInfo};
use crate::scanner::hasher::{count_loc, sha256_hex};
use crate::scanner::walker::{walk_directory, DiscoveredFile};
use crate::scanner::Language;
use crate::taint::registry;

use postresolve::PostResolveReport;

const JS_BATCH_SIZE: usize = 50;

/// A per-file extraction failure: recorded, never fatal.
#[derive(Debug, Clone)]
pub struct ExtractionFailure {
    pub file: String,
    pub message: String,
}

/// Aggregate result of an indexing run.
#[derive(Debug, Default)]
pub struct IndexOutcome {
    pub files_indexed: usize,
    pub counts: BTreeMap<String, usize>,
    pub failures: Vec<ExtractionFailure>,
    pub postresolve: PostResolveReport,
}

/// The orchestrator. Owns paths and configuration; the stores are
/// created fresh per run.
pub struct Indexer {
    root: PathBuf,
    config: SeepConfig,
    js_project: Option<PathBuf>,
}

impl Indexer {
    pub fn new(root: impl Into<PathBuf>, config: SeepConfig) -> Self {
        Self { root: root.into(), config, js_project: None }
    }

    /// Point at the JS/TS extractor project tree (enables the
    /// out-of-process extractor and its build guard).
    pub fn with_js_project(mut self, project: impl Into<PathBuf>) -> Self {
        self.js_project = Some(project.into());
        self
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(".pf")
    }

    pub fn repo_db_path(&self) -> PathBuf {
        self.output_dir().join("repo_index.db")
    }

    pub fn graph_db_path(&self) -> PathBuf {
        self.output_dir().join("graphs.db")
    }

    fn ast_cache_dir(&self) -> PathBuf {
        self.output_dir().join(".cache").join("ast")
    }

    /// Run the complete indexing process.
    pub fn index(&self) -> Result<IndexOutcome, IndexError> {
        std::fs::create_dir_all(self.output_dir())
            .map_err(|e| IndexError::io(self.output_dir().display().to_string(), &e))?;

        // Gate 1: schema stamp. A leftover database from a different
        // registry version refuses to run before any extractor starts.
        let repo_db = self.repo_db_path();
        if repo_db.exists() {
            match database::open(&repo_db) {
                Ok(_) => {}
                Err(StoreError::Schema(e)) => return Err(IndexError::Schema(e)),
                Err(e) => return Err(IndexError::Store(e)),
            }
        }

        // Gate 2: extractor build signature.
        let js_client = match &self.js_project {
            Some(project) => {
                let guard = JsBuildGuard::new(project);
                if guard.ensure_up_to_date().map_err(IndexError::Extract)? {
                    return Err(IndexError::Extract(ExtractError::BuildOutOfDate));
                }
                Some(JsExtractorClient::new(guard.artifact_path(), self.ast_cache_dir()))
            }
            None => None,
        };

        let mut store =
            RepoStore::create(&repo_db, &self.config.store).map_err(IndexError::Store)?;
        seed_framework_patterns(&mut store).map_err(IndexError::Store)?;

        let files = walk_directory(&self.root, &self.config.scan);
        info!(files = files.len(), root = %self.root.display(), "indexing");

        let mut outcome = IndexOutcome::default();
        let mut contents: FxHashMap<String, String> = FxHashMap::default();
        let mut indexable: Vec<DiscoveredFile> = Vec::new();

        for file in files {
            if file.language.is_none() {
                continue;
            }
            let absolute = self.root.join(&file.path);
            match std::fs::read_to_string(&absolute) {
                Ok(content) => {
                    store
                        .add_file(
                            &file.path,
                            &sha256_hex(content.as_bytes()),
                            &file.ext,
                            file.bytes as i64,
                            count_loc(&content),
                        )
                        .map_err(IndexError::Store)?;
                    contents.insert(file.path.clone(), content);
                    indexable.push(file);
                }
                Err(e) => {
                    // A single unreadable source file is a finding, not
                    // a fatal error.
                    warn!(file = %file.path, error = %e, "skipping unreadable file");
                    outcome.failures.push(ExtractionFailure {
                        file: file.path.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        // JS/TS files go through the subprocess in batches, cached by
        // content hash.
        let js_files: Vec<(String, String)> = indexable
            .iter()
            .filter(|f| f.language.is_some_and(Language::is_js_family))
            .map(|f| (f.path.clone(), contents[&f.path].clone()))
            .collect();
        let mut js_facts: FxHashMap<String, ExtractedFacts> = FxHashMap::default();
        if let Some(client) = &js_client {
            for batch in js_files.chunks(JS_BATCH_SIZE) {
                let results = client
                    .extract_batch(&self.root, batch, JsxMode::Transform)
                    .map_err(IndexError::Extract)?;
                js_facts.extend(results);
            }
        }

        // In-process extraction parses in parallel; store writes stay in
        // walk (sorted) order.
        let extractors = ExtractorSet::new();
        let native_results: Vec<(String, Result<ExtractedFacts, ExtractError>)> = indexable
            .par_iter()
            .filter(|f| !f.language.is_some_and(Language::is_js_family))
            .map(|f| {
                let info = FileInfo {
                    path: f.path.clone(),
                    ext: f.ext.clone(),
                    bytes: f.bytes,
                };
                let result = extractors.extract(f.language, &info, &contents[&f.path]);
                (f.path.clone(), result)
            })
            .collect();
        let mut native_facts: FxHashMap<String, Result<ExtractedFacts, ExtractError>> =
            native_results.into_iter().collect();

        for file in &indexable {
            let facts = if file.language.is_some_and(Language::is_js_family) {
                match js_facts.remove(&file.path) {
                    Some(facts) => facts,
                    None => continue,
                }
            } else {
                match native_facts.remove(&file.path) {
                    Some(Ok(facts)) => facts,
                    Some(Err(ExtractError::ParseFailed { file: path, message })) => {
                        debug!(file = %path, "extraction failure recorded");
                        outcome.failures.push(ExtractionFailure { file: path, message });
                        continue;
                    }
                    Some(Err(other)) => return Err(IndexError::Extract(other)),
                    None => continue,
                }
            };
            self.store_with_fidelity(&mut store, &file.path, &facts, Pass::Transform)?;
            outcome.files_indexed += 1;
        }

        store.flush().map_err(IndexError::Store)?;
        outcome.postresolve =
            postresolve::run_all(store.conn()).map_err(IndexError::Store)?;

        // Second pass: JSX-preserved extraction into the parallel
        // tables.
        if let Some(client) = &js_client {
            let jsx_files: Vec<(String, String)> = js_files
                .iter()
                .filter(|(path, _)| Language::has_jsx_pass(path))
                .cloned()
                .collect();
            for batch in jsx_files.chunks(JS_BATCH_SIZE) {
                let results = client
                    .extract_batch(&self.root, batch, JsxMode::Preserved)
                    .map_err(IndexError::Extract)?;
                for (path, facts) in sorted_by_key(results) {
                    self.store_with_fidelity(&mut store, &path, &facts, Pass::Preserved)?;
                }
            }
        }

        store.flush().map_err(IndexError::Store)?;
        for (table, count) in store.receipts() {
            outcome.counts.insert((*table).to_string(), *count);
        }
        self.write_manifest(&outcome)?;
        Ok(outcome)
    }

    /// Store one file's facts and reconcile the fidelity manifest
    /// against the writer's receipts. Any divergence is fatal.
    fn store_with_fidelity(
        &self,
        store: &mut RepoStore,
        path: &str,
        facts: &ExtractedFacts,
        pass: Pass,
    ) -> Result<(), IndexError> {
        let before = store.receipts().clone();
        store_facts(store, path, facts, pass).map_err(IndexError::Store)?;

        let manifest = facts.manifest(pass == Pass::Preserved);
        for (table, expected) in &manifest {
            let actual = store.receipts().get(table).copied().unwrap_or(0)
                - before.get(table).copied().unwrap_or(0);
            if actual != *expected {
                return Err(IndexError::FidelityMismatch {
                    file: path.to_string(),
                    record_kind: (*table).to_string(),
                    expected: *expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    fn write_manifest(&self, outcome: &IndexOutcome) -> Result<(), IndexError> {
        let manifest = serde_json::json!({
            "schema_hash": schema::schema_hash(),
            "files_indexed": outcome.files_indexed,
            "tables": outcome.counts,
            "extraction_failures": outcome
                .failures
                .iter()
                .map(|f| serde_json::json!({ "file": f.file, "message": f.message }))
                .collect::<Vec<_>>(),
            "ambiguous_resolutions": outcome.postresolve.ambiguous,
        });
        let path = self.output_dir().join("manifest.json");
        std::fs::write(&path, serde_json::to_vec_pretty(&manifest).unwrap_or_default())
            .map_err(|e| IndexError::io(path.display().to_string(), &e))
    }
}

fn sorted_by_key(map: FxHashMap<String, ExtractedFacts>) -> Vec<(String, ExtractedFacts)> {
    let mut entries: Vec<(String, ExtractedFacts)> = map.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

struct ExtractorSet {
    python: PythonExtractor,
    bash: BashExtractor,
    docker: DockerExtractor,
    yaml: YamlExtractor,
    sql: SqlExtractor,
    generic: GenericConfigExtractor,
}

impl ExtractorSet {
    fn new() -> Self {
        Self {
            python: PythonExtractor::new(),
            bash: BashExtractor::new(),
            docker: DockerExtractor,
            yaml: YamlExtractor,
            sql: SqlExtractor,
            generic: GenericConfigExtractor,
        }
    }

    fn extract(
        &self,
        language: Option<Language>,
        info: &FileInfo,
        content: &str,
    ) -> Result<ExtractedFacts, ExtractError> {
        let extractor: &dyn Extractor = match language {
            Some(Language::Python) => &self.python,
            Some(Language::Bash) => &self.bash,
            Some(Language::Dockerfile) => &self.docker,
            Some(Language::Yaml) => &self.yaml,
            Some(Language::Sql) => &self.sql,
            Some(Language::Config) => &self.generic,
            _ => return Ok(ExtractedFacts::default()),
        };
        extractor.extract(info, content)
    }
}

/// Map one file's facts onto the relational store. The preserved pass
/// writes only the `*_jsx` parallel tables.
fn store_facts(
    store: &mut RepoStore,
    path: &str,
    facts: &ExtractedFacts,
    pass: Pass,
) -> Result<(), StoreError> {
    if pass == Pass::Transform {
        for r in &facts.refs {
            store.add_ref(path, &r.kind, &r.value, r.line)?;
        }
        for import in &facts.imports {
            store.add_import_style(
                path,
                import.line,
                &import.package,
                &import.style,
                import.names.as_deref(),
                import.alias.as_deref(),
            )?;
            for specifier in &import.specifiers {
                store.add_import_specifier(path, import.line, specifier)?;
            }
        }
    }

    for symbol in &facts.symbols {
        store.add_symbol(
            pass,
            path,
            &symbol.name,
            &symbol.kind,
            symbol.line,
            symbol.col,
            symbol.end_line,
            symbol.type_annotation.as_deref(),
            symbol.parameters_json.as_deref(),
        )?;
    }

    for assignment in &facts.assignments {
        store.add_assignment(
            pass,
            path,
            assignment.line,
            &assignment.target_var,
            &assignment.source_expr,
            &assignment.in_function,
            assignment.property_path.as_deref(),
        )?;
        if pass == Pass::Transform {
            for source_var in &assignment.source_vars {
                store.add_assignment_source(
                    path,
                    assignment.line,
                    &assignment.target_var,
                    source_var,
                )?;
            }
        }
    }

    for call in &facts.function_calls {
        store.add_function_call_arg(
            pass,
            path,
            call.line,
            &call.caller_function,
            &call.callee_function,
            call.argument_index,
            &call.argument_expr,
            &call.param_name,
            call.callee_file_path.as_deref(),
        )?;
    }

    for ret in &facts.returns {
        store.add_function_return(pass, path, ret.line, &ret.function_name, &ret.return_expr)?;
        if pass == Pass::Transform {
            for source_var in &ret.source_vars {
                store.add_function_return_source(
                    path,
                    ret.line,
                    &ret.function_name,
                    source_var,
                )?;
            }
        }
    }

    // CFG blocks get temp ids; edges and statements reference them and
    // are translated at flush.
    let mut block_ids: Vec<i64> = Vec::with_capacity(facts.cfg_blocks.len());
    for block in &facts.cfg_blocks {
        let temp_id = store.add_cfg_block(
            pass,
            path,
            &block.function_name,
            &block.block_type,
            block.start_line,
            block.end_line,
            block.condition_expr.as_deref(),
        )?;
        block_ids.push(temp_id);
        for statement in &block.statements {
            store.add_cfg_statement(
                pass,
                temp_id,
                &statement.statement_type,
                statement.line,
                statement.statement_text.as_deref(),
            )?;
        }
    }
    for edge in &facts.cfg_edges {
        let (Some(&source), Some(&target)) =
            (block_ids.get(edge.source_index), block_ids.get(edge.target_index))
        else {
            continue;
        };
        store.add_cfg_edge(pass, source, target, &edge.edge_type)?;
    }

    if pass == Pass::Preserved {
        return Ok(());
    }

    for endpoint in &facts.api_endpoints {
        store.add_api_endpoint(
            path,
            endpoint.line,
            &endpoint.method,
            &endpoint.pattern,
            &endpoint.path,
            None,
            endpoint.has_auth,
            &endpoint.handler_function,
        )?;
        for control in &endpoint.controls {
            store.add_api_endpoint_control(path, endpoint.line, control)?;
        }
    }

    for mount in &facts.router_mounts {
        store.add_router_mount(
            path,
            mount.line,
            &mount.mount_path_expr,
            &mount.router_variable,
            mount.is_literal,
        )?;
    }

    for entry in &facts.middleware_chains {
        store.add_middleware_chain_entry(
            path,
            entry.route_line,
            &entry.route_path,
            &entry.route_method,
            entry.execution_order,
            &entry.handler_expr,
            &entry.handler_type,
            entry.handler_function.as_deref(),
            entry.handler_file.as_deref(),
        )?;
    }

    for usage in &facts.validation_usages {
        store.add_validation_usage(
            path,
            usage.line,
            &usage.framework,
            &usage.method,
            &usage.argument_expr,
            usage.is_validator,
            usage.variable_name.as_deref(),
        )?;
    }

    for query in &facts.sql_queries {
        store.add_sql_query(
            path,
            query.line,
            &query.query_text,
            &query.command,
            &query.extraction_source,
        )?;
        for table in &query.tables {
            store.add_sql_query_table(path, query.line, table)?;
        }
    }
    for object in &facts.sql_objects {
        store.add_sql_object(path, &object.kind, &object.name)?;
    }

    for env in &facts.env_usages {
        store.add_env_var_usage(path, env.line, &env.var_name, &env.in_function, &env.access_method)?;
    }

    for literal in &facts.object_literals {
        store.add_object_literal(
            path,
            literal.line,
            &literal.variable_name,
            &literal.property_name,
            &literal.property_value,
            &literal.property_type,
            &literal.in_function,
        )?;
    }

    for usage in &facts.variable_usages {
        store.add_variable_usage(
            path,
            usage.line,
            &usage.variable_name,
            &usage.usage_type,
            &usage.in_function,
        )?;
    }

    for call in &facts.frontend_api_calls {
        store.add_frontend_api_call(
            path,
            call.line,
            &call.method,
            &call.url_pattern,
            call.body_var.as_deref(),
            &call.in_function,
        )?;
    }

    if let Some(config) = &facts.config_file {
        store.add_config_file(path, &config.content, &config.file_type, config.context_dir.as_deref())?;
    }

    Ok(())
}

/// Seed the per-framework taint patterns and safe sinks the engines
/// read back from the store.
fn seed_framework_patterns(store: &mut RepoStore) -> Result<(), StoreError> {
    let frameworks: &[(&str, &str, _)] = &[
        ("express", "javascript", registry::express_patterns()),
        ("flask", "python", registry::flask_patterns()),
        ("django", "python", registry::django_patterns()),
    ];
    for (id, language, (patterns, safe_sinks)) in frameworks {
        store.add_framework(id, language, "")?;
        for (pattern, direction, category) in *patterns {
            store.add_framework_taint_pattern(id, pattern, direction, category)?;
        }
        for (sink_pattern, sink_type, reason) in *safe_sinks {
            store.add_framework_safe_sink(id, sink_pattern, sink_type, true, reason)?;
        }
    }
    Ok(())
}
