//! Language extractors: per-language AST → normalized facts.
//!
//! Every extractor implements the same two-operation interface and emits
//! `ExtractedFacts`. Extractors never see repo-relative paths (the
//! orchestrator assigns them when storing) and never raise across the
//! boundary for a malformed file; parse failures are recorded findings.
//!
//! Extractors are AST-based; regex is permitted only for plain-text
//! configuration formats that have no AST.

pub mod bash;
pub mod docker;
pub mod generic;
pub mod javascript;
pub mod python;
pub mod sql;
pub mod yaml;

use std::collections::BTreeMap;

use seep_core::errors::ExtractError;
use serde::{Deserialize, Serialize};

/// File identity handed to an extractor. The path is informational for
/// error messages; extractors must not derive facts from it.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: String,
    pub ext: String,
    pub bytes: u64,
}

/// Per-key record counts reconciled against store receipts.
pub type FidelityManifest = BTreeMap<&'static str, usize>;

/// The uniform extractor interface.
pub trait Extractor {
    fn supported_extensions(&self) -> &'static [&'static str];
    fn extract(&self, file: &FileInfo, content: &str) -> Result<ExtractedFacts, ExtractError>;
}

// ─── Fact records ───────────────────────────────────────────────────────
// Shapes mirror the relational model; the orchestrator maps each fact
// group onto its table(s) mechanically.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefFact {
    pub kind: String,
    pub value: String,
    pub line: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportStyleFact {
    pub line: i64,
    pub package: String,
    pub style: String,
    pub names: Option<String>,
    pub alias: Option<String>,
    #[serde(default)]
    pub specifiers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolFact {
    pub name: String,
    pub kind: String,
    pub line: i64,
    pub col: i64,
    pub end_line: Option<i64>,
    pub type_annotation: Option<String>,
    /// Ordered `[{"name": …}, …]` array, exactly as declared.
    pub parameters_json: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignmentFact {
    pub line: i64,
    pub target_var: String,
    pub source_expr: String,
    pub in_function: String,
    pub property_path: Option<String>,
    /// Every variable referenced by `source_expr`.
    #[serde(default)]
    pub source_vars: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallArgFact {
    pub line: i64,
    pub caller_function: String,
    pub callee_function: String,
    pub argument_index: i64,
    pub argument_expr: String,
    pub param_name: String,
    pub callee_file_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReturnFact {
    pub line: i64,
    pub function_name: String,
    pub return_expr: String,
    #[serde(default)]
    pub source_vars: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CfgStatementFact {
    pub statement_type: String,
    pub line: i64,
    pub statement_text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CfgBlockFact {
    pub function_name: String,
    pub block_type: String,
    pub start_line: i64,
    pub end_line: i64,
    pub condition_expr: Option<String>,
    #[serde(default)]
    pub statements: Vec<CfgStatementFact>,
}

/// Edge between blocks by index into the facts' block vector; the
/// orchestrator translates indices through the store's temp ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CfgEdgeFact {
    pub source_index: usize,
    pub target_index: usize,
    pub edge_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointFact {
    pub line: i64,
    pub method: String,
    pub pattern: String,
    pub path: String,
    pub has_auth: bool,
    pub handler_function: String,
    #[serde(default)]
    pub controls: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterMountFact {
    pub line: i64,
    pub mount_path_expr: String,
    pub router_variable: String,
    pub is_literal: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MiddlewareEntryFact {
    pub route_line: i64,
    pub route_path: String,
    pub route_method: String,
    pub execution_order: i64,
    pub handler_expr: String,
    pub handler_type: String,
    pub handler_function: Option<String>,
    pub handler_file: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationFact {
    pub line: i64,
    pub framework: String,
    pub method: String,
    pub argument_expr: String,
    pub is_validator: bool,
    pub variable_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqlQueryFact {
    pub line: i64,
    pub query_text: String,
    pub command: String,
    pub extraction_source: String,
    #[serde(default)]
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqlObjectFact {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvUsageFact {
    pub line: i64,
    pub var_name: String,
    pub in_function: String,
    pub access_method: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectLiteralFact {
    pub line: i64,
    pub variable_name: String,
    pub property_name: String,
    pub property_value: String,
    pub property_type: String,
    pub in_function: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableUsageFact {
    pub line: i64,
    pub variable_name: String,
    pub usage_type: String,
    pub in_function: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrontendApiCallFact {
    pub line: i64,
    pub method: String,
    pub url_pattern: String,
    pub body_var: Option<String>,
    pub in_function: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFileFact {
    pub content: String,
    pub file_type: String,
    pub context_dir: Option<String>,
}

/// Everything one extraction pass emits for one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedFacts {
    #[serde(default)]
    pub refs: Vec<RefFact>,
    #[serde(default)]
    pub imports: Vec<ImportStyleFact>,
    #[serde(default)]
    pub symbols: Vec<SymbolFact>,
    #[serde(default)]
    pub assignments: Vec<AssignmentFact>,
    #[serde(default)]
    pub function_calls: Vec<CallArgFact>,
    #[serde(default)]
    pub returns: Vec<ReturnFact>,
    #[serde(default)]
    pub cfg_blocks: Vec<CfgBlockFact>,
    #[serde(default)]
    pub cfg_edges: Vec<CfgEdgeFact>,
    #[serde(default)]
    pub api_endpoints: Vec<EndpointFact>,
    #[serde(default)]
    pub router_mounts: Vec<RouterMountFact>,
    #[serde(default)]
    pub middleware_chains: Vec<MiddlewareEntryFact>,
    #[serde(default)]
    pub validation_usages: Vec<ValidationFact>,
    #[serde(default)]
    pub sql_queries: Vec<SqlQueryFact>,
    #[serde(default)]
    pub sql_objects: Vec<SqlObjectFact>,
    #[serde(default)]
    pub env_usages: Vec<EnvUsageFact>,
    #[serde(default)]
    pub object_literals: Vec<ObjectLiteralFact>,
    #[serde(default)]
    pub variable_usages: Vec<VariableUsageFact>,
    #[serde(default)]
    pub frontend_api_calls: Vec<FrontendApiCallFact>,
    #[serde(default)]
    pub config_file: Option<ConfigFileFact>,
}

impl ExtractedFacts {
    /// Count every record this pass will commit, keyed by target table.
    /// The orchestrator reconciles these counts against store receipts
    /// and hard-fails on mismatch.
    ///
    /// The preserved (JSX) pass writes only the parallel `*_jsx` tables;
    /// everything else was already committed by the transform pass.
    pub fn manifest(&self, jsx_pass: bool) -> FidelityManifest {
        let mut m = FidelityManifest::new();
        let mut add = |key: &'static str, count: usize| {
            if count > 0 {
                m.insert(key, count);
            }
        };

        if jsx_pass {
            add("symbols_jsx", self.symbols.len());
            add("assignments_jsx", self.assignments.len());
            add("function_call_args_jsx", self.function_calls.len());
            add("function_returns_jsx", self.returns.len());
            add("cfg_blocks_jsx", self.cfg_blocks.len());
            add("cfg_edges_jsx", self.cfg_edges.len());
            add(
                "cfg_block_statements_jsx",
                self.cfg_blocks.iter().map(|b| b.statements.len()).sum(),
            );
            return m;
        }

        add("refs", self.refs.len());
        add("import_styles", self.imports.len());
        add(
            "import_specifiers",
            self.imports.iter().map(|i| i.specifiers.len()).sum(),
        );
        add("symbols", self.symbols.len());
        add("assignments", self.assignments.len());
        add(
            "assignment_sources",
            self.assignments.iter().map(|a| a.source_vars.len()).sum(),
        );
        add("function_call_args", self.function_calls.len());
        add("function_returns", self.returns.len());
        add(
            "function_return_sources",
            self.returns.iter().map(|r| r.source_vars.len()).sum(),
        );
        add("cfg_blocks", self.cfg_blocks.len());
        add("cfg_edges", self.cfg_edges.len());
        add(
            "cfg_block_statements",
            self.cfg_blocks.iter().map(|b| b.statements.len()).sum(),
        );
        add("api_endpoints", self.api_endpoints.len());
        add(
            "api_endpoint_controls",
            self.api_endpoints.iter().map(|e| e.controls.len()).sum(),
        );
        add("router_mounts", self.router_mounts.len());
        add("express_middleware_chains", self.middleware_chains.len());
        add("validation_framework_usage", self.validation_usages.len());
        add("sql_queries", self.sql_queries.len());
        add(
            "sql_query_tables",
            self.sql_queries.iter().map(|q| q.tables.len()).sum(),
        );
        add("sql_objects", self.sql_objects.len());
        add("env_var_usage", self.env_usages.len());
        add("object_literals", self.object_literals.len());
        add("variable_usage", self.variable_usages.len());
        add("frontend_api_calls", self.frontend_api_calls.len());
        add("config_files", usize::from(self.config_file.is_some()));
        m
    }
}
