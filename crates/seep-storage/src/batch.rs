//! Batched writer over the relational store.
//!
//! Rows are enqueued into per-table batches; when any batch reaches the
//! configured size, **all** batches flush in registry (FK-safe) order
//! inside one `BEGIN IMMEDIATE` transaction, so readers never observe a
//! partial batch.
//!
//! CFG blocks are the one auto-id special case: `add_cfg_block` returns a
//! negative temporary id, and edge/statement rows enqueued against it are
//! translated to the real rowid at flush time.

use std::path::Path;

use rusqlite::types::ToSqlOutput;
use rusqlite::{Connection, ToSql};
use seep_core::config::StoreConfig;
use seep_core::errors::StoreError;
use seep_core::{paths, schema, FxHashMap};

use crate::database;

/// A value bound into a generated INSERT.
#[derive(Debug, Clone)]
pub enum SqlValue {
    Text(String),
    Int(i64),
    Null,
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Self::Text(s) => s.to_sql(),
            Self::Int(i) => i.to_sql(),
            Self::Null => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Null)),
        }
    }
}

fn text(s: impl Into<String>) -> SqlValue {
    SqlValue::Text(s.into())
}

fn text_opt(s: Option<&str>) -> SqlValue {
    match s {
        Some(s) => SqlValue::Text(s.to_string()),
        None => SqlValue::Null,
    }
}

fn int(i: i64) -> SqlValue {
    SqlValue::Int(i)
}

fn int_opt(i: Option<i64>) -> SqlValue {
    match i {
        Some(i) => SqlValue::Int(i),
        None => SqlValue::Null,
    }
}

/// Which extraction pass a flow row belongs to. The preserved pass lands
/// in the `*_jsx` parallel tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Transform,
    Preserved,
}

impl Pass {
    fn pick(self, plain: &'static str, jsx: &'static str) -> &'static str {
        match self {
            Self::Transform => plain,
            Self::Preserved => jsx,
        }
    }
}

/// Batched writer owning the `repo_index.db` connection.
pub struct RepoStore {
    conn: Connection,
    batch_size: usize,
    batches: FxHashMap<&'static str, Vec<Vec<SqlValue>>>,
    receipts: FxHashMap<&'static str, usize>,
    next_temp_id: i64,
    temp_id_map: FxHashMap<i64, i64>,
}

impl RepoStore {
    /// Create a fresh store at `path` (existing file is replaced).
    pub fn create(path: &Path, config: &StoreConfig) -> Result<Self, StoreError> {
        let conn = database::create(path)?;
        Ok(Self::with_connection(conn, config))
    }

    /// Create an in-memory store (tests).
    pub fn create_in_memory() -> Result<Self, StoreError> {
        let conn = database::create_in_memory()?;
        Ok(Self::with_connection(conn, &StoreConfig::default()))
    }

    fn with_connection(conn: Connection, config: &StoreConfig) -> Self {
        Self {
            conn,
            batch_size: config.effective_batch_size(),
            batches: FxHashMap::default(),
            receipts: FxHashMap::default(),
            next_temp_id: -1,
            temp_id_map: FxHashMap::default(),
        }
    }

    /// Borrow the underlying connection for reads. Pending rows are not
    /// visible until the next flush.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Flush everything and hand back the connection for the
    /// post-indexing phases.
    pub fn finish(mut self) -> Result<Connection, StoreError> {
        self.flush()?;
        Ok(self.conn)
    }

    /// Rows enqueued per table so far (the fidelity receipt).
    pub fn receipts(&self) -> &FxHashMap<&'static str, usize> {
        &self.receipts
    }

    /// Total rows enqueued across all tables.
    pub fn receipt_total(&self) -> usize {
        self.receipts.values().sum()
    }

    fn push(&mut self, table: &'static str, row: Vec<SqlValue>) -> Result<(), StoreError> {
        let spec = schema::table(table)
            .ok_or_else(|| StoreError::UnknownTable { table: table.to_string() })?;
        // CFG block rows carry one trailing slot for the temp id.
        debug_assert!(
            row.len() == spec.arity() || (spec.auto_id && row.len() == spec.arity() + 1),
            "arity mismatch for {table}"
        );

        *self.receipts.entry(table).or_insert(0) += 1;
        let len = {
            let batch = self.batches.entry(table).or_default();
            batch.push(row);
            batch.len()
        };
        if len >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Flush all per-table batches in registry order within one
    /// transaction. Constraint violations are fatal and identify the
    /// table and offending row index.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        let pending: usize = self.batches.values().map(Vec::len).sum();
        if pending == 0 {
            return Ok(());
        }
        tracing::debug!(rows = pending, "flushing batches");
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(StoreError::sqlite)?;

        let result = self.flush_inner();
        match result {
            Ok(()) => {
                self.conn.execute_batch("COMMIT").map_err(StoreError::sqlite)?;
                Ok(())
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    fn flush_inner(&mut self) -> Result<(), StoreError> {
        for spec in schema::registry() {
            let Some(rows) = self.batches.get_mut(spec.name) else { continue };
            if rows.is_empty() {
                continue;
            }
            let rows = std::mem::take(rows);
            let returns_rowid =
                spec.auto_id && (spec.name == "cfg_blocks" || spec.name == "cfg_blocks_jsx");
            let translate_ids = matches!(
                spec.name,
                "cfg_edges" | "cfg_block_statements" | "cfg_edges_jsx" | "cfg_block_statements_jsx"
            );

            let mut stmt = self
                .conn
                .prepare_cached(&spec.insert_sql())
                .map_err(StoreError::sqlite)?;

            for (row_index, mut row) in rows.into_iter().enumerate() {
                let temp_id = if returns_rowid {
                    // The temp id rides in a trailing extra slot.
                    match row.pop() {
                        Some(SqlValue::Int(id)) => Some(id),
                        _ => None,
                    }
                } else {
                    None
                };

                if translate_ids {
                    for value in &mut row {
                        if let SqlValue::Int(id) = value {
                            if *id < 0 {
                                let real = self.temp_id_map.get(id).copied().ok_or(
                                    StoreError::UnresolvedTempId { temp_id: *id },
                                )?;
                                *value = SqlValue::Int(real);
                            }
                        }
                    }
                }

                stmt.execute(rusqlite::params_from_iter(row.iter())).map_err(|e| {
                    StoreError::Constraint {
                        table: spec.name.to_string(),
                        row_index,
                        message: e.to_string(),
                    }
                })?;

                if let Some(temp_id) = temp_id {
                    self.temp_id_map.insert(temp_id, self.conn.last_insert_rowid());
                }
            }
        }
        Ok(())
    }

    // ─── files and references ───────────────────────────────────────────

    pub fn add_file(
        &mut self,
        path: &str,
        sha256: &str,
        ext: &str,
        bytes: i64,
        loc: i64,
    ) -> Result<(), StoreError> {
        self.push(
            "files",
            vec![text(paths::normalize(path)), text(sha256), text(ext), int(bytes), int(loc)],
        )
    }

    pub fn add_config_file(
        &mut self,
        path: &str,
        content: &str,
        file_type: &str,
        context_dir: Option<&str>,
    ) -> Result<(), StoreError> {
        self.push(
            "config_files",
            vec![
                text(paths::normalize(path)),
                text(content),
                text(file_type),
                text_opt(context_dir.map(paths::normalize).as_deref()),
            ],
        )
    }

    pub fn add_ref(
        &mut self,
        src: &str,
        kind: &str,
        value: &str,
        line: Option<i64>,
    ) -> Result<(), StoreError> {
        self.push(
            "refs",
            vec![text(paths::normalize(src)), text(kind), text(value), int_opt(line)],
        )
    }

    pub fn add_import_style(
        &mut self,
        file: &str,
        line: i64,
        package: &str,
        style: &str,
        names: Option<&str>,
        alias: Option<&str>,
    ) -> Result<(), StoreError> {
        self.push(
            "import_styles",
            vec![
                text(paths::normalize(file)),
                int(line),
                text(package),
                text(style),
                text_opt(names),
                text_opt(alias),
            ],
        )
    }

    pub fn add_import_specifier(
        &mut self,
        file: &str,
        import_line: i64,
        specifier_name: &str,
    ) -> Result<(), StoreError> {
        self.push(
            "import_specifiers",
            vec![text(paths::normalize(file)), int(import_line), text(specifier_name)],
        )
    }

    // ─── symbols ────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn add_symbol(
        &mut self,
        pass: Pass,
        path: &str,
        name: &str,
        kind: &str,
        line: i64,
        col: i64,
        end_line: Option<i64>,
        type_annotation: Option<&str>,
        parameters_json: Option<&str>,
    ) -> Result<(), StoreError> {
        self.push(
            pass.pick("symbols", "symbols_jsx"),
            vec![
                text(paths::normalize(path)),
                text(name),
                text(kind),
                int(line),
                int(col),
                int_opt(end_line),
                text_opt(type_annotation),
                text_opt(parameters_json),
            ],
        )
    }

    // ─── flow primitives ────────────────────────────────────────────────

    pub fn add_assignment(
        &mut self,
        pass: Pass,
        file: &str,
        line: i64,
        target_var: &str,
        source_expr: &str,
        in_function: &str,
        property_path: Option<&str>,
    ) -> Result<(), StoreError> {
        self.push(
            pass.pick("assignments", "assignments_jsx"),
            vec![
                text(paths::normalize(file)),
                int(line),
                text(target_var),
                text(source_expr),
                text(in_function),
                text_opt(property_path),
            ],
        )
    }

    pub fn add_assignment_source(
        &mut self,
        file: &str,
        line: i64,
        target_var: &str,
        source_var_name: &str,
    ) -> Result<(), StoreError> {
        self.push(
            "assignment_sources",
            vec![text(paths::normalize(file)), int(line), text(target_var), text(source_var_name)],
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_function_call_arg(
        &mut self,
        pass: Pass,
        file: &str,
        line: i64,
        caller_function: &str,
        callee_function: &str,
        argument_index: i64,
        argument_expr: &str,
        param_name: &str,
        callee_file_path: Option<&str>,
    ) -> Result<(), StoreError> {
        self.push(
            pass.pick("function_call_args", "function_call_args_jsx"),
            vec![
                text(paths::normalize(file)),
                int(line),
                text(caller_function),
                text(callee_function),
                int(argument_index),
                text(argument_expr),
                text(param_name),
                text_opt(callee_file_path.map(paths::normalize).as_deref()),
            ],
        )
    }

    pub fn add_function_return(
        &mut self,
        pass: Pass,
        file: &str,
        line: i64,
        function_name: &str,
        return_expr: &str,
    ) -> Result<(), StoreError> {
        self.push(
            pass.pick("function_returns", "function_returns_jsx"),
            vec![text(paths::normalize(file)), int(line), text(function_name), text(return_expr)],
        )
    }

    pub fn add_function_return_source(
        &mut self,
        return_file: &str,
        return_line: i64,
        return_function: &str,
        return_var_name: &str,
    ) -> Result<(), StoreError> {
        self.push(
            "function_return_sources",
            vec![
                text(paths::normalize(return_file)),
                int(return_line),
                text(return_function),
                text(return_var_name),
            ],
        )
    }

    // ─── control flow ───────────────────────────────────────────────────

    /// Enqueue a CFG block and return a **negative temporary id**.
    /// Edges and statements may reference it immediately; flush rewrites
    /// it to the real rowid.
    pub fn add_cfg_block(
        &mut self,
        pass: Pass,
        file: &str,
        function_name: &str,
        block_type: &str,
        start_line: i64,
        end_line: i64,
        condition_expr: Option<&str>,
    ) -> Result<i64, StoreError> {
        let temp_id = self.next_temp_id;
        self.next_temp_id -= 1;
        // Trailing slot carries the temp id; popped before binding.
        self.push(
            pass.pick("cfg_blocks", "cfg_blocks_jsx"),
            vec![
                text(paths::normalize(file)),
                text(function_name),
                text(block_type),
                int(start_line),
                int(end_line),
                text_opt(condition_expr),
                int(temp_id),
            ],
        )?;
        Ok(temp_id)
    }

    pub fn add_cfg_edge(
        &mut self,
        pass: Pass,
        source_block_id: i64,
        target_block_id: i64,
        edge_type: &str,
    ) -> Result<(), StoreError> {
        self.push(
            pass.pick("cfg_edges", "cfg_edges_jsx"),
            vec![int(source_block_id), int(target_block_id), text(edge_type)],
        )
    }

    pub fn add_cfg_statement(
        &mut self,
        pass: Pass,
        block_id: i64,
        statement_type: &str,
        line: i64,
        statement_text: Option<&str>,
    ) -> Result<(), StoreError> {
        self.push(
            pass.pick("cfg_block_statements", "cfg_block_statements_jsx"),
            vec![int(block_id), text(statement_type), int(line), text_opt(statement_text)],
        )
    }

    // ─── routing and middleware ─────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn add_api_endpoint(
        &mut self,
        file: &str,
        line: i64,
        method: &str,
        pattern: &str,
        path: &str,
        full_path: Option<&str>,
        has_auth: bool,
        handler_function: &str,
    ) -> Result<(), StoreError> {
        self.push(
            "api_endpoints",
            vec![
                text(paths::normalize(file)),
                int(line),
                text(method),
                text(pattern),
                text(path),
                text_opt(full_path),
                int(has_auth as i64),
                text(handler_function),
            ],
        )
    }

    pub fn add_api_endpoint_control(
        &mut self,
        file: &str,
        line: i64,
        control_name: &str,
    ) -> Result<(), StoreError> {
        self.push(
            "api_endpoint_controls",
            vec![text(paths::normalize(file)), int(line), text(control_name)],
        )
    }

    pub fn add_router_mount(
        &mut self,
        file: &str,
        line: i64,
        mount_path_expr: &str,
        router_variable: &str,
        is_literal: bool,
    ) -> Result<(), StoreError> {
        self.push(
            "router_mounts",
            vec![
                text(paths::normalize(file)),
                int(line),
                text(mount_path_expr),
                text(router_variable),
                int(is_literal as i64),
            ],
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_middleware_chain_entry(
        &mut self,
        file: &str,
        route_line: i64,
        route_path: &str,
        route_method: &str,
        execution_order: i64,
        handler_expr: &str,
        handler_type: &str,
        handler_function: Option<&str>,
        handler_file: Option<&str>,
    ) -> Result<(), StoreError> {
        self.push(
            "express_middleware_chains",
            vec![
                text(paths::normalize(file)),
                int(route_line),
                text(route_path),
                text(route_method),
                int(execution_order),
                text(handler_expr),
                text(handler_type),
                text_opt(handler_function),
                text_opt(handler_file.map(paths::normalize).as_deref()),
            ],
        )
    }

    // ─── frameworks, validation, safe sinks ─────────────────────────────

    pub fn add_framework(
        &mut self,
        name: &str,
        language: &str,
        path: &str,
    ) -> Result<(), StoreError> {
        self.push(
            "frameworks",
            vec![text(name), text(language), text(paths::normalize(path))],
        )
    }

    pub fn add_framework_safe_sink(
        &mut self,
        framework_id: &str,
        sink_pattern: &str,
        sink_type: &str,
        is_safe: bool,
        reason: &str,
    ) -> Result<(), StoreError> {
        self.push(
            "framework_safe_sinks",
            vec![
                text(framework_id),
                text(sink_pattern),
                text(sink_type),
                int(is_safe as i64),
                text(reason),
            ],
        )
    }

    pub fn add_framework_taint_pattern(
        &mut self,
        framework_id: &str,
        pattern: &str,
        direction: &str,
        category: &str,
    ) -> Result<(), StoreError> {
        self.push(
            "framework_taint_patterns",
            vec![text(framework_id), text(pattern), text(direction), text(category)],
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_validation_usage(
        &mut self,
        file_path: &str,
        line: i64,
        framework: &str,
        method: &str,
        argument_expr: &str,
        is_validator: bool,
        variable_name: Option<&str>,
    ) -> Result<(), StoreError> {
        self.push(
            "validation_framework_usage",
            vec![
                text(paths::normalize(file_path)),
                int(line),
                text(framework),
                text(method),
                text(argument_expr),
                int(is_validator as i64),
                text_opt(variable_name),
            ],
        )
    }

    // ─── SQL facts ──────────────────────────────────────────────────────

    pub fn add_sql_object(&mut self, file: &str, kind: &str, name: &str) -> Result<(), StoreError> {
        self.push("sql_objects", vec![text(paths::normalize(file)), text(kind), text(name)])
    }

    pub fn add_sql_query(
        &mut self,
        file: &str,
        line: i64,
        query_text: &str,
        command: &str,
        extraction_source: &str,
    ) -> Result<(), StoreError> {
        self.push(
            "sql_queries",
            vec![
                text(paths::normalize(file)),
                int(line),
                text(query_text),
                text(command),
                text(extraction_source),
            ],
        )
    }

    pub fn add_sql_query_table(
        &mut self,
        file: &str,
        line: i64,
        table_name: &str,
    ) -> Result<(), StoreError> {
        self.push(
            "sql_query_tables",
            vec![text(paths::normalize(file)), int(line), text(table_name)],
        )
    }

    // ─── misc facts ─────────────────────────────────────────────────────

    pub fn add_env_var_usage(
        &mut self,
        file: &str,
        line: i64,
        var_name: &str,
        in_function: &str,
        access_method: &str,
    ) -> Result<(), StoreError> {
        self.push(
            "env_var_usage",
            vec![
                text(paths::normalize(file)),
                int(line),
                text(var_name),
                text(in_function),
                text(access_method),
            ],
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_object_literal(
        &mut self,
        file: &str,
        line: i64,
        variable_name: &str,
        property_name: &str,
        property_value: &str,
        property_type: &str,
        in_function: &str,
    ) -> Result<(), StoreError> {
        self.push(
            "object_literals",
            vec![
                text(paths::normalize(file)),
                int(line),
                text(variable_name),
                text(property_name),
                text(property_value),
                text(property_type),
                text(in_function),
            ],
        )
    }

    pub fn add_variable_usage(
        &mut self,
        file: &str,
        line: i64,
        variable_name: &str,
        usage_type: &str,
        in_function: &str,
    ) -> Result<(), StoreError> {
        self.push(
            "variable_usage",
            vec![
                text(paths::normalize(file)),
                int(line),
                text(variable_name),
                text(usage_type),
                text(in_function),
            ],
        )
    }

    pub fn add_frontend_api_call(
        &mut self,
        file: &str,
        line: i64,
        method: &str,
        url_pattern: &str,
        body_var: Option<&str>,
        in_function: &str,
    ) -> Result<(), StoreError> {
        self.push(
            "frontend_api_calls",
            vec![
                text(paths::normalize(file)),
                int(line),
                text(method),
                text(url_pattern),
                text_opt(body_var),
                text(in_function),
            ],
        )
    }
}
