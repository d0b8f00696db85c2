//! Graph builder: projects the relational model into `graphs.db`.
//!
//! Every flow primitive yields a forward edge and, for the data-flow
//! partition, a stored reverse edge (`*_reverse`, source = downstream
//! node) so the backward engine needs no on-the-fly inversion. The
//! builder reads tables only; it never looks at source text.

use rusqlite::Connection;
use seep_core::errors::StoreError;
use seep_storage::graph::{EdgeMeta, GraphStore, GRAPH_CALL, GRAPH_DATA_FLOW};
use tracing::info;

use super::node_id;

/// Aggregate counts from graph construction.
#[derive(Debug, Default, Clone)]
pub struct GraphStats {
    pub nodes: usize,
    pub data_flow_edges: usize,
    pub call_edges: usize,
}

/// Build the data-flow and call graphs from `repo_index.db` into the
/// graph store. One bulk transaction.
pub fn build_graphs(repo: &Connection, graph: &GraphStore) -> Result<GraphStats, StoreError> {
    let mut builder = GraphBuilder { repo, graph, stats: GraphStats::default() };
    graph.begin()?;
    let result = builder.build();
    match result {
        Ok(()) => {
            graph.commit()?;
            builder.stats.nodes = graph.node_count()? as usize;
            info!(
                nodes = builder.stats.nodes,
                data_flow_edges = builder.stats.data_flow_edges,
                call_edges = builder.stats.call_edges,
                "graph construction complete"
            );
            Ok(builder.stats)
        }
        Err(e) => Err(e),
    }
}

struct GraphBuilder<'a> {
    repo: &'a Connection,
    graph: &'a GraphStore,
    stats: GraphStats,
}

impl GraphBuilder<'_> {
    fn build(&mut self) -> Result<(), StoreError> {
        self.build_assignment_edges()?;
        self.build_call_argument_edges()?;
        self.build_return_edges()?;
        self.build_middleware_chain_edges()?;
        self.build_cross_boundary_edges()?;
        Ok(())
    }

    /// A forward data-flow edge plus its stored reverse.
    fn add_data_flow(
        &mut self,
        from: &str,
        to: &str,
        edge_type: &str,
        meta: &EdgeMeta,
    ) -> Result<(), StoreError> {
        self.graph.add_node(from, GRAPH_DATA_FLOW)?;
        self.graph.add_node(to, GRAPH_DATA_FLOW)?;
        self.graph.add_edge(from, to, edge_type, meta, GRAPH_DATA_FLOW)?;
        self.graph.add_edge(
            to,
            from,
            &format!("{edge_type}_reverse"),
            meta,
            GRAPH_DATA_FLOW,
        )?;
        self.stats.data_flow_edges += 2;
        Ok(())
    }

    fn add_call(
        &mut self,
        from: &str,
        to: &str,
        edge_type: &str,
        meta: &EdgeMeta,
    ) -> Result<(), StoreError> {
        self.graph.add_node(from, GRAPH_CALL)?;
        self.graph.add_node(to, GRAPH_CALL)?;
        self.graph.add_edge(from, to, edge_type, meta, GRAPH_CALL)?;
        self.stats.call_edges += 1;
        Ok(())
    }

    /// Assignment and field edges from the assignments tables.
    ///
    /// `x = y`       → assignment
    /// `x = y.f`     → field_load
    /// `x.f = y`     → field_store, plus field_store_pass from the base
    ///                 object into the stored path (prefix aliasing).
    fn build_assignment_edges(&mut self) -> Result<(), StoreError> {
        let mut stmt = self
            .repo
            .prepare_cached(
                "SELECT a.file, a.line, a.target_var, a.in_function, a.property_path,
                        s.source_var_name
                 FROM assignments a
                 JOIN assignment_sources s
                   ON s.file = a.file AND s.line = a.line AND s.target_var = a.target_var
                 ORDER BY a.file, a.line, a.target_var, s.source_var_name",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(StoreError::sqlite)?;

        for row in rows {
            let (file, line, target_var, in_function, property_path, source_var) =
                row.map_err(StoreError::sqlite)?;
            let meta = EdgeMeta { line, file: Some(file.clone()), call: None };

            let source_node = node_id(&file, &in_function, &source_var);

            match &property_path {
                // Destructuring / property target: x.f = y.
                Some(prop) if prop != &target_var => {
                    let target_node = node_id(&file, &in_function, prop);
                    self.add_data_flow(&source_node, &target_node, "field_store", &meta)?;

                    // The whole object keeps flowing into the stored
                    // path for prefix-alias tracking.
                    if let Some(base) = prop.split('.').next() {
                        if base != prop {
                            let base_node = node_id(&file, &in_function, base);
                            self.add_data_flow(
                                &base_node,
                                &target_node,
                                "field_store_pass",
                                &meta,
                            )?;
                        }
                    }
                    // The plain target variable also receives the value.
                    let var_node = node_id(&file, &in_function, &target_var);
                    self.add_data_flow(&source_node, &var_node, "assignment", &meta)?;
                }
                _ => {
                    let target_node = node_id(&file, &in_function, &target_var);
                    let edge_type =
                        if source_var.contains('.') { "field_load" } else { "assignment" };
                    self.add_data_flow(&source_node, &target_node, edge_type, &meta)?;
                }
            }
        }
        Ok(())
    }

    /// Argument → parameter edges for statically resolved callees.
    fn build_call_argument_edges(&mut self) -> Result<(), StoreError> {
        let mut stmt = self
            .repo
            .prepare_cached(
                "SELECT file, line, caller_function, callee_function, argument_expr,
                        param_name, callee_file_path
                 FROM function_call_args
                 WHERE callee_file_path IS NOT NULL
                 ORDER BY file, line, argument_index",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .map_err(StoreError::sqlite)?;

        for row in rows {
            let (file, line, caller, callee, arg_expr, param, callee_file) =
                row.map_err(StoreError::sqlite)?;
            let Some(arg_var) = crate::taint::ifds::parse_argument_variable(&arg_expr) else {
                continue;
            };
            let callee_fn = callee_base_name(&callee);
            let arg_node = node_id(&file, &caller, &arg_var);
            let param_node = node_id(&callee_file, callee_fn, &param);
            let meta = EdgeMeta { line, file: Some(file.clone()), call: Some(callee.clone()) };

            self.add_data_flow(&arg_node, &param_node, "call_argument", &meta)?;
            self.add_call(&arg_node, &param_node, "call_argument", &meta)?;
        }
        Ok(())
    }

    /// Returned variable → call-site assignment target.
    fn build_return_edges(&mut self) -> Result<(), StoreError> {
        let mut stmt = self
            .repo
            .prepare_cached(
                "SELECT r.return_file, r.return_line, r.return_function, r.return_var_name,
                        c.file, c.line, c.caller_function, c.callee_function
                 FROM function_return_sources r
                 JOIN function_call_args c
                   ON c.callee_file_path = r.return_file
                  AND c.argument_index = 0
                 WHERE c.callee_function = r.return_function
                    OR c.callee_function LIKE '%.' || r.return_function
                 ORDER BY r.return_file, r.return_line, c.file, c.line",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })
            .map_err(StoreError::sqlite)?;

        for row in rows {
            let (ret_file, ret_line, ret_function, ret_var, call_file, call_line, caller, callee) =
                row.map_err(StoreError::sqlite)?;

            // The value lands in the variable assigned from this call.
            let target_var: Option<String> = {
                let mut target_stmt = self
                    .repo
                    .prepare_cached(
                        "SELECT target_var FROM assignments
                         WHERE file = ?1 AND line = ?2 LIMIT 1",
                    )
                    .map_err(StoreError::sqlite)?;
                target_stmt
                    .query_row(rusqlite::params![call_file, call_line], |row| row.get(0))
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(StoreError::sqlite(other)),
                    })?
            };
            let Some(target_var) = target_var else { continue };

            let ret_node = node_id(&ret_file, &ret_function, &ret_var);
            let target_node = node_id(&call_file, &caller, &target_var);
            let meta = EdgeMeta {
                line: ret_line,
                file: Some(ret_file.clone()),
                call: Some(callee.clone()),
            };
            self.add_data_flow(&ret_node, &target_node, "return_to_caller", &meta)?;
            self.add_call(&ret_node, &target_node, "return_to_caller", &meta)?;
        }
        Ok(())
    }

    /// Exit of each middleware → entry of the next handler, in
    /// execution order, including validator → controller transitions.
    fn build_middleware_chain_edges(&mut self) -> Result<(), StoreError> {
        let mut stmt = self
            .repo
            .prepare_cached(
                "SELECT file, route_line, execution_order, handler_expr,
                        handler_function, handler_file
                 FROM express_middleware_chains
                 ORDER BY file, route_line, execution_order",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })
            .map_err(StoreError::sqlite)?;

        let mut previous: Option<(String, i64, String)> = None;
        for row in rows {
            let (file, route_line, _order, handler_expr, handler_function, handler_file) =
                row.map_err(StoreError::sqlite)?;
            let function = handler_function.unwrap_or(handler_expr);
            let handler_node = node_id(
                handler_file.as_deref().unwrap_or(&file),
                &function,
                "req",
            );

            if let Some((prev_file, prev_line, prev_node)) = &previous {
                if *prev_file == file && *prev_line == route_line {
                    let meta =
                        EdgeMeta { line: route_line, file: Some(file.clone()), call: None };
                    self.add_data_flow(prev_node, &handler_node, "express_middleware_chain", &meta)?;
                }
            }
            previous = Some((file, route_line, handler_node));
        }
        Ok(())
    }

    /// Frontend request body → backend route request body, matched by
    /// `(method, normalized url)`.
    fn build_cross_boundary_edges(&mut self) -> Result<(), StoreError> {
        let endpoints: Vec<(String, String, String, Option<String>, String)> = {
            let mut stmt = self
                .repo
                .prepare_cached(
                    "SELECT file, method, pattern, full_path, handler_function
                     FROM api_endpoints ORDER BY file, line",
                )
                .map_err(StoreError::sqlite)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                })
                .map_err(StoreError::sqlite)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(StoreError::sqlite)?);
            }
            out
        };

        let mut stmt = self
            .repo
            .prepare_cached(
                "SELECT file, line, method, url_pattern, body_var, in_function
                 FROM frontend_api_calls
                 WHERE body_var IS NOT NULL
                 ORDER BY file, line",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(StoreError::sqlite)?;

        for row in rows {
            let (file, line, method, url, body_var, in_function) =
                row.map_err(StoreError::sqlite)?;
            let call_shape = normalize_url_pattern(&url);

            for (ep_file, ep_method, ep_pattern, ep_full_path, ep_handler) in &endpoints {
                if !ep_method.eq_ignore_ascii_case(&method) {
                    continue;
                }
                let route = ep_full_path.as_deref().unwrap_or(ep_pattern);
                if !urls_match(&call_shape, &normalize_url_pattern(route)) {
                    continue;
                }
                let from = node_id(&file, &in_function, &body_var);
                let to = node_id(ep_file, ep_handler, "req.body");
                let meta = EdgeMeta { line, file: Some(file.clone()), call: None };
                self.add_data_flow(&from, &to, "cross_boundary_api", &meta)?;
            }
        }
        Ok(())
    }
}

/// Strip a receiver prefix: `controller.create` → `create`.
fn callee_base_name(callee: &str) -> &str {
    callee.rsplit('.').next().unwrap_or(callee)
}

/// Normalize a URL pattern for matching: route `:param` segments and
/// frontend `${…}` interpolations both become a wildcard segment.
fn normalize_url_pattern(url: &str) -> Vec<String> {
    url.trim_matches(|c| c == '`' || c == '"' || c == '\'')
        .split('?')
        .next()
        .unwrap_or("")
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            if segment.starts_with(':') || segment.contains("${") {
                "*".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect()
}

/// Segment-wise match with optional API-prefix tolerance: a leading
/// `api` (or `api`,`v1`…) segment present on only one side is skipped.
fn urls_match(a: &[String], b: &[String]) -> bool {
    if segments_match(a, b) {
        return true;
    }
    let strip = |s: &[String]| -> Vec<String> {
        let mut s = s.to_vec();
        while let Some(first) = s.first() {
            if first == "api" || (first.starts_with('v') && first[1..].chars().all(|c| c.is_ascii_digit()) && first.len() > 1) {
                s.remove(0);
            } else {
                break;
            }
        }
        s
    };
    segments_match(&strip(a), &strip(b))
}

fn segments_match(a: &[String], b: &[String]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| x == "*" || y == "*" || x == y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_normalization_unifies_params_and_templates() {
        assert_eq!(normalize_url_pattern("/users/:id"), ["users", "*"]);
        assert_eq!(normalize_url_pattern("`/users/${userId}`"), ["users", "*"]);
        assert!(urls_match(
            &normalize_url_pattern("/users/:id"),
            &normalize_url_pattern("`/users/${userId}`"),
        ));
    }

    #[test]
    fn api_prefix_tolerance() {
        assert!(urls_match(
            &normalize_url_pattern("/api/users/:id"),
            &normalize_url_pattern("/users/:id"),
        ));
        assert!(!urls_match(
            &normalize_url_pattern("/users/:id"),
            &normalize_url_pattern("/orders/:id"),
        ));
    }
}
