//! Read queries over `repo_index.db` shared by the taint engines.
//!
//! All result sets are ordered so downstream iteration is deterministic.

use rusqlite::Connection;
use seep_core::errors::StoreError;

/// A validation-framework anchor (Zod/Joi/Yup schema check site).
#[derive(Debug, Clone)]
pub struct ValidationUsage {
    pub file: String,
    pub line: i64,
    pub framework: String,
    pub schema: Option<String>,
}

/// One argument row at a call site of a resolved callee.
#[derive(Debug, Clone)]
pub struct CallSiteArg {
    pub file: String,
    pub line: i64,
    pub caller_function: String,
    pub callee_function: String,
    pub argument_expr: String,
}

/// Function containing `line` in `file`, or "global".
pub fn containing_function(
    conn: &Connection,
    file: &str,
    line: i64,
) -> Result<String, StoreError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT name FROM symbols
             WHERE path = ?1 AND kind = 'function' AND line <= ?2
             ORDER BY line DESC LIMIT 1",
        )
        .map_err(StoreError::sqlite)?;
    let found: Option<String> = stmt
        .query_row(rusqlite::params![file, line], |row| row.get(0))
        .map(Some)
        .or_else(no_rows_as_none)?;
    Ok(found.unwrap_or_else(|| "global".to_string()))
}

/// Distinct safe-sink patterns (`is_safe = 1`).
pub fn safe_sink_patterns(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT DISTINCT sink_pattern FROM framework_safe_sinks
             WHERE is_safe = 1 ORDER BY sink_pattern",
        )
        .map_err(StoreError::sqlite)?;
    let rows = stmt.query_map([], |row| row.get(0)).map_err(StoreError::sqlite)?;
    collect_strings(rows)
}

/// Validation-framework usage sites for the recognized frameworks.
pub fn validation_usages(conn: &Connection) -> Result<Vec<ValidationUsage>, StoreError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT DISTINCT file_path, line, framework, variable_name
             FROM validation_framework_usage
             WHERE framework IN ('zod', 'joi', 'yup', 'express-validator', 'validator',
                                 'validate', 'pydantic', 'marshmallow')
             ORDER BY file_path, line",
        )
        .map_err(StoreError::sqlite)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ValidationUsage {
                file: row.get(0)?,
                line: row.get(1)?,
                framework: row.get(2)?,
                schema: row.get(3)?,
            })
        })
        .map_err(StoreError::sqlite)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(StoreError::sqlite)?);
    }
    Ok(out)
}

/// All `(file, line, callee_function)` call-arg tuples, for the
/// sanitizer registry's in-memory multi-map.
pub fn call_arg_locations(
    conn: &Connection,
) -> Result<Vec<(String, i64, String)>, StoreError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT file, line, callee_function FROM function_call_args
             WHERE callee_function IS NOT NULL
             ORDER BY file, line, callee_function",
        )
        .map_err(StoreError::sqlite)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .map_err(StoreError::sqlite)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(StoreError::sqlite)?);
    }
    Ok(out)
}

/// Call sites passing an argument to `param_name` of a resolved callee.
/// This feeds the IFDS `parameter_call` flow function.
pub fn call_sites_of(
    conn: &Connection,
    callee_file: &str,
    callee_function: &str,
    param_name: &str,
) -> Result<Vec<CallSiteArg>, StoreError> {
    // Callees may be stored receiver-qualified (`repo.findUser`); both
    // spellings bind.
    let mut stmt = conn
        .prepare_cached(
            "SELECT file, line, caller_function, callee_function, argument_expr
             FROM function_call_args
             WHERE callee_file_path = ?1
               AND (callee_function = ?2 OR callee_function LIKE '%.' || ?2)
               AND param_name = ?3
             ORDER BY file, line, argument_expr",
        )
        .map_err(StoreError::sqlite)?;
    let rows = stmt
        .query_map(rusqlite::params![callee_file, callee_function, param_name], |row| {
            Ok(CallSiteArg {
                file: row.get(0)?,
                line: row.get(1)?,
                caller_function: row.get(2)?,
                callee_function: row.get(3)?,
                argument_expr: row.get(4)?,
            })
        })
        .map_err(StoreError::sqlite)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(StoreError::sqlite)?);
    }
    Ok(out)
}

/// Dotted aliases under which a function is callable through an
/// object-literal handler table: `{ get: handleGet }` makes `handleGet`
/// reachable as `routes.get`.
pub fn object_literal_aliases(
    conn: &Connection,
    function_name: &str,
) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT DISTINCT variable_name, property_name FROM object_literals
             WHERE property_value = ?1
               AND property_type IN ('function_ref', 'shorthand', 'arrow_function',
                                     'method_definition')
             ORDER BY variable_name, property_name",
        )
        .map_err(StoreError::sqlite)?;
    let rows = stmt
        .query_map(rusqlite::params![function_name], |row| {
            Ok(format!("{}.{}", row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(StoreError::sqlite)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(StoreError::sqlite)?);
    }
    Ok(out)
}

/// Call sites of an exact callee spelling binding `param_name`,
/// regardless of resolution state (object-literal aliases are not
/// file-resolved).
pub fn call_sites_by_callee(
    conn: &Connection,
    callee: &str,
    param_name: &str,
) -> Result<Vec<CallSiteArg>, StoreError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT file, line, caller_function, callee_function, argument_expr
             FROM function_call_args
             WHERE callee_function = ?1 AND param_name = ?2
             ORDER BY file, line, argument_expr",
        )
        .map_err(StoreError::sqlite)?;
    let rows = stmt
        .query_map(rusqlite::params![callee, param_name], |row| {
            Ok(CallSiteArg {
                file: row.get(0)?,
                line: row.get(1)?,
                caller_function: row.get(2)?,
                callee_function: row.get(3)?,
                argument_expr: row.get(4)?,
            })
        })
        .map_err(StoreError::sqlite)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(StoreError::sqlite)?);
    }
    Ok(out)
}

/// Number of middleware-chain rows whose handler matches `function_name`.
pub fn middleware_handler_count(
    conn: &Connection,
    function_name: &str,
) -> Result<i64, StoreError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT COUNT(*) FROM express_middleware_chains
             WHERE handler_function = ?1 OR handler_expr LIKE ?2",
        )
        .map_err(StoreError::sqlite)?;
    stmt.query_row(rusqlite::params![function_name, format!("%{function_name}%")], |row| {
        row.get(0)
    })
    .map_err(StoreError::sqlite)
}

/// Canonical source line: first line where `source_var` appears on the
/// right-hand side of an assignment in `file`.
pub fn min_source_line(
    conn: &Connection,
    file: &str,
    source_var: &str,
) -> Result<i64, StoreError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT MIN(line) FROM assignment_sources
             WHERE file = ?1 AND source_var_name = ?2",
        )
        .map_err(StoreError::sqlite)?;
    let found: Option<i64> = stmt
        .query_row(rusqlite::params![file, source_var], |row| row.get(0))
        .map_err(StoreError::sqlite)?;
    Ok(found.unwrap_or(0))
}

/// Canonical sink line: first call-arg row (either extraction pass) in
/// `file`/`function` whose argument or callee mentions the pattern.
pub fn min_sink_line(
    conn: &Connection,
    file: &str,
    pattern: &str,
    function: &str,
) -> Result<i64, StoreError> {
    let like = format!("%{pattern}%");
    let mut stmt = conn
        .prepare_cached(
            "SELECT MIN(line) FROM (
                 SELECT line FROM function_call_args
                 WHERE file = ?1 AND (argument_expr LIKE ?2 OR callee_function LIKE ?2)
                   AND caller_function = ?3
                 UNION ALL
                 SELECT line FROM function_call_args_jsx
                 WHERE file = ?1 AND (argument_expr LIKE ?2 OR callee_function LIKE ?2)
                   AND caller_function = ?3
             )",
        )
        .map_err(StoreError::sqlite)?;
    let found: Option<i64> = stmt
        .query_row(rusqlite::params![file, like, function], |row| row.get(0))
        .map_err(StoreError::sqlite)?;
    Ok(found.unwrap_or(0))
}

/// Environment-variable usage sites (flow-resolver entry nodes).
pub fn env_var_usages(
    conn: &Connection,
) -> Result<Vec<(String, i64, String, String)>, StoreError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT DISTINCT file, line, var_name, in_function FROM env_var_usage
             ORDER BY file, line, var_name",
        )
        .map_err(StoreError::sqlite)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })
        .map_err(StoreError::sqlite)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(StoreError::sqlite)?);
    }
    Ok(out)
}

/// Call-arg rows whose callee matches any of the LIKE patterns, filtered
/// the way the flow resolver selects exit candidates.
pub fn exit_candidate_args(
    conn: &Connection,
    callee_likes: &[&str],
    exclude_file_likes: &[&str],
) -> Result<Vec<CallSiteArg>, StoreError> {
    let callee_clause = callee_likes
        .iter()
        .map(|_| "callee_function LIKE ?".to_string())
        .collect::<Vec<_>>()
        .join(" OR ");
    let exclude_clause = exclude_file_likes
        .iter()
        .map(|_| "file NOT LIKE ?".to_string())
        .collect::<Vec<_>>()
        .join(" AND ");
    let mut sql = format!(
        "SELECT DISTINCT file, line, caller_function, callee_function, argument_expr
         FROM function_call_args
         WHERE ({callee_clause}) AND argument_expr IS NOT NULL"
    );
    if !exclude_clause.is_empty() {
        sql.push_str(&format!(" AND {exclude_clause}"));
    }
    sql.push_str(" ORDER BY file, line, argument_expr");

    let mut stmt = conn.prepare(&sql).map_err(StoreError::sqlite)?;
    let params: Vec<&str> = callee_likes.iter().chain(exclude_file_likes.iter()).copied().collect();
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok(CallSiteArg {
                file: row.get(0)?,
                line: row.get(1)?,
                caller_function: row.get::<_, Option<String>>(2)?.unwrap_or_else(|| "global".into()),
                callee_function: row.get(3)?,
                argument_expr: row.get(4)?,
            })
        })
        .map_err(StoreError::sqlite)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(StoreError::sqlite)?);
    }
    Ok(out)
}

fn no_rows_as_none<T>(e: rusqlite::Error) -> Result<Option<T>, StoreError> {
    match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(StoreError::sqlite(other)),
    }
}

fn collect_strings<F>(rows: rusqlite::MappedRows<'_, F>) -> Result<Vec<String>, StoreError>
where
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<String>,
{
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(StoreError::sqlite)?);
    }
    Ok(out)
}
