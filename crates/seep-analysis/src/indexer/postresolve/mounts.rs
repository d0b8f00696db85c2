//! Router mount hierarchy: resolve `router.use(path, router)` mount
//! expressions into literal prefixes and stamp
//! `api_endpoints.full_path = mount_prefix + pattern`.

use rusqlite::Connection;
use seep_core::errors::StoreError;
use seep_core::{paths, FxHashMap};
use tracing::debug;

const MAX_NESTING: usize = 5;

pub fn resolve_router_mounts(conn: &Connection) -> Result<usize, StoreError> {
    let mounts: Vec<(String, i64, String, String, bool)> = {
        let mut stmt = conn
            .prepare_cached(
                "SELECT file, line, mount_path_expr, router_variable, is_literal
                 FROM router_mounts ORDER BY file, line",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)? != 0,
                ))
            })
            .map_err(StoreError::sqlite)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(StoreError::sqlite)?);
        }
        out
    };
    if mounts.is_empty() {
        return Ok(0);
    }

    // Constant values for identifier / template-literal mount paths.
    let constants: FxHashMap<String, String> = {
        let mut stmt = conn
            .prepare_cached(
                "SELECT file, target_var, source_expr FROM assignments
                 WHERE target_var LIKE '%PREFIX%' OR target_var LIKE '%prefix%'
                 ORDER BY file, line",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(StoreError::sqlite)?;
        let mut map = FxHashMap::default();
        for row in rows {
            let (file, var, value) = row.map_err(StoreError::sqlite)?;
            let cleaned = value.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
            map.insert(format!("{file}::{var}"), cleaned);
        }
        map
    };

    // Import alias → on-disk router file.
    let imports: FxHashMap<String, String> = {
        let mut stmt = conn
            .prepare_cached(
                "SELECT file, package, alias FROM import_styles
                 WHERE alias IS NOT NULL ORDER BY file, line",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(StoreError::sqlite)?;
        let mut map = FxHashMap::default();
        for row in rows {
            let (file, package, alias) = row.map_err(StoreError::sqlite)?;
            if !package.starts_with('.') {
                continue;
            }
            let mut resolved = paths::join(&paths::parent(&file), &package);
            if !has_source_extension(&resolved) {
                resolved.push_str(".ts");
            }
            map.insert(format!("{file}::{alias}"), resolved);
        }
        map
    };

    // Resolve each mount expression to a literal prefix and bind it to
    // the mounted router's file.
    let mut mount_map: FxHashMap<String, (String, String)> = FxHashMap::default();
    for (file, line, mount_expr, router_var, is_literal) in &mounts {
        let resolved_mount = if *is_literal {
            Some(mount_expr.clone())
        } else if mount_expr.starts_with('`') {
            substitute_template(mount_expr, file, &constants)
        } else {
            constants.get(&format!("{file}::{mount_expr}")).cloned()
        };
        let Some(prefix) = resolved_mount else {
            debug!(%file, line, %mount_expr, "unresolved mount expression");
            continue;
        };

        let router_file = imports
            .get(&format!("{file}::{router_var}"))
            .cloned()
            // A router variable with no import is local to the file.
            .or_else(|| {
                mounts
                    .iter()
                    .any(|(f, _, _, v, _)| f == file && v == router_var)
                    .then(|| file.clone())
            });

        if let Some(router_file) = router_file {
            mount_map.insert(router_file, (prefix, file.clone()));
        }
    }

    // Nested mounts: compose prefixes up the mount chain.
    let full_prefix = |file: &String| -> String {
        let mut prefix = String::new();
        let mut current = file.clone();
        for _ in 0..MAX_NESTING {
            match mount_map.get(&current) {
                Some((mount, parent)) => {
                    prefix = format!("{mount}{prefix}");
                    if parent == &current {
                        break;
                    }
                    current = parent.clone();
                }
                None => break,
            }
        }
        prefix
    };

    let mut update = conn
        .prepare_cached("UPDATE api_endpoints SET full_path = ?1 WHERE rowid = ?2")
        .map_err(StoreError::sqlite)?;

    let mut updated = 0usize;
    let files: Vec<String> = mount_map.keys().cloned().collect();
    for file in files {
        let prefix = full_prefix(&file);
        let endpoints: Vec<(i64, String)> = {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT rowid, pattern FROM api_endpoints WHERE file = ?1 ORDER BY rowid",
                )
                .map_err(StoreError::sqlite)?;
            let rows = stmt
                .query_map(rusqlite::params![file], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })
                .map_err(StoreError::sqlite)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(StoreError::sqlite)?);
            }
            out
        };

        for (rowid, pattern) in endpoints {
            let full_path = if pattern.starts_with('/') {
                format!("{prefix}{pattern}")
            } else {
                format!("{prefix}/{pattern}")
            };
            update.execute(rusqlite::params![full_path, rowid]).map_err(StoreError::sqlite)?;
            updated += 1;
        }
    }

    Ok(updated)
}

/// Substitute `${VAR}` interpolations from known constants; any
/// unresolved variable fails the whole template.
fn substitute_template(
    template: &str,
    file: &str,
    constants: &FxHashMap<String, String>,
) -> Option<String> {
    let mut result = String::new();
    let mut rest = template.trim_matches('`');
    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}')?;
        let var = &after[..end];
        let value = constants.get(&format!("{file}::{var}"))?;
        result.push_str(value);
        rest = &after[end + 1..];
    }
    result.push_str(rest);
    Some(result)
}

fn has_source_extension(path: &str) -> bool {
    [".ts", ".js", ".tsx", ".jsx", ".mjs", ".cjs"]
        .iter()
        .any(|ext| path.ends_with(ext))
}
