//! Handler file resolution: bind `express_middleware_chains` handler
//! names to on-disk files through the import tables and `new X()`
//! instance assignments.
//!
//! Arrow-wrapped handlers (`handler(controller.create)`) are normalized
//! here, at resolution time; extraction stores them verbatim.

use rusqlite::Connection;
use seep_core::errors::StoreError;
use seep_core::{paths, FxHashMap, FxHashSet};

pub fn resolve_handler_files(
    conn: &Connection,
    ambiguous: &mut Vec<String>,
) -> Result<usize, StoreError> {
    let known_files: FxHashSet<String> = {
        let mut stmt =
            conn.prepare_cached("SELECT path FROM files").map_err(StoreError::sqlite)?;
        let rows =
            stmt.query_map([], |row| row.get::<_, String>(0)).map_err(StoreError::sqlite)?;
        let mut set = FxHashSet::default();
        for row in rows {
            set.insert(row.map_err(StoreError::sqlite)?);
        }
        set
    };

    // (file, local name) → imported module string.
    let imports: FxHashMap<(String, String), Vec<String>> = {
        let mut map: FxHashMap<(String, String), Vec<String>> = FxHashMap::default();
        let mut stmt = conn
            .prepare_cached(
                "SELECT s.file, s.package, s.alias, sp.specifier_name
                 FROM import_styles s
                 LEFT JOIN import_specifiers sp
                   ON sp.file = s.file AND sp.import_line = s.line
                 ORDER BY s.file, s.line",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(StoreError::sqlite)?;
        for row in rows {
            let (file, package, alias, specifier) = row.map_err(StoreError::sqlite)?;
            if let Some(alias) = alias {
                map.entry((file.clone(), alias)).or_default().push(package.clone());
            }
            if let Some(specifier) = specifier {
                map.entry((file, specifier)).or_default().push(package);
            }
        }
        map
    };

    // Instance variables: `const ctrl = new UserController()`.
    let instances: FxHashMap<(String, String), String> = {
        let mut map = FxHashMap::default();
        let mut stmt = conn
            .prepare_cached(
                "SELECT file, target_var, source_expr FROM assignments
                 WHERE source_expr LIKE 'new %' ORDER BY file, line",
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
        for row in rows {
            let (file, var, expr) = row.map_err(StoreError::sqlite)?;
            let class = expr
                .trim_start_matches("new ")
                .split(|c: char| c == '(' || c.is_whitespace())
                .next()
                .unwrap_or("")
                .to_string();
            if !class.is_empty() {
                map.insert((file, var), class);
            }
        }
        map
    };

    let pending: Vec<(i64, String, String)> = {
        let mut stmt = conn
            .prepare_cached(
                "SELECT rowid, file, handler_function FROM express_middleware_chains
                 WHERE handler_function IS NOT NULL AND handler_file IS NULL
                 ORDER BY rowid",
            )
            .map_err(StoreError::sqlite)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .map_err(StoreError::sqlite)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(StoreError::sqlite)?);
        }
        out
    };

    let mut update = conn
        .prepare_cached("UPDATE express_middleware_chains SET handler_file = ?1 WHERE rowid = ?2")
        .map_err(StoreError::sqlite)?;

    let mut resolved = 0usize;
    for (rowid, file, handler_function) in pending {
        let normalized = normalize_handler(&handler_function);
        let base = normalized.split('.').next().unwrap_or(&normalized).to_string();

        // The importing variable may be the handler itself or the class
        // behind an instance variable.
        let lookup_name =
            instances.get(&(file.clone(), base.clone())).cloned().unwrap_or(base);

        let Some(packages) = imports.get(&(file.clone(), lookup_name.clone())) else {
            continue;
        };
        let mut candidates: Vec<String> = packages
            .iter()
            .filter_map(|package| resolve_module(&file, package, &known_files))
            .collect();
        candidates.sort_unstable();
        candidates.dedup();

        match candidates.as_slice() {
            [only] => {
                update.execute(rusqlite::params![only, rowid]).map_err(StoreError::sqlite)?;
                resolved += 1;
            }
            [] => {}
            _ => ambiguous.push(format!(
                "handler {handler_function} in {file} ({} candidate files)",
                candidates.len()
            )),
        }
    }

    Ok(resolved)
}

/// `handler(controller.create)` → `controller.create`; bare names pass
/// through.
fn normalize_handler(handler: &str) -> String {
    let trimmed = handler.trim();
    match (trimmed.find('('), trimmed.rfind(')')) {
        (Some(open), Some(close)) if close > open => {
            let inner = trimmed[open + 1..close].trim();
            if !inner.is_empty() {
                return normalize_handler(inner);
            }
            trimmed[..open].to_string()
        }
        _ => trimmed.to_string(),
    }
}

/// Resolve a relative or aliased module string to a known on-disk file,
/// with extension inference and index-file fallback.
pub(super) fn resolve_module(
    importing_file: &str,
    package: &str,
    known_files: &FxHashSet<String>,
) -> Option<String> {
    let base = if package.starts_with('.') {
        paths::join(&paths::parent(importing_file), package)
    } else if let Some(rest) = package.strip_prefix("@/") {
        paths::join("src", rest)
    } else {
        return None;
    };

    if known_files.contains(&base) {
        return Some(base);
    }
    for ext in [".ts", ".js", ".tsx", ".jsx", ".mjs", ".cjs"] {
        let candidate = format!("{base}{ext}");
        if known_files.contains(&candidate) {
            return Some(candidate);
        }
    }
    for index in ["/index.ts", "/index.js"] {
        let candidate = format!("{base}{index}");
        if known_files.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrow_wrappers_normalize_to_inner_reference() {
        assert_eq!(normalize_handler("controller.create"), "controller.create");
        assert_eq!(normalize_handler("handler(controller.create)"), "controller.create");
        assert_eq!(normalize_handler("wrap(catchAsync(ctrl.update))"), "ctrl.update");
    }

    #[test]
    fn module_resolution_infers_extensions() {
        let mut files = FxHashSet::default();
        files.insert("src/controllers/user.controller.ts".to_string());
        assert_eq!(
            resolve_module("src/routes/user.routes.ts", "../controllers/user.controller", &files),
            Some("src/controllers/user.controller.ts".to_string())
        );
        assert_eq!(
            resolve_module("src/routes/user.routes.ts", "@/controllers/user.controller", &files),
            Some("src/controllers/user.controller.ts".to_string())
        );
        assert_eq!(resolve_module("a.ts", "express", &files), None);
    }
}
