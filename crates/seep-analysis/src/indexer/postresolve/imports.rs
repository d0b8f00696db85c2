//! Import path resolution: rewrite relative and aliased import targets
//! in `refs` and `import_styles` to canonical on-disk paths. Already
//! resolved rows no longer match the relative/alias filters, so the
//! pass is idempotent.

use rusqlite::Connection;
use seep_core::errors::StoreError;
use seep_core::FxHashSet;

use super::handlers::resolve_module;

pub fn resolve_import_paths(conn: &Connection) -> Result<usize, StoreError> {
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

    let mut resolved = 0usize;

    // refs rows with relative or aliased targets.
    let ref_rows: Vec<(i64, String, String)> = {
        let mut stmt = conn
            .prepare_cached(
                "SELECT rowid, src, value FROM refs
                 WHERE kind IN ('import', 'from', 'require')
                   AND (value LIKE './%' OR value LIKE '../%' OR value LIKE '@/%')
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
    {
        let mut update = conn
            .prepare_cached("UPDATE refs SET value = ?1 WHERE rowid = ?2")
            .map_err(StoreError::sqlite)?;
        for (rowid, src, value) in ref_rows {
            if let Some(path) = resolve_module(&src, &value, &known_files) {
                update.execute(rusqlite::params![path, rowid]).map_err(StoreError::sqlite)?;
                resolved += 1;
            }
        }
    }

    // import_styles rows, same treatment.
    let style_rows: Vec<(i64, String, String)> = {
        let mut stmt = conn
            .prepare_cached(
                "SELECT rowid, file, package FROM import_styles
                 WHERE package LIKE './%' OR package LIKE '../%' OR package LIKE '@/%'
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
    {
        let mut update = conn
            .prepare_cached("UPDATE import_styles SET package = ?1 WHERE rowid = ?2")
            .map_err(StoreError::sqlite)?;
        for (rowid, file, package) in style_rows {
            if let Some(path) = resolve_module(&file, &package, &known_files) {
                update.execute(rusqlite::params![path, rowid]).map_err(StoreError::sqlite)?;
                resolved += 1;
            }
        }
    }

    Ok(resolved)
}
