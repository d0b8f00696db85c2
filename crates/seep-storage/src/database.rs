//! Database lifecycle for `repo_index.db`.
//!
//! The database is created from scratch at the start of every run; there
//! is no migration path. The registry hash is stamped into `schema_meta`
//! at creation and verified on every subsequent open; a mismatch is a
//! hard `SchemaError::Stale` before any extractor runs.

use std::path::Path;

use rusqlite::Connection;
use seep_core::errors::{SchemaError, StoreError};
use seep_core::schema;

const STAMP_KEY: &str = "schema_hash";

/// Create a fresh database at `path`, replacing any existing file.
/// All tables and indexes are generated from the schema registry and the
/// registry hash is stamped.
pub fn create(path: &Path) -> Result<Connection, StoreError> {
    if path.exists() {
        std::fs::remove_file(path).map_err(|e| StoreError::Sqlite {
            message: format!("failed to remove stale database {}: {e}", path.display()),
        })?;
    }
    let conn = Connection::open(path).map_err(StoreError::sqlite)?;
    apply_pragmas(&conn)?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Create an in-memory database (tests).
pub fn create_in_memory() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory().map_err(StoreError::sqlite)?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Open an existing database read-only for analysis, verifying the stamp.
pub fn open(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path).map_err(StoreError::sqlite)?;
    verify_stamp(&conn)?;
    Ok(conn)
}

fn apply_pragmas(conn: &Connection) -> Result<(), StoreError> {
    // Single writer, regenerated per run: durability settings favor bulk
    // insert throughput over crash recovery.
    conn.execute_batch(
        "PRAGMA journal_mode = MEMORY;
         PRAGMA synchronous = OFF;
         PRAGMA temp_store = MEMORY;",
    )
    .map_err(StoreError::sqlite)
}

fn create_schema(conn: &Connection) -> Result<(), StoreError> {
    for spec in schema::registry() {
        conn.execute_batch(&spec.create_sql()).map_err(StoreError::sqlite)?;
        for idx in spec.index_sql() {
            conn.execute_batch(&idx).map_err(StoreError::sqlite)?;
        }
    }
    stamp(conn)
}

fn stamp(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta(key, value) VALUES (?1, ?2)",
        rusqlite::params![STAMP_KEY, schema::schema_hash()],
    )
    .map_err(StoreError::sqlite)?;
    Ok(())
}

/// Compare the stamped hash against the current registry hash.
pub fn verify_stamp(conn: &Connection) -> Result<(), StoreError> {
    let stamped: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = ?1",
            rusqlite::params![STAMP_KEY],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(StoreError::sqlite(other)),
        })?;

    let current = schema::schema_hash();
    match stamped {
        None => Err(SchemaError::MissingStamp.into()),
        Some(stamped) if stamped != current => {
            Err(SchemaError::Stale { current, stamped }.into())
        }
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_passes_stamp_gate() {
        let conn = create_in_memory().unwrap();
        verify_stamp(&conn).unwrap();
    }

    #[test]
    fn tampered_stamp_is_stale() {
        let conn = create_in_memory().unwrap();
        conn.execute(
            "UPDATE schema_meta SET value = 'deadbeef' WHERE key = 'schema_hash'",
            [],
        )
        .unwrap();
        let err = verify_stamp(&conn).unwrap_err();
        assert!(matches!(err, StoreError::Schema(SchemaError::Stale { .. })));
    }
}
