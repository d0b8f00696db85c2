//! Batched writer tests: flush semantics, CFG temp-id translation,
//! path normalization, and receipt accounting.

use seep_storage::batch::{Pass, RepoStore};

#[test]
fn windows_and_posix_spellings_collapse_to_one_file_row() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_file("src\\a.js", "aaaa", ".js", 10, 2).unwrap();
    store.add_file("src/a.js", "aaaa", ".js", 10, 2).unwrap();
    store.flush().unwrap();

    let conn = store.finish().unwrap();
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0)).unwrap();
    assert_eq!(count, 1);
    let path: String =
        conn.query_row("SELECT path FROM files", [], |row| row.get(0)).unwrap();
    assert_eq!(path, "src/a.js");
}

#[test]
fn no_persisted_path_contains_a_backslash() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_file("src\\deep\\b.py", "bbbb", ".py", 1, 1).unwrap();
    store
        .add_assignment(Pass::Transform, "src\\deep\\b.py", 3, "x", "req.args", "handler", None)
        .unwrap();
    store.add_assignment_source("src\\deep\\b.py", 3, "x", "req.args").unwrap();
    store.add_ref("src\\deep\\b.py", "import", "flask", Some(1)).unwrap();
    store.flush().unwrap();

    let conn = store.finish().unwrap();
    for (table, column) in [
        ("files", "path"),
        ("assignments", "file"),
        ("assignment_sources", "file"),
        ("refs", "src"),
    ] {
        let bad: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {table} WHERE {column} LIKE '%\\%'"),
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(bad, 0, "backslash found in {table}.{column}");
    }
}

#[test]
fn cfg_temp_ids_translate_to_real_rowids_at_flush() {
    let mut store = RepoStore::create_in_memory().unwrap();

    let entry = store
        .add_cfg_block(Pass::Transform, "a.py", "f", "entry", 1, 10, None)
        .unwrap();
    let branch = store
        .add_cfg_block(Pass::Transform, "a.py", "f", "branch_true", 3, 5, None)
        .unwrap();
    assert!(entry < 0 && branch < 0 && entry != branch);

    store.add_cfg_edge(Pass::Transform, entry, branch, "true").unwrap();
    store.add_cfg_statement(Pass::Transform, branch, "expression", 4, Some("a = 1")).unwrap();
    store.flush().unwrap();

    let conn = store.finish().unwrap();
    let (source, target): (i64, i64) = conn
        .query_row("SELECT source_block_id, target_block_id FROM cfg_edges", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert!(source > 0 && target > 0);

    // The translated ids point at actual block rows.
    let blocks: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM cfg_blocks WHERE id IN (?1, ?2)",
            rusqlite::params![source, target],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(blocks, 2);

    let statement_block: i64 = conn
        .query_row("SELECT block_id FROM cfg_block_statements", [], |row| row.get(0))
        .unwrap();
    assert_eq!(statement_block, target);
}

#[test]
fn temp_ids_survive_across_flush_boundaries() {
    let mut store = RepoStore::create_in_memory().unwrap();
    let block = store
        .add_cfg_block(Pass::Transform, "a.py", "f", "entry", 1, 4, None)
        .unwrap();
    store.flush().unwrap();

    // Edge enqueued after the block was committed still resolves.
    store.add_cfg_edge(Pass::Transform, block, block, "loop_back").unwrap();
    store.flush().unwrap();

    let conn = store.finish().unwrap();
    let (source, target): (i64, i64) = conn
        .query_row("SELECT source_block_id, target_block_id FROM cfg_edges", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert!(source > 0);
    assert_eq!(source, target);
}

#[test]
fn unresolved_temp_id_is_a_typed_error() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_cfg_edge(Pass::Transform, -999, -999, "true").unwrap();
    let err = store.flush().unwrap_err();
    assert!(matches!(
        err,
        seep_core::errors::StoreError::UnresolvedTempId { temp_id: -999 }
    ));
}

#[test]
fn receipts_count_every_enqueued_row() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_file("a.py", "aa", ".py", 1, 1).unwrap();
    store
        .add_assignment(Pass::Transform, "a.py", 2, "x", "req.args.name", "f", None)
        .unwrap();
    store.add_assignment_source("a.py", 2, "x", "req.args.name").unwrap();
    store.add_assignment_source("a.py", 2, "x", "req").unwrap();

    let receipts = store.receipts();
    assert_eq!(receipts.get("files"), Some(&1));
    assert_eq!(receipts.get("assignments"), Some(&1));
    assert_eq!(receipts.get("assignment_sources"), Some(&2));
    assert_eq!(store.receipt_total(), 4);
}

#[test]
fn junction_rows_reference_existing_parents() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_file("c.ts", "cc", ".ts", 1, 1).unwrap();
    store
        .add_api_endpoint("c.ts", 7, "POST", "/users", "/users", None, false, "create")
        .unwrap();
    store.add_api_endpoint_control("c.ts", 7, "requireAuth").unwrap();
    store.flush().unwrap();

    let conn = store.finish().unwrap();
    let orphans: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM api_endpoint_controls c
             WHERE NOT EXISTS (
                 SELECT 1 FROM api_endpoints e WHERE e.file = c.file AND e.line = c.line
             )",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(orphans, 0);
}
