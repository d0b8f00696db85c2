//! Forward flow resolver tests: entry/exit discovery, audit rows,
//! semantic deduplication, and determinism.

use seep_analysis::graph::build_graphs;
use seep_analysis::taint::{FlowResolver, TaintRegistry};
use seep_storage::batch::{Pass, RepoStore};
use seep_storage::GraphStore;

fn seed_env_to_response(store: &mut RepoStore) {
    store.add_file("src/app.ts", "a", ".ts", 100, 10).unwrap();

    // const token = process.env.TOKEN
    store
        .add_assignment(
            Pass::Transform, "src/app.ts", 1, "token", "process.env.TOKEN", "global", None,
        )
        .unwrap();
    store
        .add_assignment_source("src/app.ts", 1, "token", "process.env.TOKEN")
        .unwrap();
    store
        .add_env_var_usage("src/app.ts", 1, "process.env.TOKEN", "global", "process.env")
        .unwrap();

    // res.send(token)
    store
        .add_function_call_arg(
            Pass::Transform, "src/app.ts", 3, "global", "res.send", 0, "token", "arg0", None,
        )
        .unwrap();
}

#[test]
fn env_entry_reaches_response_exit() {
    let mut store = RepoStore::create_in_memory().unwrap();
    seed_env_to_response(&mut store);
    let conn = store.finish().unwrap();
    let graph = GraphStore::create_in_memory().unwrap();
    build_graphs(&conn, &graph).unwrap();

    let registry = TaintRegistry::with_defaults();
    let mut resolver = FlowResolver::new(&conn, &graph, &registry).unwrap();
    let flows = resolver.resolve_all_flows().unwrap();
    assert!(flows >= 1, "expected at least one resolved flow");

    let (source_pattern, sink_pattern, status, engine): (String, String, String, String) = conn
        .query_row(
            "SELECT source_pattern, sink_pattern, status, engine
             FROM resolved_flow_audit LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .unwrap();
    assert_eq!(source_pattern, "process.env.TOKEN");
    assert_eq!(sink_pattern, "token");
    assert_eq!(status, "VULNERABLE");
    assert_eq!(engine, "FlowResolver");
}

#[test]
fn audit_rows_carry_a_json_hop_chain() {
    let mut store = RepoStore::create_in_memory().unwrap();
    seed_env_to_response(&mut store);
    let conn = store.finish().unwrap();
    let graph = GraphStore::create_in_memory().unwrap();
    build_graphs(&conn, &graph).unwrap();

    let registry = TaintRegistry::with_defaults();
    FlowResolver::new(&conn, &graph, &registry).unwrap().resolve_all_flows().unwrap();

    let path_json: String = conn
        .query_row("SELECT path_json FROM resolved_flow_audit LIMIT 1", [], |row| row.get(0))
        .unwrap();
    let hops: Vec<serde_json::Value> = serde_json::from_str(&path_json).unwrap();
    assert!(!hops.is_empty());
    // A dotted source expression is a field load.
    assert_eq!(hops[0]["type"], "field_load");
    assert_eq!(hops[0]["hop_number"], 0);
}

#[test]
fn one_row_per_flow_signature_keeping_the_shortest() {
    let mut store = RepoStore::create_in_memory().unwrap();
    seed_env_to_response(&mut store);

    // A longer alternative route to the same exit variable.
    store
        .add_assignment(Pass::Transform, "src/app.ts", 2, "tmp", "process.env.TOKEN", "global", None)
        .unwrap();
    store
        .add_assignment_source("src/app.ts", 2, "tmp", "process.env.TOKEN")
        .unwrap();
    store
        .add_assignment(Pass::Transform, "src/app.ts", 2, "token", "tmp", "global", None)
        .unwrap();
    store.add_assignment_source("src/app.ts", 2, "token", "tmp").unwrap();

    let conn = store.finish().unwrap();
    let graph = GraphStore::create_in_memory().unwrap();
    build_graphs(&conn, &graph).unwrap();

    let registry = TaintRegistry::with_defaults();
    FlowResolver::new(&conn, &graph, &registry).unwrap().resolve_all_flows().unwrap();

    let rows: Vec<(String, String, i64)> = {
        let mut stmt = conn
            .prepare(
                "SELECT source_pattern, sink_pattern, path_length FROM resolved_flow_audit
                 WHERE source_pattern = 'process.env.TOKEN' AND sink_pattern = 'token'",
            )
            .unwrap();
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap()
            .map(Result::unwrap)
            .collect()
    };
    assert_eq!(rows.len(), 1, "duplicate signatures must collapse");
    assert_eq!(rows[0].2, 1, "the shortest path wins");
}

#[test]
fn resolution_is_deterministic() {
    let run = || {
        let mut store = RepoStore::create_in_memory().unwrap();
        seed_env_to_response(&mut store);
        let conn = store.finish().unwrap();
        let graph = GraphStore::create_in_memory().unwrap();
        build_graphs(&conn, &graph).unwrap();
        let registry = TaintRegistry::with_defaults();
        FlowResolver::new(&conn, &graph, &registry).unwrap().resolve_all_flows().unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT source_file, source_pattern, sink_file, sink_pattern, status,
                        path_length, path_json
                 FROM resolved_flow_audit ORDER BY id",
            )
            .unwrap();
        let rows: Vec<String> = stmt
            .query_map([], |row| {
                Ok(format!(
                    "{}|{}|{}|{}|{}|{}|{}",
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .unwrap()
            .map(Result::unwrap)
            .collect();
        rows
    };
    assert_eq!(run(), run());
}
