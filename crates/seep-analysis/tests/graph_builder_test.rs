//! Graph builder tests: every flow primitive projects to forward plus
//! reverse edges, and cross-boundary matching obeys URL normalization.

use seep_analysis::graph::build_graphs;
use seep_storage::batch::{Pass, RepoStore};
use seep_storage::GraphStore;

fn edge_exists(graph: &GraphStore, source: &str, target: &str, edge_type: &str) -> bool {
    graph
        .conn()
        .query_row(
            "SELECT COUNT(*) FROM edges WHERE source = ?1 AND target = ?2 AND type = ?3",
            rusqlite::params![source, target, edge_type],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
        > 0
}

#[test]
fn assignments_emit_forward_and_reverse_edges() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_file("a.ts", "a", ".ts", 1, 1).unwrap();
    store
        .add_assignment(Pass::Transform, "a.ts", 2, "x", "req.body", "f", None)
        .unwrap();
    store.add_assignment_source("a.ts", 2, "x", "req.body").unwrap();

    let conn = store.finish().unwrap();
    let graph = GraphStore::create_in_memory().unwrap();
    build_graphs(&conn, &graph).unwrap();

    // Dotted source is a field load.
    assert!(edge_exists(&graph, "a.ts::f::req.body", "a.ts::f::x", "field_load"));
    assert!(edge_exists(&graph, "a.ts::f::x", "a.ts::f::req.body", "field_load_reverse"));
}

#[test]
fn field_stores_keep_the_base_object_flowing() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_file("a.ts", "a", ".ts", 1, 1).unwrap();
    store
        .add_assignment(Pass::Transform, "a.ts", 4, "user", "payload", "f", Some("user.name"))
        .unwrap();
    store.add_assignment_source("a.ts", 4, "user", "payload").unwrap();

    let conn = store.finish().unwrap();
    let graph = GraphStore::create_in_memory().unwrap();
    build_graphs(&conn, &graph).unwrap();

    assert!(edge_exists(&graph, "a.ts::f::payload", "a.ts::f::user.name", "field_store"));
    assert!(edge_exists(&graph, "a.ts::f::user", "a.ts::f::user.name", "field_store_pass"));
    assert!(edge_exists(
        &graph,
        "a.ts::f::user.name",
        "a.ts::f::payload",
        "field_store_reverse"
    ));
}

#[test]
fn resolved_call_args_bridge_files_in_both_partitions() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_file("caller.ts", "a", ".ts", 1, 1).unwrap();
    store.add_file("callee.ts", "b", ".ts", 1, 1).unwrap();
    store
        .add_function_call_arg(
            Pass::Transform,
            "caller.ts",
            5,
            "run",
            "svc.process",
            0,
            "payload",
            "data",
            Some("callee.ts"),
        )
        .unwrap();

    let conn = store.finish().unwrap();
    let graph = GraphStore::create_in_memory().unwrap();
    build_graphs(&conn, &graph).unwrap();

    let arg = "caller.ts::run::payload";
    let param = "callee.ts::process::data";
    assert!(edge_exists(&graph, arg, param, "call_argument"));
    assert!(edge_exists(&graph, param, arg, "call_argument_reverse"));

    // The call partition carries the same binding for backward lookups.
    let call_edges: i64 = graph
        .conn()
        .query_row(
            "SELECT COUNT(*) FROM edges
             WHERE source = ?1 AND target = ?2 AND graph_type = 'call'",
            rusqlite::params![arg, param],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(call_edges, 1);
}

#[test]
fn middleware_chains_link_consecutive_handlers() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_file("routes.ts", "r", ".ts", 1, 1).unwrap();
    store
        .add_middleware_chain_entry(
            "routes.ts", 9, "/x", "POST", 0, "authenticate", "middleware",
            Some("authenticate"), None,
        )
        .unwrap();
    store
        .add_middleware_chain_entry(
            "routes.ts", 9, "/x", "POST", 1, "createX", "controller",
            Some("createX"), Some("controller.ts"),
        )
        .unwrap();

    let conn = store.finish().unwrap();
    let graph = GraphStore::create_in_memory().unwrap();
    build_graphs(&conn, &graph).unwrap();

    assert!(edge_exists(
        &graph,
        "routes.ts::authenticate::req",
        "controller.ts::createX::req",
        "express_middleware_chain"
    ));
}

#[test]
fn cross_boundary_matches_template_urls_to_route_params() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_file("web/api.ts", "w", ".ts", 1, 1).unwrap();
    store.add_file("server/routes.ts", "s", ".ts", 1, 1).unwrap();

    store
        .add_frontend_api_call(
            "web/api.ts",
            12,
            "POST",
            "`/api/users/${userId}`",
            Some("body"),
            "saveUser",
        )
        .unwrap();
    store
        .add_api_endpoint(
            "server/routes.ts",
            4,
            "POST",
            "/users/:id",
            "/users/:id",
            None,
            false,
            "updateUser",
        )
        .unwrap();

    let conn = store.finish().unwrap();
    let graph = GraphStore::create_in_memory().unwrap();
    build_graphs(&conn, &graph).unwrap();

    assert!(edge_exists(
        &graph,
        "web/api.ts::saveUser::body",
        "server/routes.ts::updateUser::req.body",
        "cross_boundary_api"
    ));
}

#[test]
fn mismatched_methods_do_not_bridge() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_file("web/api.ts", "w", ".ts", 1, 1).unwrap();
    store.add_file("server/routes.ts", "s", ".ts", 1, 1).unwrap();

    store
        .add_frontend_api_call("web/api.ts", 12, "GET", "/users/1", Some("body"), "load")
        .unwrap();
    store
        .add_api_endpoint(
            "server/routes.ts", 4, "POST", "/users/:id", "/users/:id", None, false, "update",
        )
        .unwrap();

    let conn = store.finish().unwrap();
    let graph = GraphStore::create_in_memory().unwrap();
    build_graphs(&conn, &graph).unwrap();

    let count: i64 = graph
        .conn()
        .query_row(
            "SELECT COUNT(*) FROM edges WHERE type = 'cross_boundary_api'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(count, 0);
}
