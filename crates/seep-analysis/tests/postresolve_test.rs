//! Post-resolution pass tests: parameter names, mount hierarchy,
//! handler files, import paths, and idempotency.

use seep_analysis::indexer::postresolve;
use seep_storage::batch::{Pass, RepoStore};

#[test]
fn generic_parameter_names_resolve_from_declarations() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_file("svc.ts", "a", ".ts", 1, 1).unwrap();
    store
        .add_symbol(
            Pass::Transform,
            "svc.ts",
            "process",
            "function",
            1,
            0,
            Some(8),
            None,
            Some(r#"[{"name":"data"},{"name":"options"}]"#),
        )
        .unwrap();
    store
        .add_function_call_arg(
            Pass::Transform, "caller.ts", 5, "run", "process", 0, "payload", "arg0",
            Some("svc.ts"),
        )
        .unwrap();
    store
        .add_function_call_arg(
            Pass::Transform, "caller.ts", 5, "run", "process", 1, "{}", "arg1",
            Some("svc.ts"),
        )
        .unwrap();

    let conn = store.finish().unwrap();
    let mut ambiguous = Vec::new();
    let resolved = postresolve::resolve_parameter_names(&conn, &mut ambiguous).unwrap();
    assert_eq!(resolved, 2);
    assert!(ambiguous.is_empty());

    let names: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT param_name FROM function_call_args ORDER BY argument_index")
            .unwrap();
        stmt.query_map([], |row| row.get(0)).unwrap().map(Result::unwrap).collect()
    };
    assert_eq!(names, ["data", "options"]);
}

#[test]
fn ambiguous_declarations_are_skipped_and_reported() {
    let mut store = RepoStore::create_in_memory().unwrap();
    for file in ["a.ts", "b.ts"] {
        store
            .add_symbol(
                Pass::Transform, file, "handler", "function", 1, 0, Some(4), None,
                Some(r#"[{"name":"x"}]"#),
            )
            .unwrap();
    }
    store
        .add_function_call_arg(
            Pass::Transform, "caller.ts", 3, "run", "handler", 0, "v", "arg0", None,
        )
        .unwrap();

    let conn = store.finish().unwrap();
    let mut ambiguous = Vec::new();
    let resolved = postresolve::resolve_parameter_names(&conn, &mut ambiguous).unwrap();
    assert_eq!(resolved, 0);
    assert_eq!(ambiguous.len(), 1);

    let name: String = conn
        .query_row("SELECT param_name FROM function_call_args", [], |row| row.get(0))
        .unwrap();
    assert_eq!(name, "arg0");
}

#[test]
fn mount_prefixes_stamp_endpoint_full_paths() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_file("src/app.ts", "a", ".ts", 1, 1).unwrap();
    store.add_file("src/user.routes.ts", "b", ".ts", 1, 1).unwrap();

    // const API_PREFIX = '/api/v1'; app.use(`${API_PREFIX}/users`, userRoutes)
    store
        .add_assignment(
            Pass::Transform, "src/app.ts", 1, "API_PREFIX", "'/api/v1'", "global", None,
        )
        .unwrap();
    store
        .add_import_style(
            "src/app.ts", 2, "./user.routes", "default", None, Some("userRoutes"),
        )
        .unwrap();
    store
        .add_router_mount("src/app.ts", 4, "`${API_PREFIX}/users`", "userRoutes", false)
        .unwrap();
    store
        .add_api_endpoint(
            "src/user.routes.ts", 7, "GET", "/:id", "/:id", None, false, "getUser",
        )
        .unwrap();

    let conn = store.finish().unwrap();
    let updated = postresolve::resolve_router_mounts(&conn).unwrap();
    assert_eq!(updated, 1);

    let full_path: String = conn
        .query_row("SELECT full_path FROM api_endpoints", [], |row| row.get(0))
        .unwrap();
    assert_eq!(full_path, "/api/v1/users/:id");
}

#[test]
fn handler_files_resolve_through_imports() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_file("src/routes/user.routes.ts", "a", ".ts", 1, 1).unwrap();
    store.add_file("src/controllers/user.controller.ts", "b", ".ts", 1, 1).unwrap();

    store
        .add_import_style(
            "src/routes/user.routes.ts",
            1,
            "../controllers/user.controller",
            "named",
            Some("controller"),
            None,
        )
        .unwrap();
    store
        .add_import_specifier("src/routes/user.routes.ts", 1, "controller")
        .unwrap();
    store
        .add_middleware_chain_entry(
            "src/routes/user.routes.ts",
            6,
            "/users",
            "POST",
            0,
            "handler(controller.create)",
            "controller",
            Some("handler(controller.create)"),
            None,
        )
        .unwrap();

    let conn = store.finish().unwrap();
    let mut ambiguous = Vec::new();
    let resolved = postresolve::resolve_handler_files(&conn, &mut ambiguous).unwrap();
    assert_eq!(resolved, 1);

    let handler_file: String = conn
        .query_row("SELECT handler_file FROM express_middleware_chains", [], |row| row.get(0))
        .unwrap();
    assert_eq!(handler_file, "src/controllers/user.controller.ts");
}

#[test]
fn relative_imports_resolve_to_canonical_paths() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_file("src/a.ts", "a", ".ts", 1, 1).unwrap();
    store.add_file("src/lib/util.ts", "b", ".ts", 1, 1).unwrap();
    store.add_ref("src/a.ts", "import", "./lib/util", Some(1)).unwrap();
    store
        .add_import_style("src/a.ts", 1, "./lib/util", "named", Some("helper"), None)
        .unwrap();

    let conn = store.finish().unwrap();
    let resolved = postresolve::resolve_import_paths(&conn).unwrap();
    assert_eq!(resolved, 2);

    let value: String =
        conn.query_row("SELECT value FROM refs", [], |row| row.get(0)).unwrap();
    assert_eq!(value, "src/lib/util.ts");
    let package: String = conn
        .query_row("SELECT package FROM import_styles", [], |row| row.get(0))
        .unwrap();
    assert_eq!(package, "src/lib/util.ts");
}

#[test]
fn reruns_are_idempotent() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_file("src/a.ts", "a", ".ts", 1, 1).unwrap();
    store.add_file("src/lib/util.ts", "b", ".ts", 1, 1).unwrap();
    store.add_ref("src/a.ts", "import", "./lib/util", Some(1)).unwrap();

    let conn = store.finish().unwrap();
    postresolve::run_all(&conn).unwrap();
    let first: String =
        conn.query_row("SELECT value FROM refs", [], |row| row.get(0)).unwrap();

    postresolve::run_all(&conn).unwrap();
    let second: String =
        conn.query_row("SELECT value FROM refs", [], |row| row.get(0)).unwrap();
    assert_eq!(first, second);
}
