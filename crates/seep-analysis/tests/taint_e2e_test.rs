//! End-to-end taint scenarios over seeded relational facts: store →
//! graph builder → IFDS backward engine.

use seep_analysis::graph::build_graphs;
use seep_analysis::taint::{FlowEndpoint, FlowStatus, IfdsAnalyzer, TaintRegistry};
use seep_core::config::TaintConfig;
use seep_storage::batch::{Pass, RepoStore};
use seep_storage::GraphStore;

fn analyzer_inputs(store: RepoStore) -> (rusqlite::Connection, GraphStore) {
    let conn = store.finish().unwrap();
    let graph = GraphStore::create_in_memory().unwrap();
    build_graphs(&conn, &graph).unwrap();
    (conn, graph)
}

/// Controller reading `req.params.id` into a template query passed to
/// `db.query`, registered from a routes file.
fn seed_sql_injection(store: &mut RepoStore) {
    store.add_file("src/routes.ts", "r1", ".ts", 100, 10).unwrap();
    store.add_file("src/controller.ts", "c1", ".ts", 200, 12).unwrap();

    store
        .add_symbol(
            Pass::Transform,
            "src/controller.ts",
            "getUser",
            "function",
            1,
            0,
            Some(10),
            None,
            Some(r#"[{"name":"req"},{"name":"res"}]"#),
        )
        .unwrap();

    // const id = req.params.id
    store
        .add_assignment(Pass::Transform, "src/controller.ts", 2, "id", "req.params.id", "getUser", None)
        .unwrap();
    store
        .add_assignment_source("src/controller.ts", 2, "id", "req.params.id")
        .unwrap();
    // const query = `SELECT * FROM u WHERE id=${id}`
    store
        .add_assignment(
            Pass::Transform,
            "src/controller.ts",
            3,
            "query",
            "`SELECT * FROM u WHERE id=${id}`",
            "getUser",
            None,
        )
        .unwrap();
    store.add_assignment_source("src/controller.ts", 3, "query", "id").unwrap();

    // db.query(query)
    store
        .add_function_call_arg(
            Pass::Transform,
            "src/controller.ts",
            4,
            "getUser",
            "db.query",
            0,
            "query",
            "arg0",
            None,
        )
        .unwrap();

    // Route registration binds the request object into the controller.
    store
        .add_function_call_arg(
            Pass::Transform,
            "src/routes.ts",
            5,
            "global",
            "getUser",
            0,
            "req",
            "req",
            Some("src/controller.ts"),
        )
        .unwrap();
    store
        .add_middleware_chain_entry(
            "src/routes.ts",
            5,
            "/users/:id",
            "GET",
            0,
            "getUser",
            "controller",
            Some("getUser"),
            Some("src/controller.ts"),
        )
        .unwrap();
}

#[test]
fn sql_injection_via_express_route() {
    let mut store = RepoStore::create_in_memory().unwrap();
    seed_sql_injection(&mut store);
    let (conn, graph) = analyzer_inputs(store);

    let registry = TaintRegistry::with_defaults();
    let analyzer =
        IfdsAnalyzer::new(&conn, &graph, &registry, &TaintConfig::default()).unwrap();

    let sink = FlowEndpoint::new("src/controller.ts", 4, "query", "db.query");
    let sources = vec![FlowEndpoint::new(
        "src/controller.ts",
        2,
        "req.params.id",
        "req.params.id",
    )];

    let (vulnerable, sanitized) = analyzer.analyze_sink_to_sources(&sink, &sources).unwrap();
    assert!(sanitized.is_empty());
    assert!(!vulnerable.is_empty(), "expected a vulnerable path");

    let finding = &vulnerable[0];
    assert_eq!(finding.vulnerability_type, "SQL Injection");
    assert_eq!(finding.status, FlowStatus::Vulnerable);

    let hop_types: Vec<&str> =
        finding.hops.iter().map(|h| h.edge_type.as_str()).collect();
    assert!(
        hop_types.contains(&"parameter_call"),
        "expected parameter_call hop, got {hop_types:?}"
    );
    assert!(
        hop_types.contains(&"assignment_reverse"),
        "expected assignment_reverse hop, got {hop_types:?}"
    );
}

#[test]
fn vulnerable_findings_never_cross_a_sanitizer() {
    let mut store = RepoStore::create_in_memory().unwrap();
    seed_sql_injection(&mut store);
    let (conn, graph) = analyzer_inputs(store);

    let registry = TaintRegistry::with_defaults();
    let analyzer =
        IfdsAnalyzer::new(&conn, &graph, &registry, &TaintConfig::default()).unwrap();

    let sink = FlowEndpoint::new("src/controller.ts", 4, "query", "db.query");
    let (vulnerable, _) = analyzer.analyze_sink_to_sources(&sink, &[]).unwrap();

    for finding in &vulnerable {
        assert!(finding.sanitizer_file.is_none());
        assert!(finding.sanitizer_line.is_none());
        assert!(finding.sanitizer_method.is_none());
    }
}

#[test]
fn validated_route_is_sanitized_with_anchor_metadata() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_file("src/routes.ts", "r1", ".ts", 100, 10).unwrap();
    store.add_file("src/controller.ts", "c1", ".ts", 200, 12).unwrap();

    store
        .add_symbol(
            Pass::Transform,
            "src/controller.ts",
            "sendMsg",
            "function",
            1,
            0,
            Some(10),
            None,
            Some(r#"[{"name":"req"},{"name":"res"}]"#),
        )
        .unwrap();

    // Route: validateBody(Schema) then the controller.
    store
        .add_middleware_chain_entry(
            "src/routes.ts",
            5,
            "/messages",
            "POST",
            0,
            "validateBody(Schema)",
            "middleware",
            Some("validateBody"),
            None,
        )
        .unwrap();
    store
        .add_middleware_chain_entry(
            "src/routes.ts",
            5,
            "/messages",
            "POST",
            1,
            "sendMsg",
            "controller",
            Some("sendMsg"),
            Some("src/controller.ts"),
        )
        .unwrap();
    store
        .add_validation_usage("src/routes.ts", 5, "validate", "validateBody", "Schema", true, Some("Schema"))
        .unwrap();

    // res.send(req.body.msg)
    store
        .add_function_call_arg(
            Pass::Transform,
            "src/controller.ts",
            3,
            "sendMsg",
            "res.send",
            0,
            "req.body.msg",
            "arg0",
            None,
        )
        .unwrap();

    let (conn, graph) = analyzer_inputs(store);
    let registry = TaintRegistry::with_defaults();
    let analyzer =
        IfdsAnalyzer::new(&conn, &graph, &registry, &TaintConfig::default()).unwrap();

    let sink = FlowEndpoint::new("src/controller.ts", 3, "req.body.msg", "res.send");
    let (vulnerable, sanitized) = analyzer.analyze_sink_to_sources(&sink, &[]).unwrap();

    assert!(vulnerable.is_empty(), "validation middleware should kill the taint");
    assert!(!sanitized.is_empty(), "expected a sanitized finding");

    let finding = &sanitized[0];
    assert_eq!(finding.status, FlowStatus::Sanitized);
    assert_eq!(finding.vulnerability_type, "Cross-Site Scripting (XSS)");
    assert_eq!(finding.sanitizer_method.as_deref(), Some("validate:Schema"));
    // The reported line is the validation anchor's own line.
    assert_eq!(finding.sanitizer_line, Some(5));
}

#[test]
fn cross_file_flow_carries_parameter_and_return_hops() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_file("src/service.ts", "s1", ".ts", 100, 10).unwrap();
    store.add_file("src/repository.ts", "p1", ".ts", 120, 10).unwrap();
    store.add_file("src/helpers.ts", "h1", ".ts", 80, 8).unwrap();

    for (file, name, params) in [
        ("src/service.ts", "handle", r#"[{"name":"req"},{"name":"res"}]"#),
        ("src/repository.ts", "findUser", r#"[{"name":"name"}]"#),
        ("src/helpers.ts", "sqlFor", r#"[{"name":"n"}]"#),
    ] {
        store
            .add_symbol(Pass::Transform, file, name, "function", 1, 0, Some(10), None, Some(params))
            .unwrap();
    }

    // service: input = req.body.name; repo.findUser(input)
    store
        .add_assignment(Pass::Transform, "src/service.ts", 2, "input", "req.body.name", "handle", None)
        .unwrap();
    store
        .add_assignment_source("src/service.ts", 2, "input", "req.body.name")
        .unwrap();
    store
        .add_function_call_arg(
            Pass::Transform,
            "src/service.ts",
            3,
            "handle",
            "repo.findUser",
            0,
            "input",
            "name",
            Some("src/repository.ts"),
        )
        .unwrap();

    // repository: sql = sqlFor(name); db.query(sql)
    store
        .add_assignment(Pass::Transform, "src/repository.ts", 2, "sql", "sqlFor(name)", "findUser", None)
        .unwrap();
    store
        .add_function_call_arg(
            Pass::Transform,
            "src/repository.ts",
            2,
            "findUser",
            "sqlFor",
            0,
            "name",
            "n",
            Some("src/helpers.ts"),
        )
        .unwrap();
    store
        .add_function_call_arg(
            Pass::Transform,
            "src/repository.ts",
            3,
            "findUser",
            "db.query",
            0,
            "sql",
            "arg0",
            None,
        )
        .unwrap();

    // helpers: s = `…${n}`; return s
    store
        .add_assignment(
            Pass::Transform,
            "src/helpers.ts",
            2,
            "s",
            "`SELECT * FROM users WHERE name=${n}`",
            "sqlFor",
            None,
        )
        .unwrap();
    store.add_assignment_source("src/helpers.ts", 2, "s", "n").unwrap();
    store
        .add_function_return(Pass::Transform, "src/helpers.ts", 3, "sqlFor", "s")
        .unwrap();
    store
        .add_function_return_source("src/helpers.ts", 3, "sqlFor", "s")
        .unwrap();

    let (conn, graph) = analyzer_inputs(store);
    let registry = TaintRegistry::with_defaults();
    let analyzer =
        IfdsAnalyzer::new(&conn, &graph, &registry, &TaintConfig::default()).unwrap();

    let sink = FlowEndpoint::new("src/repository.ts", 3, "sql", "db.query");
    let sources = vec![FlowEndpoint::new(
        "src/service.ts",
        2,
        "req.body.name",
        "req.body.name",
    )];
    let (vulnerable, _) = analyzer.analyze_sink_to_sources(&sink, &sources).unwrap();
    assert!(!vulnerable.is_empty(), "expected a cross-file vulnerable path");

    let finding = vulnerable
        .iter()
        .max_by_key(|f| f.hops.len())
        .unwrap();
    assert!(finding.hops.len() >= 4, "expected ≥4 hops, got {}", finding.hops.len());
    let hop_types: Vec<&str> =
        finding.hops.iter().map(|h| h.edge_type.as_str()).collect();
    assert!(hop_types.contains(&"parameter_call"), "{hop_types:?}");
    assert!(hop_types.contains(&"return_to_caller"), "{hop_types:?}");
}

#[test]
fn deep_field_chains_are_k_limited_without_explosion() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_file("src/deep.ts", "d1", ".ts", 50, 5).unwrap();
    store
        .add_symbol(
            Pass::Transform,
            "src/deep.ts",
            "f",
            "function",
            1,
            0,
            Some(9),
            None,
            Some(r#"[{"name":"x"}]"#),
        )
        .unwrap();

    // a.b.c.d.e.f.g = x
    store
        .add_assignment(
            Pass::Transform,
            "src/deep.ts",
            2,
            "a",
            "x",
            "f",
            Some("a.b.c.d.e.f.g"),
        )
        .unwrap();
    store.add_assignment_source("src/deep.ts", 2, "a", "x").unwrap();
    store
        .add_function_call_arg(Pass::Transform, "src/deep.ts", 3, "f", "db.query", 0, "a.b.c.d.e.f.g", "arg0", None)
        .unwrap();

    let (conn, graph) = analyzer_inputs(store);
    let registry = TaintRegistry::with_defaults();
    let analyzer =
        IfdsAnalyzer::new(&conn, &graph, &registry, &TaintConfig::default()).unwrap();

    let sink = FlowEndpoint::new("src/deep.ts", 3, "a.b.c.d.e.f.g", "db.query");
    let sources = vec![FlowEndpoint::new("src/deep.ts", 2, "x", "x")];
    let (vulnerable, sanitized) = analyzer.analyze_sink_to_sources(&sink, &sources).unwrap();

    // Terminates, no path explosion, and nothing tracked beyond the
    // k-limit.
    assert!(vulnerable.len() + sanitized.len() <= 1);
    for finding in vulnerable.iter().chain(sanitized.iter()) {
        for hop in &finding.hops {
            for node in [&hop.from, &hop.to] {
                if let Some(ap) = seep_analysis::taint::AccessPath::parse(node) {
                    assert!(ap.fields().len() <= 5, "over-limit path {node}");
                }
            }
        }
    }
}

#[test]
fn handler_table_dispatch_resolves_through_object_literals() {
    let mut store = RepoStore::create_in_memory().unwrap();
    store.add_file("src/dispatch.ts", "d1", ".ts", 80, 8).unwrap();
    store.add_file("src/handlers.ts", "h1", ".ts", 90, 9).unwrap();

    store
        .add_symbol(
            Pass::Transform,
            "src/handlers.ts",
            "createUser",
            "function",
            1,
            0,
            Some(8),
            None,
            Some(r#"[{"name":"payload"}]"#),
        )
        .unwrap();

    // const handlers = { create: createUser }
    store
        .add_object_literal(
            "src/dispatch.ts", 2, "handlers", "create", "createUser", "function_ref", "global",
        )
        .unwrap();

    // input = req.body; handlers.create(input)
    store
        .add_assignment(Pass::Transform, "src/dispatch.ts", 4, "input", "req.body", "route", None)
        .unwrap();
    store.add_assignment_source("src/dispatch.ts", 4, "input", "req.body").unwrap();
    store
        .add_function_call_arg(
            Pass::Transform, "src/dispatch.ts", 5, "route", "handlers.create", 0, "input",
            "payload", None,
        )
        .unwrap();

    // createUser: db.query(payload)
    store
        .add_function_call_arg(
            Pass::Transform, "src/handlers.ts", 3, "createUser", "db.query", 0, "payload",
            "arg0", None,
        )
        .unwrap();

    let (conn, graph) = analyzer_inputs(store);
    let registry = TaintRegistry::with_defaults();
    let analyzer =
        IfdsAnalyzer::new(&conn, &graph, &registry, &TaintConfig::default()).unwrap();

    let sink = FlowEndpoint::new("src/handlers.ts", 3, "payload", "db.query");
    let sources =
        vec![FlowEndpoint::new("src/dispatch.ts", 4, "req.body", "req.body")];
    let (vulnerable, _) = analyzer.analyze_sink_to_sources(&sink, &sources).unwrap();

    assert!(!vulnerable.is_empty(), "dispatch through the handler table should bind");
    let hop_types: Vec<&str> =
        vulnerable[0].hops.iter().map(|h| h.edge_type.as_str()).collect();
    assert!(hop_types.contains(&"parameter_call"), "{hop_types:?}");
}

#[test]
fn findings_are_deterministic_across_runs() {
    let run = || {
        let mut store = RepoStore::create_in_memory().unwrap();
        seed_sql_injection(&mut store);
        let (conn, graph) = analyzer_inputs(store);
        let registry = TaintRegistry::with_defaults();
        let analyzer =
            IfdsAnalyzer::new(&conn, &graph, &registry, &TaintConfig::default()).unwrap();
        let sink = FlowEndpoint::new("src/controller.ts", 4, "query", "db.query");
        let sources = vec![FlowEndpoint::new(
            "src/controller.ts",
            2,
            "req.params.id",
            "req.params.id",
        )];
        let (vulnerable, sanitized) =
            analyzer.analyze_sink_to_sources(&sink, &sources).unwrap();
        (
            serde_json::to_string(&vulnerable).unwrap(),
            serde_json::to_string(&sanitized).unwrap(),
        )
    };

    assert_eq!(run(), run());
}
