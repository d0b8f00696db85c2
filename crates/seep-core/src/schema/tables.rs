//! The table catalog.
//!
//! Ordering is flush order: parents precede the junction tables that
//! reference them by natural key, so a full-batch flush never writes a
//! child row before its parent.

use super::{ColumnSpec, ColumnType, TableSpec};

const fn text(name: &'static str) -> ColumnSpec {
    ColumnSpec { name, ty: ColumnType::Text, nullable: false }
}

const fn text_null(name: &'static str) -> ColumnSpec {
    ColumnSpec { name, ty: ColumnType::Text, nullable: true }
}

const fn int(name: &'static str) -> ColumnSpec {
    ColumnSpec { name, ty: ColumnType::Integer, nullable: false }
}

const fn int_null(name: &'static str) -> ColumnSpec {
    ColumnSpec { name, ty: ColumnType::Integer, nullable: true }
}

static TABLES: &[TableSpec] = &[
    TableSpec {
        name: "schema_meta",
        columns: &[text("key"), text("value")],
        primary_key: &["key"],
        indexes: &[],
        auto_id: false,
    },
    TableSpec {
        name: "files",
        columns: &[text("path"), text("sha256"), text("ext"), int("bytes"), int("loc")],
        primary_key: &["path"],
        indexes: &[],
        auto_id: false,
    },
    TableSpec {
        name: "config_files",
        columns: &[text("path"), text("content"), text("type"), text_null("context_dir")],
        primary_key: &["path"],
        indexes: &[],
        auto_id: false,
    },
    TableSpec {
        name: "refs",
        columns: &[text("src"), text("kind"), text("value"), int_null("line")],
        primary_key: &[],
        indexes: &[("idx_refs_src", &["src"])],
        auto_id: false,
    },
    TableSpec {
        name: "import_styles",
        columns: &[
            text("file"),
            int("line"),
            text("package"),
            text("style"),
            text_null("names"),
            text_null("alias"),
        ],
        primary_key: &[],
        indexes: &[("idx_import_styles_file", &["file"])],
        auto_id: false,
    },
    TableSpec {
        name: "import_specifiers",
        columns: &[text("file"), int("import_line"), text("specifier_name")],
        primary_key: &[],
        indexes: &[("idx_import_specifiers_file", &["file"])],
        auto_id: false,
    },
    TableSpec {
        name: "symbols",
        columns: &[
            text("path"),
            text("name"),
            text("kind"),
            int("line"),
            int("col"),
            int_null("end_line"),
            text_null("type_annotation"),
            text_null("parameters_json"),
        ],
        primary_key: &[],
        indexes: &[
            ("idx_symbols_path_line", &["path", "line"]),
            ("idx_symbols_name", &["name"]),
        ],
        auto_id: false,
    },
    TableSpec {
        name: "symbols_jsx",
        columns: &[
            text("path"),
            text("name"),
            text("kind"),
            int("line"),
            int("col"),
            int_null("end_line"),
            text_null("type_annotation"),
            text_null("parameters_json"),
        ],
        primary_key: &[],
        indexes: &[("idx_symbols_jsx_path_line", &["path", "line"])],
        auto_id: false,
    },
    TableSpec {
        name: "assignments",
        columns: &[
            text("file"),
            int("line"),
            text("target_var"),
            text("source_expr"),
            text("in_function"),
            text_null("property_path"),
        ],
        primary_key: &[],
        indexes: &[("idx_assignments_file_line", &["file", "line"])],
        auto_id: false,
    },
    TableSpec {
        name: "assignment_sources",
        columns: &[text("file"), int("line"), text("target_var"), text("source_var_name")],
        primary_key: &[],
        indexes: &[("idx_assignment_sources_file", &["file", "source_var_name"])],
        auto_id: false,
    },
    TableSpec {
        name: "function_call_args",
        columns: &[
            text("file"),
            int("line"),
            text("caller_function"),
            text("callee_function"),
            int("argument_index"),
            text("argument_expr"),
            text("param_name"),
            text_null("callee_file_path"),
        ],
        primary_key: &[],
        indexes: &[
            ("idx_call_args_file_line", &["file", "line"]),
            ("idx_call_args_callee", &["callee_file_path", "callee_function", "param_name"]),
        ],
        auto_id: false,
    },
    TableSpec {
        name: "function_returns",
        columns: &[text("file"), int("line"), text("function_name"), text("return_expr")],
        primary_key: &[],
        indexes: &[("idx_returns_file_function", &["file", "function_name"])],
        auto_id: false,
    },
    TableSpec {
        name: "function_return_sources",
        columns: &[
            text("return_file"),
            int("return_line"),
            text("return_function"),
            text("return_var_name"),
        ],
        primary_key: &[],
        indexes: &[("idx_return_sources_file", &["return_file", "return_function"])],
        auto_id: false,
    },
    TableSpec {
        name: "assignments_jsx",
        columns: &[
            text("file"),
            int("line"),
            text("target_var"),
            text("source_expr"),
            text("in_function"),
            text_null("property_path"),
        ],
        primary_key: &[],
        indexes: &[("idx_assignments_jsx_file_line", &["file", "line"])],
        auto_id: false,
    },
    TableSpec {
        name: "function_call_args_jsx",
        columns: &[
            text("file"),
            int("line"),
            text("caller_function"),
            text("callee_function"),
            int("argument_index"),
            text("argument_expr"),
            text("param_name"),
            text_null("callee_file_path"),
        ],
        primary_key: &[],
        indexes: &[("idx_call_args_jsx_file_line", &["file", "line"])],
        auto_id: false,
    },
    TableSpec {
        name: "function_returns_jsx",
        columns: &[text("file"), int("line"), text("function_name"), text("return_expr")],
        primary_key: &[],
        indexes: &[],
        auto_id: false,
    },
    TableSpec {
        name: "cfg_blocks",
        columns: &[
            text("file"),
            text("function_name"),
            text("block_type"),
            int("start_line"),
            int("end_line"),
            text_null("condition_expr"),
        ],
        primary_key: &[],
        indexes: &[("idx_cfg_blocks_file", &["file", "function_name"])],
        auto_id: true,
    },
    TableSpec {
        name: "cfg_edges",
        columns: &[int("source_block_id"), int("target_block_id"), text("edge_type")],
        primary_key: &[],
        indexes: &[("idx_cfg_edges_source", &["source_block_id"])],
        auto_id: false,
    },
    TableSpec {
        name: "cfg_block_statements",
        columns: &[int("block_id"), text("statement_type"), int("line"), text_null("statement_text")],
        primary_key: &[],
        indexes: &[("idx_cfg_statements_block", &["block_id"])],
        auto_id: false,
    },
    TableSpec {
        name: "cfg_blocks_jsx",
        columns: &[
            text("file"),
            text("function_name"),
            text("block_type"),
            int("start_line"),
            int("end_line"),
            text_null("condition_expr"),
        ],
        primary_key: &[],
        indexes: &[],
        auto_id: true,
    },
    TableSpec {
        name: "cfg_edges_jsx",
        columns: &[int("source_block_id"), int("target_block_id"), text("edge_type")],
        primary_key: &[],
        indexes: &[],
        auto_id: false,
    },
    TableSpec {
        name: "cfg_block_statements_jsx",
        columns: &[int("block_id"), text("statement_type"), int("line"), text_null("statement_text")],
        primary_key: &[],
        indexes: &[],
        auto_id: false,
    },
    TableSpec {
        name: "api_endpoints",
        columns: &[
            text("file"),
            int("line"),
            text("method"),
            text("pattern"),
            text("path"),
            text_null("full_path"),
            int("has_auth"),
            text("handler_function"),
        ],
        primary_key: &[],
        indexes: &[("idx_api_endpoints_file", &["file"])],
        auto_id: false,
    },
    TableSpec {
        name: "api_endpoint_controls",
        columns: &[text("file"), int("line"), text("control_name")],
        primary_key: &[],
        indexes: &[("idx_endpoint_controls_file", &["file", "line"])],
        auto_id: false,
    },
    TableSpec {
        name: "router_mounts",
        columns: &[
            text("file"),
            int("line"),
            text("mount_path_expr"),
            text("router_variable"),
            int("is_literal"),
        ],
        primary_key: &[],
        indexes: &[],
        auto_id: false,
    },
    TableSpec {
        name: "express_middleware_chains",
        columns: &[
            text("file"),
            int("route_line"),
            text("route_path"),
            text("route_method"),
            int("execution_order"),
            text("handler_expr"),
            text("handler_type"),
            text_null("handler_function"),
            text_null("handler_file"),
        ],
        primary_key: &[],
        indexes: &[("idx_middleware_chains_file", &["file", "route_line"])],
        auto_id: false,
    },
    TableSpec {
        name: "frameworks",
        columns: &[text("name"), text("language"), text("path")],
        primary_key: &["name", "path"],
        indexes: &[],
        auto_id: false,
    },
    TableSpec {
        name: "framework_safe_sinks",
        columns: &[
            text("framework_id"),
            text("sink_pattern"),
            text("sink_type"),
            int("is_safe"),
            text("reason"),
        ],
        primary_key: &[],
        indexes: &[("idx_safe_sinks_pattern", &["sink_pattern"])],
        auto_id: false,
    },
    TableSpec {
        name: "framework_taint_patterns",
        columns: &[text("framework_id"), text("pattern"), text("direction"), text("category")],
        primary_key: &[],
        indexes: &[],
        auto_id: false,
    },
    TableSpec {
        name: "validation_framework_usage",
        columns: &[
            text("file_path"),
            int("line"),
            text("framework"),
            text("method"),
            text("argument_expr"),
            int("is_validator"),
            text_null("variable_name"),
        ],
        primary_key: &[],
        indexes: &[("idx_validation_usage_file", &["file_path"])],
        auto_id: false,
    },
    TableSpec {
        name: "sql_objects",
        columns: &[text("file"), text("kind"), text("name")],
        primary_key: &[],
        indexes: &[],
        auto_id: false,
    },
    TableSpec {
        name: "sql_queries",
        columns: &[
            text("file"),
            int("line"),
            text("query_text"),
            text("command"),
            text("extraction_source"),
        ],
        primary_key: &[],
        indexes: &[],
        auto_id: false,
    },
    TableSpec {
        name: "sql_query_tables",
        columns: &[text("file"), int("line"), text("table_name")],
        primary_key: &[],
        indexes: &[],
        auto_id: false,
    },
    TableSpec {
        name: "env_var_usage",
        columns: &[
            text("file"),
            int("line"),
            text("var_name"),
            text("in_function"),
            text("access_method"),
        ],
        primary_key: &[],
        indexes: &[],
        auto_id: false,
    },
    TableSpec {
        name: "object_literals",
        columns: &[
            text("file"),
            int("line"),
            text("variable_name"),
            text("property_name"),
            text("property_value"),
            text("property_type"),
            text("in_function"),
        ],
        primary_key: &[],
        indexes: &[("idx_object_literals_file", &["file"])],
        auto_id: false,
    },
    TableSpec {
        name: "variable_usage",
        columns: &[
            text("file"),
            int("line"),
            text("variable_name"),
            text("usage_type"),
            text("in_function"),
        ],
        primary_key: &[],
        indexes: &[],
        auto_id: false,
    },
    TableSpec {
        name: "frontend_api_calls",
        columns: &[
            text("file"),
            int("line"),
            text("method"),
            text("url_pattern"),
            text_null("body_var"),
            text("in_function"),
        ],
        primary_key: &[],
        indexes: &[],
        auto_id: false,
    },
    TableSpec {
        name: "resolved_flow_audit",
        columns: &[
            text("source_file"),
            int("source_line"),
            text("source_pattern"),
            text("sink_file"),
            int("sink_line"),
            text("sink_pattern"),
            text("vulnerability_type"),
            int("path_length"),
            int("hops"),
            text("path_json"),
            int("flow_sensitive"),
            text("status"),
            text_null("sanitizer_file"),
            int_null("sanitizer_line"),
            text_null("sanitizer_method"),
            text("engine"),
        ],
        primary_key: &[],
        indexes: &[("idx_flow_audit_signature", &["source_file", "source_pattern", "sink_file", "sink_pattern"])],
        auto_id: true,
    },
];

/// The authoritative table catalog, in FK-safe flush order.
pub fn registry() -> &'static [TableSpec] {
    TABLES
}
