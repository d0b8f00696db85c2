//! Python extractor over the tree-sitter grammar.
//!
//! Emits symbols, imports, flow primitives (assignments with source-var
//! junctions, per-argument call rows, returns), a structural CFG,
//! Flask/FastAPI route decorators, env/argv usage, and SQL strings
//! passed to cursor-style `execute` calls.

use seep_core::errors::ExtractError;
use tree_sitter::{Node, Parser};

use super::{
    AssignmentFact, CallArgFact, CfgBlockFact, CfgEdgeFact, CfgStatementFact, EndpointFact,
    EnvUsageFact, ExtractedFacts, Extractor, FileInfo, ImportStyleFact, RefFact, ReturnFact,
    SqlQueryFact, SymbolFact, ValidationFact,
};

pub struct PythonExtractor {
    language: tree_sitter::Language,
}

impl PythonExtractor {
    pub fn new() -> Self {
        Self { language: tree_sitter_python::LANGUAGE.into() }
    }
}

impl Default for PythonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for PythonExtractor {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".py"]
    }

    fn extract(&self, file: &FileInfo, content: &str) -> Result<ExtractedFacts, ExtractError> {
        let mut parser = Parser::new();
        parser.set_language(&self.language).map_err(|e| ExtractError::ParseFailed {
            file: file.path.clone(),
            message: e.to_string(),
        })?;
        let tree = parser.parse(content, None).ok_or_else(|| ExtractError::ParseFailed {
            file: file.path.clone(),
            message: "tree-sitter returned no tree".to_string(),
        })?;

        let mut visitor = PyVisitor {
            source: content.as_bytes(),
            facts: ExtractedFacts::default(),
        };
        visitor.visit(tree.root_node(), &Scope::module());
        Ok(visitor.facts)
    }
}

#[derive(Clone)]
struct Scope {
    function: String,
    class: Option<String>,
}

impl Scope {
    fn module() -> Self {
        Self { function: "global".to_string(), class: None }
    }
}

struct PyVisitor<'s> {
    source: &'s [u8],
    facts: ExtractedFacts,
}

impl PyVisitor<'_> {
    fn text(&self, node: Node) -> String {
        node.utf8_text(self.source).unwrap_or("").to_string()
    }

    fn line(node: Node) -> i64 {
        node.start_position().row as i64 + 1
    }

    fn visit(&mut self, node: Node, scope: &Scope) {
        match node.kind() {
            "function_definition" => self.visit_function(node, scope, &[]),
            "class_definition" => self.visit_class(node, scope),
            "decorated_definition" => self.visit_decorated(node, scope),
            "import_statement" => self.visit_import(node),
            "import_from_statement" => self.visit_import_from(node),
            "assignment" => {
                self.visit_assignment(node, scope);
                self.visit_children(node, scope);
            }
            "return_statement" => {
                self.visit_return(node, scope);
                self.visit_children(node, scope);
            }
            "call" => {
                self.visit_call(node, scope);
                self.visit_children(node, scope);
            }
            "subscript" => {
                self.check_environ_subscript(node, scope);
                self.visit_children(node, scope);
            }
            _ => self.visit_children(node, scope),
        }
    }

    fn visit_children(&mut self, node: Node, scope: &Scope) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, scope);
        }
    }

    fn visit_decorated(&mut self, node: Node, scope: &Scope) {
        let mut decorators: Vec<Node> = Vec::new();
        let mut inner: Option<Node> = None;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "decorator" => decorators.push(child),
                "function_definition" => inner = Some(child),
                "class_definition" => inner = Some(child),
                _ => {}
            }
        }
        match inner {
            Some(def) if def.kind() == "function_definition" => {
                self.visit_function(def, scope, &decorators)
            }
            Some(def) => self.visit_class(def, scope),
            None => {}
        }
    }

    fn visit_function(&mut self, node: Node, scope: &Scope, decorators: &[Node]) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n))
            .unwrap_or_default();
        let qualified = match &scope.class {
            Some(class) => format!("{class}.{name}"),
            None => name.clone(),
        };
        let line = Self::line(node);
        let end_line = node.end_position().row as i64 + 1;
        let col = node.start_position().column as i64;

        let params = self.parameter_names(node);
        let parameters_json = serde_json::to_string(
            &params.iter().map(|p| serde_json::json!({ "name": p })).collect::<Vec<_>>(),
        )
        .ok();

        self.facts.symbols.push(SymbolFact {
            name: qualified.clone(),
            kind: "function".to_string(),
            line,
            col,
            end_line: Some(end_line),
            type_annotation: node
                .child_by_field_name("return_type")
                .map(|n| self.text(n)),
            parameters_json,
        });
        for param in &params {
            self.facts.symbols.push(SymbolFact {
                name: param.clone(),
                kind: "parameter".to_string(),
                line,
                col,
                end_line: None,
                type_annotation: None,
                parameters_json: None,
            });
        }

        for decorator in decorators {
            self.check_route_decorator(*decorator, &qualified);
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.build_cfg(&qualified, node, body);
            let inner_scope = Scope { function: qualified, class: scope.class.clone() };
            self.visit_children(body, &inner_scope);
        }
    }

    fn parameter_names(&self, function: Node) -> Vec<String> {
        let mut params = Vec::new();
        let Some(parameters) = function.child_by_field_name("parameters") else {
            return params;
        };
        let mut cursor = parameters.walk();
        for child in parameters.children(&mut cursor) {
            match child.kind() {
                "identifier" => params.push(self.text(child)),
                "typed_parameter" | "default_parameter" | "typed_default_parameter" => {
                    if let Some(name) = child.child(0).filter(|c| c.kind() == "identifier") {
                        params.push(self.text(name));
                    } else if let Some(name) = child.child_by_field_name("name") {
                        params.push(self.text(name));
                    }
                }
                "list_splat_pattern" | "dictionary_splat_pattern" => {
                    params.push(self.text(child));
                }
                _ => {}
            }
        }
        params
    }

    fn visit_class(&mut self, node: Node, scope: &Scope) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n))
            .unwrap_or_default();
        self.facts.symbols.push(SymbolFact {
            name: name.clone(),
            kind: "class".to_string(),
            line: Self::line(node),
            col: node.start_position().column as i64,
            end_line: Some(node.end_position().row as i64 + 1),
            type_annotation: None,
            parameters_json: None,
        });
        if let Some(body) = node.child_by_field_name("body") {
            let inner_scope = Scope { function: scope.function.clone(), class: Some(name) };
            self.visit_children(body, &inner_scope);
        }
    }

    fn visit_import(&mut self, node: Node) {
        let line = Self::line(node);
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "dotted_name" => {
                    let module = self.text(child);
                    self.facts.refs.push(RefFact {
                        kind: "import".to_string(),
                        value: module.clone(),
                        line: Some(line),
                    });
                    self.facts.imports.push(ImportStyleFact {
                        line,
                        package: module,
                        style: "namespace".to_string(),
                        names: None,
                        alias: None,
                        specifiers: Vec::new(),
                    });
                }
                "aliased_import" => {
                    let module = child
                        .child_by_field_name("name")
                        .map(|n| self.text(n))
                        .unwrap_or_default();
                    let alias = child.child_by_field_name("alias").map(|n| self.text(n));
                    self.facts.refs.push(RefFact {
                        kind: "import".to_string(),
                        value: module.clone(),
                        line: Some(line),
                    });
                    self.facts.imports.push(ImportStyleFact {
                        line,
                        package: module,
                        style: "namespace".to_string(),
                        names: None,
                        alias,
                        specifiers: Vec::new(),
                    });
                }
                _ => {}
            }
        }
    }

    fn visit_import_from(&mut self, node: Node) {
        let line = Self::line(node);
        let module = node
            .child_by_field_name("module_name")
            .map(|n| self.text(n))
            .unwrap_or_default();
        self.facts.refs.push(RefFact {
            kind: "from".to_string(),
            value: module.clone(),
            line: Some(line),
        });

        let mut specifiers = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "dotted_name" && self.text(child) != module {
                specifiers.push(self.text(child));
            } else if child.kind() == "aliased_import" {
                if let Some(name) = child.child_by_field_name("name") {
                    specifiers.push(self.text(name));
                }
            }
        }
        self.facts.imports.push(ImportStyleFact {
            line,
            package: module,
            style: "named".to_string(),
            names: Some(specifiers.join(",")),
            alias: None,
            specifiers,
        });
    }

    fn visit_assignment(&mut self, node: Node, scope: &Scope) {
        let Some(left) = node.child_by_field_name("left") else { return };
        let Some(right) = node.child_by_field_name("right") else { return };
        let line = Self::line(node);

        let (target_var, property_path) = match left.kind() {
            "identifier" => (self.text(left), None),
            "attribute" => {
                let full = self.text(left);
                let base = full.split('.').next_back().unwrap_or(&full).to_string();
                (base, Some(full))
            }
            // Tuple/list unpacking: one assignment row per target.
            "pattern_list" | "tuple_pattern" => {
                let source_expr = clip(&self.text(right));
                let source_vars = self.collect_source_vars(right);
                let mut cursor = left.walk();
                for target in left.children(&mut cursor) {
                    if target.kind() == "identifier" {
                        self.facts.assignments.push(AssignmentFact {
                            line,
                            target_var: self.text(target),
                            source_expr: source_expr.clone(),
                            in_function: scope.function.clone(),
                            property_path: None,
                            source_vars: source_vars.clone(),
                        });
                    }
                }
                return;
            }
            _ => return,
        };

        self.facts.assignments.push(AssignmentFact {
            line,
            target_var,
            source_expr: clip(&self.text(right)),
            in_function: scope.function.clone(),
            property_path,
            source_vars: self.collect_source_vars(right),
        });
    }

    /// Every variable reference in an expression: identifiers and dotted
    /// attribute chains, deduplicated in source order.
    fn collect_source_vars(&self, node: Node) -> Vec<String> {
        let mut vars = Vec::new();
        collect_vars(node, self.source, &mut vars);
        vars
    }

    fn visit_return(&mut self, node: Node, scope: &Scope) {
        if scope.function == "global" {
            return;
        }
        let expr = node.child(1);
        let (return_expr, source_vars) = match expr {
            Some(e) => (clip(&self.text(e)), self.collect_source_vars(e)),
            None => ("None".to_string(), Vec::new()),
        };
        self.facts.returns.push(ReturnFact {
            line: Self::line(node),
            function_name: scope.function.clone(),
            return_expr,
            source_vars,
        });
    }

    fn visit_call(&mut self, node: Node, scope: &Scope) {
        let Some(function) = node.child_by_field_name("function") else { return };
        let callee = self.text(function);
        let line = Self::line(node);

        // os.environ.get / os.getenv are env access, not data-flow calls.
        if callee == "os.getenv" || callee == "os.environ.get" {
            if let Some(var) = self.first_string_argument(node) {
                self.facts.env_usages.push(EnvUsageFact {
                    line,
                    var_name: var,
                    in_function: scope.function.clone(),
                    access_method: callee,
                });
                return;
            }
        }

        let mut arg_index: i64 = 0;
        if let Some(arguments) = node.child_by_field_name("arguments") {
            let mut cursor = arguments.walk();
            for arg in arguments.children(&mut cursor) {
                if matches!(arg.kind(), "(" | ")" | ",") {
                    continue;
                }
                self.facts.function_calls.push(CallArgFact {
                    line,
                    caller_function: scope.function.clone(),
                    callee_function: callee.clone(),
                    argument_index: arg_index,
                    argument_expr: clip(&self.text(arg)),
                    param_name: format!("arg{arg_index}"),
                    callee_file_path: None,
                });
                arg_index += 1;
            }
        }

        // cursor.execute("SELECT …") and friends.
        let method = callee.rsplit('.').next().unwrap_or(&callee);
        if matches!(method, "execute" | "executemany" | "executescript") {
            if let Some(query) = self.first_string_argument(node) {
                let command = query
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .to_ascii_uppercase();
                self.facts.sql_queries.push(SqlQueryFact {
                    line,
                    query_text: clip(&query),
                    command,
                    extraction_source: "code_execute".to_string(),
                    tables: Vec::new(),
                });
            }
        }

        // schema.load(...) / Model.model_validate(...) style validators.
        if matches!(method, "load" | "validate" | "model_validate" | "parse_obj") {
            let receiver = callee.rsplit_once('.').map(|(r, _)| r.to_string());
            let framework = match method {
                "load" => "marshmallow",
                "model_validate" | "parse_obj" => "pydantic",
                _ => "validator",
            };
            self.facts.validation_usages.push(ValidationFact {
                line,
                framework: framework.to_string(),
                method: callee.clone(),
                argument_expr: node
                    .child_by_field_name("arguments")
                    .map(|a| clip(&self.text(a)))
                    .unwrap_or_default(),
                is_validator: true,
                variable_name: receiver,
            });
        }

        if callee.starts_with("sys.argv") {
            self.facts.env_usages.push(EnvUsageFact {
                line,
                var_name: "sys.argv".to_string(),
                in_function: scope.function.clone(),
                access_method: "sys.argv".to_string(),
            });
        }
    }

    fn first_string_argument(&self, call: Node) -> Option<String> {
        let arguments = call.child_by_field_name("arguments")?;
        let mut cursor = arguments.walk();
        for arg in arguments.children(&mut cursor) {
            if arg.kind() == "string" {
                let raw = self.text(arg);
                // Drop f/r/b prefixes before stripping quotes.
                let trimmed = raw.trim_start_matches(|c: char| c.is_ascii_alphabetic());
                return Some(trimmed.trim_matches(|c| c == '"' || c == '\'').to_string());
            }
            if !matches!(arg.kind(), "(" | ")" | ",") {
                return None;
            }
        }
        None
    }

    fn check_environ_subscript(&mut self, node: Node, scope: &Scope) {
        let Some(value) = node.child_by_field_name("value") else { return };
        if self.text(value) != "os.environ" {
            return;
        }
        if let Some(index) = node.child_by_field_name("subscript") {
            if index.kind() == "string" {
                let var = self.text(index).trim_matches(|c| c == '"' || c == '\'').to_string();
                self.facts.env_usages.push(EnvUsageFact {
                    line: Self::line(node),
                    var_name: var,
                    in_function: scope.function.clone(),
                    access_method: "os.environ".to_string(),
                });
            }
        }
    }

    /// `@app.route("/p", methods=["POST"])`, `@router.get("/p")`, and the
    /// FastAPI/Flask method shorthands.
    fn check_route_decorator(&mut self, decorator: Node, handler: &str) {
        let Some(call) = decorator.child(1).filter(|c| c.kind() == "call") else { return };
        let Some(function) = call.child_by_field_name("function") else { return };
        let callee = self.text(function);
        let method_name = callee.rsplit('.').next().unwrap_or(&callee).to_string();

        let is_route = matches!(
            method_name.as_str(),
            "route" | "get" | "post" | "put" | "delete" | "patch"
        );
        if !is_route || !callee.contains('.') {
            return;
        }

        let Some(pattern) = self.first_string_argument(call) else { return };
        let line = Self::line(decorator);

        let mut methods: Vec<String> = Vec::new();
        if method_name == "route" {
            // methods=[…] keyword, defaulting to GET.
            if let Some(arguments) = call.child_by_field_name("arguments") {
                let mut cursor = arguments.walk();
                for arg in arguments.children(&mut cursor) {
                    if arg.kind() == "keyword_argument" {
                        let name = arg.child_by_field_name("name").map(|n| self.text(n));
                        if name.as_deref() == Some("methods") {
                            if let Some(value) = arg.child_by_field_name("value") {
                                let mut list_cursor = value.walk();
                                for item in value.children(&mut list_cursor) {
                                    if item.kind() == "string" {
                                        methods.push(
                                            self.text(item)
                                                .trim_matches(|c| c == '"' || c == '\'')
                                                .to_ascii_uppercase(),
                                        );
                                    }
                                }
                            }
                        }
                    }
                }
            }
            if methods.is_empty() {
                methods.push("GET".to_string());
            }
        } else {
            methods.push(method_name.to_ascii_uppercase());
        }

        for method in methods {
            self.facts.api_endpoints.push(EndpointFact {
                line,
                method,
                pattern: pattern.clone(),
                path: pattern.clone(),
                has_auth: false,
                handler_function: handler.to_string(),
                controls: Vec::new(),
            });
        }
    }

    /// Structural CFG: an entry block per function, plus condition and
    /// branch blocks for one level of compound statements.
    fn build_cfg(&mut self, function: &str, def: Node, body: Node) {
        let base = self.facts.cfg_blocks.len();
        self.facts.cfg_blocks.push(CfgBlockFact {
            function_name: function.to_string(),
            block_type: "entry".to_string(),
            start_line: Self::line(def),
            end_line: def.end_position().row as i64 + 1,
            condition_expr: None,
            statements: Vec::new(),
        });

        let mut cursor = body.walk();
        for statement in body.children(&mut cursor) {
            match statement.kind() {
                "if_statement" => {
                    let condition = statement
                        .child_by_field_name("condition")
                        .map(|c| clip(&self.text(c)));
                    let cond_index = self.facts.cfg_blocks.len();
                    self.facts.cfg_blocks.push(CfgBlockFact {
                        function_name: function.to_string(),
                        block_type: "condition".to_string(),
                        start_line: Self::line(statement),
                        end_line: Self::line(statement),
                        condition_expr: condition,
                        statements: Vec::new(),
                    });
                    self.facts.cfg_edges.push(CfgEdgeFact {
                        source_index: base,
                        target_index: cond_index,
                        edge_type: "sequential".to_string(),
                    });

                    if let Some(consequence) = statement.child_by_field_name("consequence") {
                        let idx = self.push_branch_block(function, consequence, "branch_true");
                        self.facts.cfg_edges.push(CfgEdgeFact {
                            source_index: cond_index,
                            target_index: idx,
                            edge_type: "true".to_string(),
                        });
                    }
                    if let Some(alternative) = statement.child_by_field_name("alternative") {
                        let idx = self.push_branch_block(function, alternative, "branch_false");
                        self.facts.cfg_edges.push(CfgEdgeFact {
                            source_index: cond_index,
                            target_index: idx,
                            edge_type: "false".to_string(),
                        });
                    }
                }
                "for_statement" | "while_statement" => {
                    let idx = self.push_branch_block(function, statement, "loop");
                    self.facts.cfg_edges.push(CfgEdgeFact {
                        source_index: base,
                        target_index: idx,
                        edge_type: "sequential".to_string(),
                    });
                    self.facts.cfg_edges.push(CfgEdgeFact {
                        source_index: idx,
                        target_index: idx,
                        edge_type: "loop_back".to_string(),
                    });
                }
                "expression_statement" | "return_statement" | "assignment" => {
                    let text = clip(&self.text(statement));
                    let statement_type = match statement.kind() {
                        "return_statement" => "return",
                        _ => "expression",
                    };
                    if let Some(block) = self.facts.cfg_blocks.get_mut(base) {
                        block.statements.push(CfgStatementFact {
                            statement_type: statement_type.to_string(),
                            line: Self::line(statement),
                            statement_text: Some(text),
                        });
                    }
                }
                _ => {}
            }
        }
    }

    fn push_branch_block(&mut self, function: &str, node: Node, block_type: &str) -> usize {
        let index = self.facts.cfg_blocks.len();
        self.facts.cfg_blocks.push(CfgBlockFact {
            function_name: function.to_string(),
            block_type: block_type.to_string(),
            start_line: Self::line(node),
            end_line: node.end_position().row as i64 + 1,
            condition_expr: None,
            statements: Vec::new(),
        });
        index
    }
}

/// Collect identifiers and dotted attribute chains referenced in an
/// expression, in source order, without descending into attribute
/// internals twice.
fn collect_vars(node: Node, source: &[u8], out: &mut Vec<String>) {
    match node.kind() {
        "identifier" => {
            let name = node.utf8_text(source).unwrap_or("").to_string();
            if !name.is_empty() && !out.contains(&name) {
                out.push(name);
            }
        }
        "attribute" => {
            let text = node.utf8_text(source).unwrap_or("");
            // Only pure dotted chains count as a variable reference.
            if !text.is_empty()
                && text.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '_')
                && !out.contains(&text.to_string())
            {
                out.push(text.to_string());
            }
        }
        "string" => {}
        _ => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                collect_vars(child, source, out);
            }
        }
    }
}

/// Cap stored expression text.
fn clip(text: &str) -> String {
    const MAX: usize = 200;
    if text.len() <= MAX {
        text.to_string()
    } else {
        let mut end = MAX;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> ExtractedFacts {
        let extractor = PythonExtractor::new();
        let file = FileInfo { path: "app.py".into(), ext: ".py".into(), bytes: 0 };
        extractor.extract(&file, source).unwrap()
    }

    #[test]
    fn function_symbols_carry_parameters() {
        let facts = extract("def handler(user_id, body):\n    return body\n");
        let func = facts.symbols.iter().find(|s| s.kind == "function").unwrap();
        assert_eq!(func.name, "handler");
        let params: Vec<serde_json::Value> =
            serde_json::from_str(func.parameters_json.as_deref().unwrap()).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0]["name"], "user_id");
    }

    #[test]
    fn assignments_record_source_vars() {
        let facts = extract("def f(req):\n    user = req.form\n");
        let assignment = &facts.assignments[0];
        assert_eq!(assignment.target_var, "user");
        assert_eq!(assignment.in_function, "f");
        assert!(assignment.source_vars.contains(&"req.form".to_string()));
    }

    #[test]
    fn calls_emit_one_row_per_argument() {
        let facts = extract("def f(a, b):\n    g(a, b)\n");
        let rows: Vec<_> =
            facts.function_calls.iter().filter(|c| c.callee_function == "g").collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].param_name, "arg0");
        assert_eq!(rows[1].argument_expr, "b");
    }

    #[test]
    fn flask_route_decorator_becomes_endpoint() {
        let facts = extract(
            "@app.route(\"/users\", methods=[\"POST\"])\ndef create_user():\n    pass\n",
        );
        let ep = &facts.api_endpoints[0];
        assert_eq!(ep.method, "POST");
        assert_eq!(ep.pattern, "/users");
        assert_eq!(ep.handler_function, "create_user");
    }

    #[test]
    fn environ_access_is_recorded() {
        let facts = extract("import os\ntoken = os.environ[\"API_TOKEN\"]\n");
        assert!(facts
            .env_usages
            .iter()
            .any(|e| e.var_name == "API_TOKEN" && e.access_method == "os.environ"));
    }

    #[test]
    fn execute_string_becomes_sql_query() {
        let facts = extract("def q(cur, uid):\n    cur.execute(\"SELECT * FROM users\")\n");
        let query = &facts.sql_queries[0];
        assert_eq!(query.command, "SELECT");
        assert_eq!(query.extraction_source, "code_execute");
    }

    #[test]
    fn cfg_branches_get_blocks_and_edges() {
        let facts = extract(
            "def f(x):\n    if x:\n        a = 1\n    else:\n        a = 2\n    return a\n",
        );
        assert!(facts.cfg_blocks.iter().any(|b| b.block_type == "condition"));
        assert!(facts.cfg_edges.iter().any(|e| e.edge_type == "true"));
        assert!(facts.cfg_edges.iter().any(|e| e.edge_type == "false"));
    }
}
