//! Bash extractor over the tree-sitter grammar.
//!
//! Shell scripts feed the taint pipeline through variable assignments,
//! command invocations (one call-arg row per word), and `$VAR`
//! expansions, which double as environment/positional input sources.

use seep_core::errors::ExtractError;
use tree_sitter::{Node, Parser};

use super::{
    AssignmentFact, CallArgFact, EnvUsageFact, ExtractedFacts, Extractor, FileInfo, SymbolFact,
};

pub struct BashExtractor {
    language: tree_sitter::Language,
}

impl BashExtractor {
    pub fn new() -> Self {
        Self { language: tree_sitter_bash::LANGUAGE.into() }
    }
}

impl Default for BashExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for BashExtractor {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".sh", ".bash"]
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

        let mut visitor = BashVisitor { source: content.as_bytes(), facts: ExtractedFacts::default() };
        visitor.visit(tree.root_node(), "global");
        Ok(visitor.facts)
    }
}

struct BashVisitor<'s> {
    source: &'s [u8],
    facts: ExtractedFacts,
}

impl BashVisitor<'_> {
    fn text(&self, node: Node) -> String {
        node.utf8_text(self.source).unwrap_or("").to_string()
    }

    fn line(node: Node) -> i64 {
        node.start_position().row as i64 + 1
    }

    fn visit(&mut self, node: Node, function: &str) {
        match node.kind() {
            "function_definition" => {
                let name = node
                    .child_by_field_name("name")
                    .map(|n| self.text(n))
                    .unwrap_or_default();
                self.facts.symbols.push(SymbolFact {
                    name: name.clone(),
                    kind: "function".to_string(),
                    line: Self::line(node),
                    col: node.start_position().column as i64,
                    end_line: Some(node.end_position().row as i64 + 1),
                    type_annotation: None,
                    parameters_json: Some("[]".to_string()),
                });
                if let Some(body) = node.child_by_field_name("body") {
                    self.visit_children(body, &name);
                }
            }
            "variable_assignment" => {
                self.visit_assignment(node, function);
                self.visit_children(node, function);
            }
            "command" => {
                self.visit_command(node, function);
                self.visit_children(node, function);
            }
            "simple_expansion" | "expansion" => {
                self.visit_expansion(node, function);
                self.visit_children(node, function);
            }
            _ => self.visit_children(node, function),
        }
    }

    fn visit_children(&mut self, node: Node, function: &str) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, function);
        }
    }

    fn visit_assignment(&mut self, node: Node, function: &str) {
        let Some(name) = node.child_by_field_name("name") else { return };
        let value_text = node
            .child_by_field_name("value")
            .map(|v| self.text(v))
            .unwrap_or_default();

        self.facts.assignments.push(AssignmentFact {
            line: Self::line(node),
            target_var: self.text(name),
            source_expr: value_text.clone(),
            in_function: function.to_string(),
            property_path: None,
            source_vars: expansion_vars(&value_text),
        });
    }

    fn visit_command(&mut self, node: Node, function: &str) {
        let mut callee = String::new();
        let mut arg_index: i64 = 0;
        let line = Self::line(node);

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "command_name" => callee = self.text(child),
                "word" | "string" | "raw_string" | "simple_expansion" | "expansion"
                | "concatenation" | "command_substitution" => {
                    if callee.is_empty() {
                        continue;
                    }
                    self.facts.function_calls.push(CallArgFact {
                        line,
                        caller_function: function.to_string(),
                        callee_function: callee.clone(),
                        argument_index: arg_index,
                        argument_expr: self.text(child),
                        param_name: format!("arg{arg_index}"),
                        callee_file_path: None,
                    });
                    arg_index += 1;
                }
                _ => {}
            }
        }
    }

    fn visit_expansion(&mut self, node: Node, function: &str) {
        let text = self.text(node);
        let var = text.trim_start_matches('$').trim_matches(|c| c == '{' || c == '}');
        if var.is_empty() {
            return;
        }

        let access_method = if var.chars().all(|c| c.is_ascii_digit())
            || matches!(var, "@" | "*" | "#")
        {
            "positional"
        } else if var.chars().any(|c| c.is_ascii_uppercase())
            && !var.chars().any(|c| c.is_ascii_lowercase())
        {
            "environment"
        } else {
            return;
        };

        self.facts.env_usages.push(EnvUsageFact {
            line: Self::line(node),
            var_name: var.to_string(),
            in_function: function.to_string(),
            access_method: access_method.to_string(),
        });
    }
}

/// `$VAR` and `${VAR}` references inside a value string.
fn expansion_vars(value: &str) -> Vec<String> {
    let mut vars = Vec::new();
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let rest = &value[i + 1..];
            let inner = rest.strip_prefix('{').unwrap_or(rest);
            let name: String = inner
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            if !name.is_empty() && !vars.contains(&name) {
                vars.push(name);
            }
        }
        i += 1;
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> ExtractedFacts {
        let extractor = BashExtractor::new();
        let file = FileInfo { path: "run.sh".into(), ext: ".sh".into(), bytes: 0 };
        extractor.extract(&file, source).unwrap()
    }

    #[test]
    fn assignment_captures_expansion_sources() {
        let facts = extract("NAME=\"$USER_INPUT\"\n");
        let assignment = &facts.assignments[0];
        assert_eq!(assignment.target_var, "NAME");
        assert!(assignment.source_vars.contains(&"USER_INPUT".to_string()));
    }

    #[test]
    fn command_words_become_call_args() {
        let facts = extract("curl \"$URL\" -o out.txt\n");
        let args: Vec<_> =
            facts.function_calls.iter().filter(|c| c.callee_function == "curl").collect();
        assert!(args.len() >= 2);
        assert_eq!(args[0].argument_index, 0);
    }

    #[test]
    fn positional_and_env_expansions_recorded() {
        let facts = extract("echo \"$1\"\nexport PATH=\"$HOME/bin\"\n");
        assert!(facts.env_usages.iter().any(|e| e.access_method == "positional"));
        assert!(facts.env_usages.iter().any(|e| e.var_name == "HOME"));
    }

    #[test]
    fn functions_scope_their_commands() {
        let facts = extract("deploy() {\n  scp \"$1\" host:\n}\n");
        assert!(facts.symbols.iter().any(|s| s.name == "deploy" && s.kind == "function"));
        assert!(facts
            .function_calls
            .iter()
            .any(|c| c.callee_function == "scp" && c.caller_function == "deploy"));
    }
}
