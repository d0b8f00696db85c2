//! SQL migration file extractor.
//!
//! Token-level scanning (no full SQL grammar): statements split on `;`,
//! the leading keyword becomes the command, DDL entities land in
//! `sql_objects`, and table references after FROM/INTO/UPDATE/JOIN feed
//! the `sql_query_tables` junction.

use seep_core::errors::ExtractError;

use super::{ExtractedFacts, Extractor, FileInfo, SqlObjectFact, SqlQueryFact};

pub struct SqlExtractor;

impl Extractor for SqlExtractor {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".sql"]
    }

    fn extract(&self, _file: &FileInfo, content: &str) -> Result<ExtractedFacts, ExtractError> {
        let mut facts = ExtractedFacts::default();

        for (statement, line) in split_statements(content) {
            let tokens: Vec<String> = statement
                .split_whitespace()
                .map(|t| t.trim_matches(|c: char| c == '(' || c == ')' || c == ',').to_string())
                .filter(|t| !t.is_empty())
                .collect();
            if tokens.is_empty() {
                continue;
            }
            let command = tokens[0].to_ascii_uppercase();

            if command == "CREATE" {
                if let Some((kind, name)) = ddl_entity(&tokens) {
                    facts.sql_objects.push(SqlObjectFact { kind, name });
                }
            }

            let tables = referenced_tables(&tokens);
            facts.sql_queries.push(SqlQueryFact {
                line,
                query_text: clip(&statement),
                command,
                extraction_source: "migration_file".to_string(),
                tables,
            });
        }

        Ok(facts)
    }
}

/// Split on `;`, tracking the starting line of each statement and
/// skipping `--` comment lines.
fn split_statements(content: &str) -> Vec<(String, i64)> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut start_line: i64 = 0;

    for (idx, raw_line) in content.lines().enumerate() {
        let line_no = idx as i64 + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("--") {
            continue;
        }
        if current.is_empty() {
            start_line = line_no;
        }
        current.push_str(line);
        current.push(' ');

        if line.ends_with(';') {
            let stmt = current.trim().trim_end_matches(';').trim().to_string();
            if !stmt.is_empty() {
                statements.push((stmt, start_line));
            }
            current.clear();
        }
    }
    let tail = current.trim().trim_end_matches(';').trim().to_string();
    if !tail.is_empty() {
        statements.push((tail, start_line));
    }
    statements
}

/// `CREATE TABLE users …` → ("table", "users"); handles IF NOT EXISTS.
fn ddl_entity(tokens: &[String]) -> Option<(String, String)> {
    let mut iter = tokens.iter().map(|t| t.as_str());
    iter.next(); // CREATE
    let mut kind = iter.next()?.to_ascii_lowercase();
    if kind == "unique" || kind == "or" {
        kind = iter.next()?.to_ascii_lowercase();
        if kind == "replace" {
            kind = iter.next()?.to_ascii_lowercase();
        }
    }
    if !matches!(kind.as_str(), "table" | "view" | "index" | "trigger" | "function") {
        return None;
    }
    let mut name = iter.next()?;
    if name.eq_ignore_ascii_case("if") {
        iter.next(); // NOT
        iter.next(); // EXISTS
        name = iter.next()?;
    }
    Some((kind, name.trim_matches('"').to_string()))
}

fn referenced_tables(tokens: &[String]) -> Vec<String> {
    let mut tables = Vec::new();
    let mut take_next = false;
    for token in tokens {
        let upper = token.to_ascii_uppercase();
        if take_next {
            take_next = false;
            let name = token.trim_matches(|c: char| c == '"' || c == '`' || c == ';');
            let is_keyword = matches!(upper.as_str(), "SELECT" | "WHERE" | "SET" | "VALUES");
            if !name.is_empty() && !is_keyword && !tables.contains(&name.to_string()) {
                tables.push(name.to_string());
            }
            continue;
        }
        if matches!(upper.as_str(), "FROM" | "INTO" | "UPDATE" | "JOIN") {
            take_next = true;
        }
    }
    tables
}

fn clip(text: &str) -> String {
    const MAX: usize = 500;
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

    #[test]
    fn ddl_and_references_extracted() {
        let content = "-- users schema\nCREATE TABLE IF NOT EXISTS users (id INTEGER);\nINSERT INTO users (id) VALUES (1);\nSELECT * FROM users JOIN orders ON orders.user_id = users.id;\n";
        let file = FileInfo { path: "migrations/001.sql".into(), ext: ".sql".into(), bytes: 0 };
        let facts = SqlExtractor.extract(&file, content).unwrap();

        assert_eq!(facts.sql_objects[0].kind, "table");
        assert_eq!(facts.sql_objects[0].name, "users");
        assert_eq!(facts.sql_queries.len(), 3);
        assert_eq!(facts.sql_queries[1].command, "INSERT");
        let select = &facts.sql_queries[2];
        assert!(select.tables.contains(&"users".to_string()));
        assert!(select.tables.contains(&"orders".to_string()));
    }
}
