//! Schema registry: the single authoritative table catalog.
//!
//! Every DDL statement and every parameterized INSERT in the engine is
//! derived from this registry; call sites never spell column lists. The
//! registry hash gates execution: a database whose stamped hash differs
//! from the current registry hash refuses to run (`SchemaError::Stale`).

mod tables;

use sha2::{Digest, Sha256};

pub use tables::registry;

/// Column type in the embedded SQL model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
}

impl ColumnType {
    fn sql(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
        }
    }
}

/// A single column declaration.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
}

/// An index declaration: (index name, columns).
pub type IndexSpec = (&'static str, &'static [&'static str]);

/// A table declaration. `auto_id` tables carry an implicit
/// `id INTEGER PRIMARY KEY AUTOINCREMENT` column that is never part of
/// `columns` and never bound by generated INSERTs.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
    pub primary_key: &'static [&'static str],
    pub indexes: &'static [IndexSpec],
    pub auto_id: bool,
}

impl TableSpec {
    /// Generate the CREATE TABLE statement for this table.
    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.columns.len() + 2);
        if self.auto_id {
            parts.push("id INTEGER PRIMARY KEY AUTOINCREMENT".to_string());
        }
        for col in self.columns {
            let null = if col.nullable { "" } else { " NOT NULL" };
            parts.push(format!("{} {}{}", col.name, col.ty.sql(), null));
        }
        if !self.primary_key.is_empty() {
            parts.push(format!("PRIMARY KEY({})", self.primary_key.join(", ")));
        }
        format!("CREATE TABLE IF NOT EXISTS {}({})", self.name, parts.join(", "))
    }

    /// Generate CREATE INDEX statements for this table.
    pub fn index_sql(&self) -> Vec<String> {
        self.indexes
            .iter()
            .map(|(name, cols)| {
                format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {}({})",
                    name,
                    self.name,
                    cols.join(", ")
                )
            })
            .collect()
    }

    /// Generate the parameterized INSERT statement. Column order is
    /// registry order; call sites bind positionally. Tables with a
    /// natural primary key upsert, so re-emitting the same logical row
    /// (e.g. one file reached under two path spellings) collapses
    /// instead of failing.
    pub fn insert_sql(&self) -> String {
        let cols: Vec<&str> = self.columns.iter().map(|c| c.name).collect();
        let params: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
        let verb = if self.primary_key.is_empty() { "INSERT" } else { "INSERT OR REPLACE" };
        format!(
            "{verb} INTO {}({}) VALUES ({})",
            self.name,
            cols.join(", "),
            params.join(", ")
        )
    }

    /// Number of bound parameters in the generated INSERT.
    pub fn arity(&self) -> usize {
        self.columns.len()
    }
}

/// Look up a table by name.
pub fn table(name: &str) -> Option<&'static TableSpec> {
    registry().iter().find(|t| t.name == name)
}

/// Stable SHA-256 over the sorted table definitions.
///
/// Hashes name, column name/type/nullability, primary key, and index
/// definitions, in sorted table order, so the digest is independent of
/// registry declaration order.
pub fn schema_hash() -> String {
    let mut specs: Vec<&TableSpec> = registry().iter().collect();
    specs.sort_by_key(|t| t.name);

    let mut hasher = Sha256::new();
    for spec in specs {
        hasher.update(spec.name.as_bytes());
        hasher.update([0xFF]);
        if spec.auto_id {
            hasher.update(b"auto_id");
        }
        for col in spec.columns {
            hasher.update(col.name.as_bytes());
            hasher.update([b':']);
            hasher.update(col.ty.sql().as_bytes());
            hasher.update([if col.nullable { b'?' } else { b'!' }]);
        }
        for pk in spec.primary_key {
            hasher.update(b"pk=");
            hasher.update(pk.as_bytes());
        }
        for (idx_name, cols) in spec.indexes {
            hasher.update(b"idx=");
            hasher.update(idx_name.as_bytes());
            for c in *cols {
                hasher.update(c.as_bytes());
            }
        }
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_names_are_unique() {
        let mut names: Vec<&str> = registry().iter().map(|t| t.name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total, "duplicate table names in registry");
    }

    #[test]
    fn hash_is_stable_across_calls() {
        assert_eq!(schema_hash(), schema_hash());
        assert_eq!(schema_hash().len(), 64);
    }

    #[test]
    fn insert_sql_matches_arity() {
        for spec in registry() {
            let sql = spec.insert_sql();
            assert_eq!(sql.matches('?').count(), spec.arity(), "table {}", spec.name);
        }
    }

    #[test]
    fn auto_id_tables_exclude_id_from_insert() {
        let cfg = table("cfg_blocks").unwrap();
        assert!(cfg.auto_id);
        assert!(!cfg.insert_sql().contains("id,"), "{}", cfg.insert_sql());
    }

    #[test]
    fn core_flow_tables_present() {
        for name in [
            "files",
            "symbols",
            "assignments",
            "assignment_sources",
            "function_call_args",
            "function_returns",
            "function_return_sources",
            "cfg_blocks",
            "cfg_edges",
            "cfg_block_statements",
            "api_endpoints",
            "router_mounts",
            "express_middleware_chains",
            "framework_safe_sinks",
            "validation_framework_usage",
            "resolved_flow_audit",
        ] {
            assert!(table(name).is_some(), "missing table {name}");
        }
    }
}
