//! Access paths for field-sensitive taint tracking.
//!
//! An access path `base.f1.f2` names data at a program point. Field
//! tuples are k-limited so the domain stays finite; aliasing is a
//! conservative prefix match. File paths are forward-slash normalized on
//! construction, so Windows-path inequality is impossible by
//! construction.

use std::fmt;
use std::hash::{Hash, Hasher};

use seep_core::paths;

/// Default k-limit on field depth.
pub const DEFAULT_MAX_FIELDS: usize = 5;

/// A path through object fields anchored at a (file, function, base)
/// triple. Immutable: every operation returns a new value.
#[derive(Debug, Clone)]
pub struct AccessPath {
    file: String,
    function: String,
    base: String,
    fields: Vec<String>,
    max_fields: usize,
}

impl AccessPath {
    pub fn new(
        file: impl Into<String>,
        function: impl Into<String>,
        base: impl Into<String>,
        fields: Vec<String>,
    ) -> Self {
        Self::with_limit(file, function, base, fields, DEFAULT_MAX_FIELDS)
    }

    pub fn with_limit(
        file: impl Into<String>,
        function: impl Into<String>,
        base: impl Into<String>,
        mut fields: Vec<String>,
        max_fields: usize,
    ) -> Self {
        fields.truncate(max_fields);
        Self {
            file: paths::normalize(&file.into()),
            function: function.into(),
            base: base.into(),
            fields,
            max_fields,
        }
    }

    /// Build from a dotted pattern like `req.body.userId`.
    pub fn from_pattern(
        file: impl Into<String>,
        function: impl Into<String>,
        pattern: &str,
    ) -> Self {
        let mut parts = pattern.split('.');
        let base = parts.next().unwrap_or("").to_string();
        let fields: Vec<String> = parts.map(str::to_string).collect();
        Self::new(file, function, base, fields)
    }

    /// Parse a node id of the form `file::function::var.f1.f2` (or the
    /// two-part global form `file::var`). Returns `None` for malformed
    /// ids; callers debug-log and drop the hop, never panic.
    pub fn parse(node_id: &str) -> Option<Self> {
        Self::parse_with_limit(node_id, DEFAULT_MAX_FIELDS)
    }

    pub fn parse_with_limit(node_id: &str, max_fields: usize) -> Option<Self> {
        if node_id.is_empty() || !node_id.contains("::") {
            return None;
        }
        let parts: Vec<&str> = node_id.split("::").collect();
        if parts.len() < 2 {
            return None;
        }

        let (file, function, var_path) = if parts.len() == 2 {
            (parts[0], "global", parts[1].to_string())
        } else {
            // Multi-part function names keep their `::` segments in the
            // variable position after the outermost two splits.
            (parts[0], parts[1], parts[2..].join("::"))
        };

        if var_path.is_empty() {
            return None;
        }

        let mut var_parts = var_path.split('.');
        let base = var_parts.next().unwrap_or("").to_string();
        let fields: Vec<String> = var_parts.map(str::to_string).collect();

        Some(Self::with_limit(file, function, base, fields, max_fields))
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// `base.f1.f2` (no file/function).
    pub fn path_str(&self) -> String {
        if self.fields.is_empty() {
            self.base.clone()
        } else {
            format!("{}.{}", self.base, self.fields.join("."))
        }
    }

    /// Canonical node id: `file::function::base.f1.f2`. Round-trips
    /// through `parse`.
    pub fn node_id(&self) -> String {
        format!("{}::{}::{}", self.file, self.function, self.path_str())
    }

    /// Conservative alias check: same base, and one field tuple is a
    /// prefix of the other.
    pub fn matches(&self, other: &AccessPath) -> bool {
        if self.base != other.base {
            return false;
        }
        let min_len = self.fields.len().min(other.fields.len());
        if min_len == 0 {
            return true;
        }
        self.fields[..min_len] == other.fields[..min_len]
    }

    /// Append a field, or `None` when the k-limit is reached.
    pub fn append_field(&self, field: &str) -> Option<Self> {
        if self.fields.len() >= self.max_fields {
            return None;
        }
        let mut fields = self.fields.clone();
        fields.push(field.to_string());
        Some(Self {
            file: self.file.clone(),
            function: self.function.clone(),
            base: self.base.clone(),
            fields,
            max_fields: self.max_fields,
        })
    }

    /// Remove `count` trailing fields (all of them if `count` exceeds the
    /// depth). Used when a backward trace reifies through a field store.
    pub fn strip_fields(&self, count: usize) -> Self {
        let keep = self.fields.len().saturating_sub(count);
        Self {
            file: self.file.clone(),
            function: self.function.clone(),
            base: self.base.clone(),
            fields: self.fields[..keep].to_vec(),
            max_fields: self.max_fields,
        }
    }

    /// Replace the base variable, keeping fields (`x = y` rebinding).
    pub fn change_base(&self, new_base: &str) -> Self {
        Self {
            file: self.file.clone(),
            function: self.function.clone(),
            base: new_base.to_string(),
            fields: self.fields.clone(),
            max_fields: self.max_fields,
        }
    }

    /// All prefixes of the path for substring-style matching:
    /// `req.body.id` → `["req", "req.body", "req.body.id"]`.
    pub fn to_pattern_set(&self) -> Vec<String> {
        let mut patterns = Vec::with_capacity(self.fields.len() + 1);
        let mut current = self.base.clone();
        patterns.push(current.clone());
        for field in &self.fields {
            current.push('.');
            current.push_str(field);
            patterns.push(current.clone());
        }
        patterns
    }
}

// The k-limit is policy, not identity: equality and hashing cover only
// the logical (file, function, base, fields) tuple.
impl PartialEq for AccessPath {
    fn eq(&self, other: &Self) -> bool {
        self.file == other.file
            && self.function == other.function
            && self.base == other.base
            && self.fields == other.fields
    }
}

impl Eq for AccessPath {}

impl Hash for AccessPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.file.hash(state);
        self.function.hash(state);
        self.base.hash(state);
        self.fields.hash(state);
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips() {
        let ap = AccessPath::parse("controller.ts::create::req.body.userId").unwrap();
        assert_eq!(ap.file(), "controller.ts");
        assert_eq!(ap.function(), "create");
        assert_eq!(ap.base(), "req");
        assert_eq!(ap.fields(), ["body", "userId"]);
        assert_eq!(AccessPath::parse(&ap.node_id()).unwrap(), ap);
    }

    #[test]
    fn parse_global_two_part_form() {
        let ap = AccessPath::parse("service.ts::user").unwrap();
        assert_eq!(ap.function(), "global");
        assert_eq!(ap.base(), "user");
        assert!(ap.fields().is_empty());
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(AccessPath::parse("").is_none());
        assert!(AccessPath::parse("no-separator").is_none());
        assert!(AccessPath::parse("file.ts::fn::").is_none());
    }

    #[test]
    fn multipart_names_keep_inner_separators() {
        let ap = AccessPath::parse("a.cpp::N::fn::x.f").unwrap();
        assert_eq!(ap.file(), "a.cpp");
        assert_eq!(ap.function(), "N");
        assert_eq!(ap.base(), "fn::x");
        assert_eq!(ap.fields(), ["f"]);
        assert_eq!(ap.node_id(), "a.cpp::N::fn::x.f");
    }

    #[test]
    fn mixed_slash_equality_and_hash_agree() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let a = AccessPath::new("src\\a.js", "f", "x", vec!["y".into()]);
        let b = AccessPath::new("src/a.js", "f", "x", vec!["y".into()]);
        assert_eq!(a, b);

        let mut ha = DefaultHasher::new();
        let mut hb = DefaultHasher::new();
        a.hash(&mut ha);
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn prefix_aliasing() {
        let body = AccessPath::from_pattern("c.ts", "f", "req.body");
        let user = AccessPath::from_pattern("c.ts", "f", "req.body.userId");
        let headers = AccessPath::from_pattern("c.ts", "f", "req.headers");
        assert!(body.matches(&user));
        assert!(user.matches(&body));
        assert!(!body.matches(&headers));
    }

    #[test]
    fn k_limit_stops_append() {
        let mut ap = AccessPath::from_pattern("f.ts", "g", "a");
        for field in ["b", "c", "d", "e", "f"] {
            ap = ap.append_field(field).unwrap();
        }
        assert_eq!(ap.fields().len(), DEFAULT_MAX_FIELDS);
        assert!(ap.append_field("g").is_none());
    }

    #[test]
    fn k_limit_truncates_on_parse() {
        let ap = AccessPath::parse("f.ts::g::a.b.c.d.e.f.g.h").unwrap();
        assert_eq!(ap.fields().len(), DEFAULT_MAX_FIELDS);
    }

    #[test]
    fn strip_and_change_base() {
        let ap = AccessPath::from_pattern("f.ts", "g", "x.f.g.h");
        assert_eq!(ap.strip_fields(2).path_str(), "x.f");
        assert_eq!(ap.strip_fields(9).path_str(), "x");
        assert_eq!(ap.change_base("y").path_str(), "y.f.g.h");
    }

    #[test]
    fn pattern_set_lists_prefixes() {
        let ap = AccessPath::from_pattern("f.ts", "g", "req.body.id");
        assert_eq!(ap.to_pattern_set(), ["req", "req.body", "req.body.id"]);
    }
}
