//! Taint path model and vulnerability classification.

use serde::{Deserialize, Serialize};

/// A source or sink location as handed to the engines.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowEndpoint {
    pub file: String,
    pub line: i64,
    pub name: String,
    pub pattern: String,
}

impl FlowEndpoint {
    pub fn new(file: &str, line: i64, name: &str, pattern: &str) -> Self {
        Self {
            file: seep_core::paths::normalize(file),
            line,
            name: name.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

/// One step along a recorded taint path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hop {
    #[serde(rename = "type")]
    pub edge_type: String,
    pub from: String,
    pub to: String,
    pub from_file: String,
    pub to_file: String,
    pub line: i64,
    pub depth: usize,
}

/// Classification of a recorded path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowStatus {
    Vulnerable,
    Sanitized,
}

impl FlowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vulnerable => "VULNERABLE",
            Self::Sanitized => "SANITIZED",
        }
    }
}

/// A complete source→sink path with provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaintPath {
    pub source: FlowEndpoint,
    pub sink: FlowEndpoint,
    pub hops: Vec<Hop>,
    pub vulnerability_type: String,
    pub status: FlowStatus,
    pub sanitizer_file: Option<String>,
    pub sanitizer_line: Option<i64>,
    pub sanitizer_method: Option<String>,
    pub flow_sensitive: bool,
}

impl TaintPath {
    pub fn new(source: FlowEndpoint, sink: FlowEndpoint, hops: Vec<Hop>) -> Self {
        let vulnerability_type =
            classify_vulnerability(&sink.pattern, Some(&source.pattern)).to_string();
        Self {
            source,
            sink,
            hops,
            vulnerability_type,
            status: FlowStatus::Vulnerable,
            sanitizer_file: None,
            sanitizer_line: None,
            sanitizer_method: None,
            flow_sensitive: true,
        }
    }

    /// Mark the path as killed by a sanitizer.
    pub fn mark_sanitized(&mut self, file: String, line: i64, method: String) {
        self.status = FlowStatus::Sanitized;
        self.sanitizer_file = Some(file);
        self.sanitizer_line = Some(line);
        self.sanitizer_method = Some(method);
    }

    pub fn path_length(&self) -> usize {
        self.hops.len()
    }
}

const XSS_PATTERNS: &[&str] = &[
    "innerhtml",
    "outerhtml",
    "dangerouslysetinnerhtml",
    "insertadjacenthtml",
    "document.write",
    "document.writeln",
    "res.send",
    "res.render",
    "res.write",
    "response.write",
    "response.send",
    "sethtml",
    "v-html",
    "ng-bind-html",
    "__html",
    "createelement",
    "appendchild",
    "insertbefore",
];

const SQL_PATTERNS: &[&str] = &[
    "query",
    "execute",
    "exec",
    "raw",
    "sequelize.query",
    "knex.raw",
    "prisma.$queryraw",
    "prisma.$executeraw",
    "cursor.execute",
    "conn.execute",
    "db.query",
    "pool.query",
    "client.query",
    "sql",
    "rawquery",
];

const CMD_PATTERNS: &[&str] = &[
    "exec",
    "execsync",
    "spawn",
    "spawnsync",
    "child_process",
    "shellexecute",
    "popen",
    "system",
    "subprocess",
    "os.system",
    "os.popen",
    "subprocess.run",
    "subprocess.call",
    "subprocess.popen",
    "eval",
    "function(",
    "new function",
];

const PATH_PATTERNS: &[&str] = &[
    "readfile",
    "writefile",
    "readfilesync",
    "writefilesync",
    "createreadstream",
    "createwritestream",
    "fs.read",
    "fs.write",
    "open(",
    "path.join",
    "path.resolve",
    "sendfile",
    "download",
    "unlink",
    "rmdir",
    "mkdir",
    "rename",
];

const SSRF_PATTERNS: &[&str] = &[
    "fetch",
    "axios",
    "request",
    "http.get",
    "http.request",
    "https.get",
    "https.request",
    "urllib",
    "requests.get",
    "requests.post",
    "curl",
    "httpx",
];

const PROTO_PATTERNS: &[&str] = &[
    "__proto__",
    "constructor.prototype",
    "object.assign",
    "merge(",
    "extend(",
    "deepmerge",
    "lodash.merge",
    "$.extend",
];

const LOG_PATTERNS: &[&str] = &[
    "console.log",
    "console.error",
    "console.warn",
    "logger.",
    "logging.",
    "log.info",
    "log.error",
    "log.debug",
];

const REDIRECT_PATTERNS: &[&str] = &[
    "redirect",
    "location.href",
    "location.assign",
    "location.replace",
    "res.redirect",
    "window.location",
];

/// Deterministic sink/source pattern → vulnerability kind.
///
/// Case-insensitive substring tests in a fixed precedence order; shared
/// by both taint engines so findings are comparable.
pub fn classify_vulnerability(sink_pattern: &str, source_pattern: Option<&str>) -> &'static str {
    if sink_pattern.is_empty() {
        return "Data Exposure";
    }

    let sink = sink_pattern.to_lowercase();
    let source = source_pattern.unwrap_or("").to_lowercase();

    if XSS_PATTERNS.iter().any(|p| sink.contains(p)) {
        return "Cross-Site Scripting (XSS)";
    }
    if SQL_PATTERNS.iter().any(|p| sink.contains(p)) {
        return "SQL Injection";
    }
    if CMD_PATTERNS.iter().any(|p| sink.contains(p)) {
        if sink.contains("eval") || sink.contains("function(") {
            return "Code Injection";
        }
        return "Command Injection";
    }
    if PATH_PATTERNS.iter().any(|p| sink.contains(p)) {
        return "Path Traversal";
    }
    if SSRF_PATTERNS.iter().any(|p| sink.contains(p)) {
        return "Server-Side Request Forgery (SSRF)";
    }
    if PROTO_PATTERNS.iter().any(|p| sink.contains(p)) {
        return "Prototype Pollution";
    }
    if LOG_PATTERNS.iter().any(|p| sink.contains(p)) {
        return "Log Injection";
    }
    if REDIRECT_PATTERNS.iter().any(|p| sink.contains(p)) {
        return "Open Redirect";
    }

    if source.contains("req.body") || source.contains("req.params") || source.contains("req.query")
    {
        return "Unvalidated Input";
    }
    if source.contains("user") || source.contains("input") {
        return "Unvalidated Input";
    }

    "Data Exposure"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xss_wins_over_sql() {
        // res.send would also hit "sql"-family substrings in other
        // orderings; XSS has precedence.
        assert_eq!(
            classify_vulnerability("res.send", None),
            "Cross-Site Scripting (XSS)"
        );
    }

    #[test]
    fn sql_injection_from_query_sinks() {
        assert_eq!(classify_vulnerability("db.query", None), "SQL Injection");
        assert_eq!(classify_vulnerability("cursor.execute", None), "SQL Injection");
    }

    #[test]
    fn eval_is_code_injection() {
        assert_eq!(classify_vulnerability("eval", None), "Code Injection");
        assert_eq!(classify_vulnerability("child_process.spawn", None), "Command Injection");
    }

    #[test]
    fn request_shaped_source_fallback() {
        assert_eq!(
            classify_vulnerability("someOpaqueSink", Some("req.body.name")),
            "Unvalidated Input"
        );
        assert_eq!(classify_vulnerability("someOpaqueSink", None), "Data Exposure");
    }

    #[test]
    fn sanitized_paths_carry_metadata() {
        let mut path = TaintPath::new(
            FlowEndpoint::new("a.ts", 1, "req.body", "req.body"),
            FlowEndpoint::new("b.ts", 9, "res.send", "res.send"),
            Vec::new(),
        );
        path.mark_sanitized("mw.ts".into(), 4, "validate:Schema".into());
        assert_eq!(path.status, FlowStatus::Sanitized);
        assert!(path.sanitizer_file.is_some());
        assert!(path.sanitizer_line.is_some());
        assert!(path.sanitizer_method.is_some());
    }
}
