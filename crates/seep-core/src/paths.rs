//! Path normalization.
//!
//! Every file path persisted anywhere in either database flows through
//! `normalize` exactly once. Equality downstream is plain string equality.

/// Normalize a path to forward-slash form.
///
/// Windows separators are rewritten; `./` prefixes are stripped so the
/// same file indexed from two spellings collapses to one row.
pub fn normalize(path: &str) -> String {
    let mut out = path.replace('\\', "/");
    while let Some(rest) = out.strip_prefix("./") {
        out = rest.to_string();
    }
    out
}

/// Join a directory and a relative segment, normalized.
pub fn join(dir: &str, segment: &str) -> String {
    let dir = normalize(dir);
    let segment = normalize(segment);
    if dir.is_empty() {
        return segment;
    }
    let mut parts: Vec<&str> = dir.split('/').filter(|p| !p.is_empty()).collect();
    for piece in segment.split('/') {
        match piece {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Parent directory of a normalized path ("" for bare filenames).
pub fn parent(path: &str) -> String {
    let norm = normalize(path);
    match norm.rfind('/') {
        Some(idx) => norm[..idx].to_string(),
        None => String::new(),
    }
}

/// File extension including the leading dot, lowercased ("" if none).
pub fn extension(path: &str) -> String {
    let norm = normalize(path);
    let name = norm.rsplit('/').next().unwrap_or(&norm);
    match name.rfind('.') {
        Some(idx) if idx > 0 => name[idx..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backslashes_collapse() {
        assert_eq!(normalize("src\\a.js"), "src/a.js");
        assert_eq!(normalize("src/a.js"), "src/a.js");
    }

    #[test]
    fn dot_prefix_stripped() {
        assert_eq!(normalize("./src/a.js"), "src/a.js");
    }

    #[test]
    fn join_resolves_parent_segments() {
        assert_eq!(join("src/routes", "../controllers/user.ts"), "src/controllers/user.ts");
        assert_eq!(join("src", "./area.routes"), "src/area.routes");
    }

    #[test]
    fn extension_lowercased() {
        assert_eq!(extension("src/App.TSX"), ".tsx");
        assert_eq!(extension("Dockerfile"), "");
    }
}
