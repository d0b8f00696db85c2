//! Content hashing.
//!
//! SHA-256 for persisted identity (`files.sha256`, build signatures);
//! xxh3 for in-process cache keys where speed matters.

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a byte slice.
pub fn sha256_hex(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Fast 64-bit content hash for cache keys.
pub fn content_key(content: &[u8]) -> u64 {
    xxhash_rust::xxh3::xxh3_64(content)
}

/// Count lines the way `files.loc` expects: newline count, plus one for
/// a trailing unterminated line.
pub fn count_loc(content: &str) -> i64 {
    if content.is_empty() {
        return 0;
    }
    let newlines = content.bytes().filter(|b| *b == b'\n').count() as i64;
    if content.ends_with('\n') {
        newlines
    } else {
        newlines + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_stable() {
        assert_eq!(sha256_hex(b"abc").len(), 64);
        assert_eq!(sha256_hex(b"abc"), sha256_hex(b"abc"));
        assert_ne!(sha256_hex(b"abc"), sha256_hex(b"abd"));
    }

    #[test]
    fn loc_counts_unterminated_tail() {
        assert_eq!(count_loc(""), 0);
        assert_eq!(count_loc("a\nb\n"), 2);
        assert_eq!(count_loc("a\nb"), 2);
    }
}
