//! Filesystem scanning: parallel walk, language detection, hashing.

pub mod hasher;
pub mod language;
pub mod walker;

pub use language::Language;
pub use walker::{walk_directory, DiscoveredFile};
