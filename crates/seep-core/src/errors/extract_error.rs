//! Extraction errors.
//!
//! Extractors never raise across the orchestrator boundary for a single
//! malformed source file; `ParseFailed` is recorded as a finding and the
//! walk continues. The remaining variants are fatal.

/// Errors produced inside a language extractor.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to parse {file}: {message}")]
    ParseFailed { file: String, message: String },

    #[error("extractor subprocess timed out after {seconds}s")]
    SubprocessTimeout { seconds: u64 },

    #[error("extractor subprocess failed: {message}")]
    SubprocessFailed { message: String },

    #[error("extractor build is out of date; rebuild completed, re-run required")]
    BuildOutOfDate,

    #[error("malformed extractor output for {file}: {message}")]
    MalformedOutput { file: String, message: String },

    #[error("io error on {path}: {message}")]
    Io { path: String, message: String },
}
