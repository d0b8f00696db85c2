//! Taint analysis: access paths, the backward IFDS engine, the forward
//! flow resolver, the sanitizer registry, and vulnerability
//! classification.

pub mod access_path;
pub mod flow_resolver;
pub mod ifds;
pub mod path;
pub mod registry;
pub mod sanitizer;

pub use access_path::AccessPath;
pub use flow_resolver::FlowResolver;
pub use ifds::IfdsAnalyzer;
pub use path::{classify_vulnerability, FlowEndpoint, FlowStatus, Hop, TaintPath};
pub use registry::TaintRegistry;
pub use sanitizer::{SanitizerMatch, SanitizerRegistry};
