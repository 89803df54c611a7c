//! logtree: structured log-aggregation suite.
//!
//! Convenience re-exports of the workspace crates; the runnable server
//! lives in `services/collector`.

pub use logtree_core as model;
pub use logtree_parser as parser;
