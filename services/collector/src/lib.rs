//! collector: the logtree aggregation server.
//!
//! Accepts JSON log record streams on stdin or a TCP socket, one
//! producer per connection, and routes the reconstructed per-stream
//! events to the configured sinks: the terminal tree renderer, the
//! PostgreSQL sink with backlog/reconnect handling, and the plain-text
//! and null variants.

pub mod backoff;
pub mod config;
pub mod fmt;
pub mod listen;
pub mod reader;
pub mod sink;

pub use config::{CollectorConfig, ConfigError};
pub use reader::{ReaderError, run_reader};
pub use sink::SinkFactory;
