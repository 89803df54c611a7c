//! Relational storage seam used by the SQL sink.
//!
//! The SQL sink formats every event into one parameterised statement
//! with textual parameters; this trait is the narrow surface it runs
//! them through. The production implementation wraps a PostgreSQL
//! connection; tests drive the sink with a scripted double.

use async_trait::async_trait;

/// A connection-like handle to the log database.
///
/// Failure reporting is deliberately coarse: `execute`/`fetch_i64`
/// return plain success, and the caller distinguishes a transient
/// connection loss from a statement-level failure by checking
/// [`LogStore::is_ok`] afterwards. That split drives the backlog
/// protocol — connection-down failures are retried from the backlog,
/// statement failures on a healthy connection are dropped.
#[async_trait]
pub trait LogStore: Send {
    /// Current connection health.
    async fn is_ok(&mut self) -> bool;

    /// Attempt to (re-)establish the connection; true on success.
    async fn reconnect(&mut self) -> bool;

    /// Run a statement returning a single integer scalar.
    async fn fetch_i64(&mut self, sql: &str, params: &[&str]) -> Option<i64>;

    /// Run a statement; true on success.
    async fn execute(&mut self, sql: &str, params: &[&str]) -> bool;
}
