//! Test doubles shared by the logtree test suites.
//!
//! [`RecordingSink`] captures the event sequence a parser emits;
//! [`ScriptDb`] stands in for the PostgreSQL backend, with scriptable
//! connection health so backlog/reconnect scenarios run without a
//! database.

use async_trait::async_trait;
use logtree_core::store::LogStore;
use logtree_core::{StreamEvent, StreamSink};
use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// A sink that stores every consumed event.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<StreamEvent>,
}

#[async_trait]
impl StreamSink for RecordingSink {
    async fn consume(&mut self, event: StreamEvent) {
        self.events.push(event);
    }
}

// ---------------------------------------------------------------------------
// ScriptDb
// ---------------------------------------------------------------------------

/// One statement executed against the scripted store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub sql: String,
    pub params: Vec<String>,
}

impl Call {
    /// The `eagilog.<operation>` name of the statement, for assertions.
    pub fn op(&self) -> &str {
        let Some(start) = self.sql.find("eagilog.") else {
            return "";
        };
        let rest = &self.sql[start + "eagilog.".len()..];
        let end = rest
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(rest.len());
        &rest[..end]
    }
}

/// A scripted [`LogStore`] double.
///
/// Statements run only while the store is "up"; `fetch_i64` hands out
/// sequential ids. A list of reconnect outcomes can be scripted, and
/// statement-level failures injected by SQL substring, to exercise both
/// failure classes of the backlog protocol.
#[derive(Debug, Default)]
pub struct ScriptDb {
    up: bool,
    next_id: i64,
    reconnect_script: VecDeque<bool>,
    fail_matching: Vec<String>,
    pub reconnect_attempts: u32,
    pub calls: Vec<Call>,
}

impl ScriptDb {
    /// A store that is immediately connected.
    pub fn up() -> Self {
        ScriptDb {
            up: true,
            ..ScriptDb::default()
        }
    }

    /// A store whose connection is down until a reconnect succeeds.
    pub fn down() -> Self {
        ScriptDb::default()
    }

    /// Force connection health (simulates a drop mid-run).
    pub fn set_up(&mut self, up: bool) {
        self.up = up;
    }

    /// Script the outcome of the next reconnect attempts, in order.
    /// Once the script is exhausted, reconnects succeed.
    pub fn script_reconnects(&mut self, outcomes: impl IntoIterator<Item = bool>) {
        self.reconnect_script.extend(outcomes);
    }

    /// Make statements whose SQL contains `needle` fail while the
    /// connection stays healthy.
    pub fn fail_statements_containing(&mut self, needle: &str) {
        self.fail_matching.push(needle.to_owned());
    }

    /// Operation names of all recorded calls, in order.
    pub fn ops(&self) -> Vec<&str> {
        self.calls.iter().map(Call::op).collect()
    }

    fn statement_fails(&self, sql: &str) -> bool {
        self.fail_matching.iter().any(|n| sql.contains(n))
    }

    fn record(&mut self, sql: &str, params: &[&str]) {
        self.calls.push(Call {
            sql: sql.to_owned(),
            params: params.iter().map(|p| (*p).to_owned()).collect(),
        });
    }
}

#[async_trait]
impl LogStore for ScriptDb {
    async fn is_ok(&mut self) -> bool {
        self.up
    }

    async fn reconnect(&mut self) -> bool {
        self.reconnect_attempts += 1;
        self.up = self.reconnect_script.pop_front().unwrap_or(true);
        self.up
    }

    async fn fetch_i64(&mut self, sql: &str, params: &[&str]) -> Option<i64> {
        if !self.up {
            return None;
        }
        self.record(sql, params);
        if self.statement_fails(sql) {
            return None;
        }
        self.next_id += 1;
        Some(self.next_id)
    }

    async fn execute(&mut self, sql: &str, params: &[&str]) -> bool {
        if !self.up {
            return false;
        }
        self.record(sql, params);
        !self.statement_fails(sql)
    }
}
