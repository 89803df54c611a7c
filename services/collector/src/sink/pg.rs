//! PostgreSQL sink.
//!
//! Every event maps to one `eagilog.*` stored-procedure call with
//! textual parameters; types are enforced by SQL casts. The factory
//! owns the connection and the reconnect backoff; each stream sink owns
//! its backlog and interval aggregator.
//!
//! # Backlog protocol
//! `PgSinkFactory::consume` returns `false` only when the connection is
//! down; the stream sink then appends the event to its backlog. While a
//! backlog exists, new events are appended behind it; any forward
//! attempt first drains the backlog in FIFO order, stopping at the
//! first refused event. A statement that fails while the connection is
//! healthy is logged and dropped — never backlogged.

use super::SinkFactory;
use crate::backoff::Backoff;
use async_trait::async_trait;
use logtree_core::store::LogStore;
use logtree_core::{
    AggregateIntervalInfo, ActiveStateInfo, DeclareStateInfo, FinishInfo, HeartbeatInfo, Ident,
    IntervalAggregator, MessageArg, MessageInfo, StreamEvent, StreamId, StreamSink,
};
use sqlx::{Connection, PgConnection, Row};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

const SQL_START_STREAM: &str = "SELECT eagilog.start_stream()";
const SQL_DECLARE_STATE: &str =
    "SELECT eagilog.declare_stream_state($1::INTEGER, $2, $3, $4, $5)";
const SQL_ACTIVE_STATE: &str = "SELECT eagilog.make_stream_state_active($1::INTEGER, $2, $3)";
const SQL_ADD_ENTRY: &str =
    "SELECT eagilog.add_entry($1::INTEGER, $2, $3::BIGINT, $4, $5, $6, $7::INTERVAL)";
const SQL_ADD_ENTRY_NO_TAG: &str =
    "SELECT eagilog.add_entry($1::INTEGER, $2, $3::BIGINT, $4, NULL, $5, $6::INTERVAL)";
const SQL_ARG_BOOLEAN: &str =
    "SELECT eagilog.add_entry_arg_boolean($1::INTEGER, $2, $3, $4::BOOLEAN)";
const SQL_ARG_INTEGER: &str =
    "SELECT eagilog.add_entry_arg_integer($1::INTEGER, $2, $3, $4::NUMERIC)";
const SQL_ARG_FLOAT: &str =
    "SELECT eagilog.add_entry_arg_float($1::INTEGER, $2, $3, $4::DOUBLE PRECISION)";
const SQL_ARG_DURATION: &str =
    "SELECT eagilog.add_entry_arg_duration($1::INTEGER, $2, $3, $4::INTERVAL)";
const SQL_ARG_STRING: &str = "SELECT eagilog.add_entry_arg_string($1::INTEGER, $2, $3, $4)";
const SQL_ARG_MIN_MAX: &str =
    "SELECT eagilog.add_entry_arg_min_max($1::INTEGER, $2, $3::DOUBLE PRECISION, $4::DOUBLE PRECISION)";
const SQL_PROFILE_INTERVAL: &str =
    "SELECT eagilog.add_profile_interval($1, $2, $3, $4, $5::INTERVAL, $6, $7, $8)";
const SQL_HEARTBEAT: &str = "SELECT eagilog.stream_heartbeat($1::INTEGER, $2::INTERVAL)";
const SQL_FINISH: &str = "SELECT eagilog.finish_stream($1::INTEGER, $2::BOOLEAN)";
const SQL_SET_APP_ID: &str = "SELECT eagilog.set_stream_application_id($1::INTEGER, $2)";
const SQL_CREATE_OBJECT: &str =
    "SELECT eagilog.create_object($1, $2, $3, $4, $5, $6::INTERVAL, $7::BOOLEAN)";
const SQL_DESTROY_OBJECT: &str = "SELECT eagilog.destroy_object($1, $2, $3, $4::INTERVAL)";

/// Interval parameters are sent as plain seconds text, which Postgres
/// reads as an unmarked `INTERVAL` quantity.
fn secs(d: Duration) -> String {
    d.as_secs_f32().to_string()
}

fn millis(d: Duration) -> String {
    (d.as_secs_f32() * 1000.0).to_string()
}

fn sql_bool(b: bool) -> &'static str {
    if b { "TRUE" } else { "FALSE" }
}

// ---------------------------------------------------------------------------
// Special arguments: message args that update stream metadata columns
// ---------------------------------------------------------------------------

struct SpecialArg {
    column: &'static str,
    max_len: usize,
}

fn special_args() -> HashMap<u64, HashMap<u64, SpecialArg>> {
    let mut map: HashMap<u64, HashMap<u64, SpecialArg>> = HashMap::new();
    let mut add = |tag: &str, name: &str, column: &'static str, max_len: usize| {
        map.entry(Ident::new(tag).value())
            .or_default()
            .insert(Ident::new(name).value(), SpecialArg { column, max_len });
    };
    add("ProgArgs", "cmd", "command", 128);
    add("OSInfo", "osCodeName", "os_name", 64);
    add("Instance", "osPID", "os_pid", 0);
    add("Instance", "hostname", "hostname", 64);
    add("GitInfo", "gitHashId", "git_hash", 64);
    add("GitInfo", "gitVersion", "git_version", 32);
    add("BuildInfo", "onValgrind", "running_on_valgrind", 0);
    add("BuildInfo", "lowProfile", "low_profile_build", 0);
    add("BuildInfo", "debug", "debug_build", 0);
    add("Compiler", "complrName", "compiler", 32);
    add("Compiler", "archtcture", "architecture", 32);
    add("asignEptId", "eptId", "endpoint_id", 0);
    add("cnfrmEptId", "eptId", "endpoint_id", 0);
    map
}

fn truncated(value: &str, max_len: usize) -> &str {
    if max_len == 0 || value.len() <= max_len {
        return value;
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

// ---------------------------------------------------------------------------
// Per-stream state shared with the factory
// ---------------------------------------------------------------------------

/// The identity facts the factory maintains for one stream.
#[derive(Debug, Default)]
pub struct StreamMeta {
    id: Option<StreamId>,
    root: Option<Ident>,
    root_reported: bool,
    closed: bool,
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Owns the store connection, the reconnect backoff and the special
/// argument table. Wrapped in a mutex and shared by every stream sink.
pub struct PgSinkFactory<S> {
    store: S,
    reconnect: Backoff,
    special: HashMap<u64, HashMap<u64, SpecialArg>>,
}

impl<S: LogStore> PgSinkFactory<S> {
    pub fn new(store: S, reconnect: Backoff) -> Self {
        PgSinkFactory {
            store,
            reconnect,
            special: special_args(),
        }
    }

    /// Direct access to the backing store (inspection, tests).
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Maintenance tick: attempt a reconnect under backoff while the
    /// connection is down.
    pub async fn update(&mut self) {
        if self.store.is_ok().await {
            return;
        }
        if self.reconnect.is_expired() {
            if self.store.reconnect().await {
                debug!("log store reconnected");
                self.reconnect.rewind();
            } else {
                self.reconnect.extend();
                trace!(next = ?self.reconnect.current(), "log store reconnect failed");
            }
        }
    }

    /// Forward one event; `false` means "connection down, backlog it".
    pub async fn consume(&mut self, meta: &mut StreamMeta, event: &StreamEvent) -> bool {
        // Every statement needs the stream row. A stream whose begin
        // record was lost (or is still backlogged) gets its identity on
        // the first event that reaches the store.
        if meta.id.is_none() {
            match self.store.fetch_i64(SQL_START_STREAM, &[]).await {
                Some(id) => meta.id = Some(id),
                None => return self.swallow_if_healthy("start_stream").await,
            }
        }
        let stream_id = meta.id.unwrap_or_default().to_string();
        match event {
            StreamEvent::Begin(_) => true,
            StreamEvent::Description(_) => true,
            StreamEvent::DeclareState(info) => self.declare_state(&stream_id, info).await,
            StreamEvent::ActiveState(info) => self.active_state(&stream_id, info).await,
            StreamEvent::Message(info) => self.message(meta, &stream_id, info).await,
            StreamEvent::AggregateInterval(info) => self.profile_interval(&stream_id, info).await,
            StreamEvent::Heartbeat(info) => self.heartbeat(&stream_id, info).await,
            StreamEvent::Finish(info) => self.finish(&stream_id, info).await,
            // Raw samples never cross the sink/factory boundary.
            StreamEvent::Interval(_) => true,
        }
    }

    /// Statement failed: report and move on when the connection is
    /// healthy, signal back-pressure when it is down.
    async fn swallow_if_healthy(&mut self, what: &str) -> bool {
        if self.store.is_ok().await {
            warn!(statement = what, "statement failed, entry dropped");
            true
        } else {
            false
        }
    }

    async fn run(&mut self, sql: &str, params: &[&str], what: &str) -> bool {
        if self.store.execute(sql, params).await {
            true
        } else {
            self.swallow_if_healthy(what).await
        }
    }

    async fn declare_state(&mut self, stream_id: &str, info: &DeclareStateInfo) -> bool {
        self.run(
            SQL_DECLARE_STATE,
            &[
                stream_id,
                &info.source.name(),
                &info.state_tag.name(),
                &info.begin_tag.name(),
                &info.end_tag.name(),
            ],
            "declare_stream_state",
        )
        .await
    }

    async fn active_state(&mut self, stream_id: &str, info: &ActiveStateInfo) -> bool {
        self.run(
            SQL_ACTIVE_STATE,
            &[stream_id, &info.source.name(), &info.tag.name()],
            "make_stream_state_active",
        )
        .await
    }

    async fn heartbeat(&mut self, stream_id: &str, info: &HeartbeatInfo) -> bool {
        self.run(
            SQL_HEARTBEAT,
            &[stream_id, &secs(info.offset)],
            "stream_heartbeat",
        )
        .await
    }

    async fn finish(&mut self, stream_id: &str, info: &FinishInfo) -> bool {
        self.run(
            SQL_FINISH,
            &[stream_id, sql_bool(info.clean)],
            "finish_stream",
        )
        .await
    }

    async fn profile_interval(&mut self, stream_id: &str, info: &AggregateIntervalInfo) -> bool {
        self.run(
            SQL_PROFILE_INTERVAL,
            &[
                stream_id,
                &info.tag().name(),
                &info.instance().to_string(),
                &info.hit_count().to_string(),
                &secs(info.hit_interval()),
                &millis(info.min_duration()),
                &millis(info.avg_duration()),
                &millis(info.max_duration()),
            ],
            "add_profile_interval",
        )
        .await
    }

    async fn message(&mut self, meta: &mut StreamMeta, stream_id: &str, info: &MessageInfo) -> bool {
        let entry_id = self.add_entry(stream_id, info).await;
        let Some(entry_id) = entry_id else {
            return self.swallow_if_healthy("add_entry").await;
        };
        let entry_id = entry_id.to_string();
        for arg in &info.args {
            self.entry_arg(&entry_id, arg).await;
            self.special_arg(stream_id, info.tag, arg).await;
        }
        self.lifetime(stream_id, info).await;
        if let Some(root) = meta.root {
            if !meta.root_reported {
                meta.root_reported = true;
                self.store
                    .execute(SQL_SET_APP_ID, &[stream_id, &root.name()])
                    .await;
            }
        }
        true
    }

    async fn add_entry(&mut self, stream_id: &str, info: &MessageInfo) -> Option<i64> {
        if info.tag.is_empty() {
            self.store
                .fetch_i64(
                    SQL_ADD_ENTRY_NO_TAG,
                    &[
                        stream_id,
                        &info.source.name(),
                        &info.instance.to_string(),
                        info.severity.name(),
                        &info.format,
                        &secs(info.offset),
                    ],
                )
                .await
        } else {
            self.store
                .fetch_i64(
                    SQL_ADD_ENTRY,
                    &[
                        stream_id,
                        &info.source.name(),
                        &info.instance.to_string(),
                        info.severity.name(),
                        &info.tag.name(),
                        &info.format,
                        &secs(info.offset),
                    ],
                )
                .await
        }
    }

    /// Insert one message argument, dispatching on its kind. Failures
    /// here are argument-local; the entry itself is already stored.
    async fn entry_arg(&mut self, entry_id: &str, arg: &MessageArg) {
        if let (Some(min), Some(max)) = (arg.min, arg.max) {
            self.store
                .execute(
                    SQL_ARG_MIN_MAX,
                    &[
                        entry_id,
                        &arg.name.name(),
                        &min.to_string(),
                        &max.to_string(),
                    ],
                )
                .await;
        }
        let name = arg.name.name();
        let tag = arg.tag.name();
        use logtree_core::ArgValue::*;
        let ok = if arg.tag.matches("duration") || matches!(arg.value, FloatSeconds(_)) {
            let d = arg.value.as_duration().unwrap_or_default();
            self.store
                .execute(SQL_ARG_DURATION, &[entry_id, &name, &tag, &secs(d)])
                .await
        } else {
            match &arg.value {
                Float(v) => {
                    self.store
                        .execute(SQL_ARG_FLOAT, &[entry_id, &name, &tag, &v.to_string()])
                        .await
                }
                UnsignedInt(v) => {
                    self.store
                        .execute(SQL_ARG_INTEGER, &[entry_id, &name, &tag, &v.to_string()])
                        .await
                }
                SignedInt(v) => {
                    self.store
                        .execute(SQL_ARG_INTEGER, &[entry_id, &name, &tag, &v.to_string()])
                        .await
                }
                Bool(v) => {
                    self.store
                        .execute(SQL_ARG_BOOLEAN, &[entry_id, &name, &tag, sql_bool(*v)])
                        .await
                }
                Text(v) if v.is_empty() => true,
                Text(v) => {
                    self.store
                        .execute(SQL_ARG_STRING, &[entry_id, &name, &tag, v])
                        .await
                }
                FloatSeconds(_) => true,
            }
        };
        if !ok {
            debug!(arg = %arg.name, "argument insert failed");
        }
    }

    /// Recognized `(message tag, arg name)` pairs additionally update a
    /// metadata column on the stream row.
    async fn special_arg(&mut self, stream_id: &str, msg_tag: Ident, arg: &MessageArg) {
        let Some(for_tag) = self.special.get(&msg_tag.value()) else {
            return;
        };
        let Some(column) = for_tag.get(&arg.name.value()) else {
            return;
        };
        let sql = format!(
            "SELECT eagilog.set_stream_{}($1::INTEGER, $2)",
            column.column
        );
        if let Some(v) = arg.value.as_i64() {
            self.store.execute(&sql, &[stream_id, &v.to_string()]).await;
        } else if let Some(v) = arg.value.as_bool() {
            self.store.execute(&sql, &[stream_id, sql_bool(v)]).await;
        } else if let Some(v) = arg.value.as_str() {
            self.store
                .execute(&sql, &[stream_id, truncated(v, column.max_len)])
                .await;
        }
    }

    /// Lift object-lifecycle message tags into explicit object RPCs.
    async fn lifetime(&mut self, stream_id: &str, info: &MessageInfo) {
        let tag = info.tag;
        if tag.matches("objCreate") || tag.matches("objCopy") {
            self.object_created(stream_id, info, false).await;
        } else if tag.matches("objMove") {
            self.object_created(stream_id, info, true).await;
        } else if tag.matches("assignCopy") {
            self.object_destroyed(stream_id, info).await;
            self.object_created(stream_id, info, false).await;
        } else if tag.matches("assignMove") {
            self.object_destroyed(stream_id, info).await;
            self.object_created(stream_id, info, true).await;
        } else if tag.matches("objDestroy") {
            self.object_destroyed(stream_id, info).await;
        }
    }

    /// `create_object` needs the parent identity from the `sourceId` /
    /// `sourceInst` arguments; without both the call is suppressed and
    /// the message stays an ordinary entry.
    async fn object_created(&mut self, stream_id: &str, info: &MessageInfo, destroy_parent: bool) {
        let parent_id = info.find_arg("sourceId").and_then(|a| a.value.as_str());
        let parent_inst = info.find_arg("sourceInst").and_then(|a| a.value.as_u64());
        let (Some(parent_id), Some(parent_inst)) = (parent_id, parent_inst) else {
            return;
        };
        self.store
            .execute(
                SQL_CREATE_OBJECT,
                &[
                    stream_id,
                    &info.source.name(),
                    &info.instance.to_string(),
                    parent_id,
                    &parent_inst.to_string(),
                    &secs(info.offset),
                    sql_bool(destroy_parent),
                ],
            )
            .await;
    }

    async fn object_destroyed(&mut self, stream_id: &str, info: &MessageInfo) {
        self.store
            .execute(
                SQL_DESTROY_OBJECT,
                &[
                    stream_id,
                    &info.source.name(),
                    &info.instance.to_string(),
                    &secs(info.offset),
                ],
            )
            .await;
    }
}

// ---------------------------------------------------------------------------
// Per-stream sink
// ---------------------------------------------------------------------------

pub struct PgStreamSink<S> {
    factory: Arc<Mutex<PgSinkFactory<S>>>,
    meta: StreamMeta,
    backlog: Vec<StreamEvent>,
    intervals: IntervalAggregator,
}

impl<S: LogStore> PgStreamSink<S> {
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    async fn dispatch(&mut self, event: StreamEvent) {
        let mut factory = self.factory.lock().await;
        if !self.backlog.is_empty() {
            let mut done = 0;
            for pending in &self.backlog {
                if factory.consume(&mut self.meta, pending).await {
                    done += 1;
                } else {
                    break;
                }
            }
            self.backlog.drain(..done);
        }
        // A surviving backlog means the store is still refusing; keep
        // strict FIFO by queueing behind it.
        if !self.backlog.is_empty() {
            self.backlog.push(event);
            return;
        }
        if !factory.consume(&mut self.meta, &event).await {
            self.backlog.push(event);
        }
    }
}

#[async_trait]
impl<S: LogStore + 'static> StreamSink for PgStreamSink<S> {
    async fn consume(&mut self, event: StreamEvent) {
        if self.meta.closed {
            return;
        }
        match event {
            StreamEvent::Interval(ref sample) => {
                if let Some(agg) = self.intervals.update(sample) {
                    self.intervals.reset(agg.key());
                    self.dispatch(StreamEvent::AggregateInterval(agg)).await;
                }
            }
            StreamEvent::Message(ref m) => {
                if self.meta.root.is_none() {
                    self.meta.root = Some(m.source);
                }
                self.dispatch(event).await;
            }
            StreamEvent::Finish(_) => {
                self.dispatch(event).await;
                self.meta.closed = true;
            }
            _ => self.dispatch(event).await,
        }
    }
}

// ---------------------------------------------------------------------------
// SinkFactory handle
// ---------------------------------------------------------------------------

/// Shareable [`SinkFactory`] facade over the mutex-guarded factory.
pub struct PgSinkHandle<S> {
    factory: Arc<Mutex<PgSinkFactory<S>>>,
    batch_size: u64,
    default_hit_interval: Duration,
}

impl<S: LogStore> PgSinkHandle<S> {
    pub fn new(
        factory: PgSinkFactory<S>,
        batch_size: u64,
        default_hit_interval: Duration,
    ) -> Self {
        PgSinkHandle {
            factory: Arc::new(Mutex::new(factory)),
            batch_size,
            default_hit_interval,
        }
    }

    /// The shared factory, for inspection from tests and embedders.
    pub fn factory(&self) -> Arc<Mutex<PgSinkFactory<S>>> {
        self.factory.clone()
    }

    /// Concretely-typed variant of [`SinkFactory::make_stream`].
    pub fn make_typed_stream(&self) -> PgStreamSink<S> {
        PgStreamSink {
            factory: self.factory.clone(),
            meta: StreamMeta::default(),
            backlog: Vec::new(),
            intervals: IntervalAggregator::new(self.batch_size, self.default_hit_interval),
        }
    }
}

#[async_trait]
impl<S: LogStore + 'static> SinkFactory for PgSinkHandle<S> {
    async fn make_stream(&self) -> Box<dyn StreamSink> {
        Box::new(self.make_typed_stream())
    }

    async fn update(&self) {
        self.factory.lock().await.update().await;
    }
}

// ---------------------------------------------------------------------------
// sqlx-backed store
// ---------------------------------------------------------------------------

/// [`LogStore`] over a single PostgreSQL connection.
///
/// The health flag is maintained from statement outcomes: database-side
/// errors (constraint violations and the like) leave the connection
/// healthy, everything else tears it down until the next reconnect.
pub struct PgStore {
    url: String,
    conn: Option<PgConnection>,
    healthy: bool,
}

impl PgStore {
    /// A store that will connect on the first `reconnect` tick.
    pub fn new(url: impl Into<String>) -> Self {
        PgStore {
            url: url.into(),
            conn: None,
            healthy: false,
        }
    }

    fn note_error(&mut self, error: &sqlx::Error) {
        if matches!(error, sqlx::Error::Database(_) | sqlx::Error::RowNotFound) {
            warn!(%error, "statement failed");
        } else {
            warn!(%error, "log store connection lost");
            self.healthy = false;
            self.conn = None;
        }
    }
}

#[async_trait]
impl LogStore for PgStore {
    async fn is_ok(&mut self) -> bool {
        self.healthy && self.conn.is_some()
    }

    async fn reconnect(&mut self) -> bool {
        match PgConnection::connect(&self.url).await {
            Ok(conn) => {
                self.conn = Some(conn);
                self.healthy = true;
                true
            }
            Err(error) => {
                debug!(%error, "log store connect failed");
                self.conn = None;
                self.healthy = false;
                false
            }
        }
    }

    async fn fetch_i64(&mut self, sql: &str, params: &[&str]) -> Option<i64> {
        let Some(conn) = self.conn.as_mut() else {
            return None;
        };
        let mut query = sqlx::query(sqlx::AssertSqlSafe(sql));
        for p in params {
            query = query.bind(*p);
        }
        match query.fetch_one(conn).await {
            Ok(row) => row
                .try_get::<i64, _>(0)
                .or_else(|_| row.try_get::<i32, _>(0).map(i64::from))
                .ok(),
            Err(error) => {
                self.note_error(&error);
                None
            }
        }
    }

    async fn execute(&mut self, sql: &str, params: &[&str]) -> bool {
        let Some(conn) = self.conn.as_mut() else {
            return false;
        };
        let mut query = sqlx::query(sqlx::AssertSqlSafe(sql));
        for p in params {
            query = query.bind(*p);
        }
        match query.execute(conn).await {
            Ok(_) => true,
            Err(error) => {
                self.note_error(&error);
                false
            }
        }
    }
}
