//! logtree-parser: incremental JSON record stream → [`StreamEvent`]s.
//!
//! Bytes go in through [`JsonParser::feed`] in whatever chunks the
//! transport produces; complete records are decoded, dispatched to the
//! sub-parser selected by the `_/t` discriminator, and the assembled
//! events are consumed synchronously by the bound [`StreamSink`].
//!
//! Malformed input never tears down the stream: a broken record is
//! dropped, counted, and parsing resumes at the next record.

mod path;
mod record;
mod scan;

pub use path::{Pat, Path, Pattern};
pub use scan::{RecordScanner, ScanItem};

use path::{P_ARG_OBJ, P_TYPE};

use logtree_core::{FinishInfo, StreamEvent, StreamSink};
use record::{
    ActiveStateParser, BeginParser, DeclareStateParser, DescriptionParser, FinishParser,
    HeartbeatParser, IntervalParser, MessageParser, RecordParser, Token,
};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::trace;

/// Upper bound on a single materialized string token. Longer tokens are
/// truncated at a char boundary and counted as a failure.
const MAX_TOKEN_BYTES: usize = 256;

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserStats {
    /// Events emitted to the sink (excluding a synthesized finish).
    pub records: u64,
    /// Records dropped: lexical garbage, truncation, oversize, bad JSON.
    pub dropped: u64,
    /// Records skipped whole: unknown or missing discriminator.
    pub skipped: u64,
    /// String tokens truncated to the size bound.
    pub truncated: u64,
}

struct WalkCtx {
    current: Option<&'static str>,
    saw_type: bool,
}

/// The incremental parser, bound to one stream's sink.
pub struct JsonParser<S> {
    scanner: RecordScanner,
    parsers: HashMap<&'static str, Box<dyn RecordParser>>,
    sink: S,
    stats: ParserStats,
    last_offset: Duration,
    begun: bool,
    finished: bool,
}

impl<S: StreamSink> JsonParser<S> {
    pub fn new(sink: S) -> Self {
        let mut parsers: HashMap<&'static str, Box<dyn RecordParser>> = HashMap::new();
        parsers.insert("begin", Box::new(BeginParser::default()));
        parsers.insert("m", Box::new(MessageParser::default()));
        parsers.insert("ds", Box::new(DeclareStateParser::default()));
        parsers.insert("as", Box::new(ActiveStateParser::default()));
        parsers.insert("i", Box::new(IntervalParser::default()));
        parsers.insert("hb", Box::new(HeartbeatParser::default()));
        parsers.insert("end", Box::new(FinishParser::default()));
        parsers.insert("d", Box::new(DescriptionParser::default()));
        JsonParser {
            scanner: RecordScanner::default(),
            parsers,
            sink,
            stats: ParserStats::default(),
            last_offset: Duration::ZERO,
            begun: false,
            finished: false,
        }
    }

    /// Feed one chunk of bytes, emitting any completed events.
    pub async fn feed(&mut self, bytes: &[u8]) {
        let mut items = Vec::new();
        self.scanner.feed(bytes, &mut items);
        self.process(items).await;
    }

    /// Flush at end of input. A stream that produced events but never
    /// sent an `end` record gets a synthesized unclean finish.
    pub async fn finish(&mut self) {
        let mut items = Vec::new();
        self.scanner.finish(&mut items);
        self.process(items).await;
        if self.begun && !self.finished {
            let ev = StreamEvent::Finish(FinishInfo {
                offset: self.last_offset,
                clean: false,
            });
            self.finished = true;
            self.sink.consume(ev).await;
        }
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    async fn process(&mut self, items: Vec<ScanItem>) {
        for item in items {
            match item {
                ScanItem::Record(bytes) => {
                    if let Some(event) = self.parse_record(&bytes) {
                        self.observe(&event);
                        self.stats.records += 1;
                        self.sink.consume(event).await;
                    }
                }
                ScanItem::Garbage | ScanItem::Oversize | ScanItem::Truncated => self.failed(),
            }
        }
    }

    fn observe(&mut self, event: &StreamEvent) {
        if let Some(offset) = event.offset() {
            self.last_offset = offset;
        }
        self.begun = true;
        if matches!(event, StreamEvent::Finish(_)) {
            self.finished = true;
        }
    }

    fn failed(&mut self) {
        self.stats.dropped += 1;
        trace!(dropped = self.stats.dropped, "record dropped");
    }

    fn parse_record(&mut self, bytes: &[u8]) -> Option<StreamEvent> {
        let value: Value = match serde_json::from_slice(bytes) {
            Ok(v) => v,
            Err(error) => {
                trace!(%error, "record decode failed");
                self.failed();
                return None;
            }
        };
        let Value::Object(outer) = value else {
            self.failed();
            return None;
        };
        // Records arrive either wrapped as {"_": {...}} or flat; both
        // address the same `_/...` paths.
        let root = match outer.get("_") {
            Some(Value::Object(inner)) if outer.len() == 1 => inner,
            _ => &outer,
        };

        let mut ctx = WalkCtx {
            current: None,
            saw_type: false,
        };
        let mut path = Path::root();
        for (key, val) in root {
            path.push_key(key);
            self.walk(&mut path, val, &mut ctx);
            path.pop();
        }

        if !ctx.saw_type {
            self.stats.skipped += 1;
            return None;
        }
        match ctx.current {
            Some(kind) => Some(
                self.parsers
                    .get_mut(kind)
                    .expect("selected parser exists")
                    .take(),
            ),
            None => {
                // Discriminator present but unknown: skip the record.
                self.stats.skipped += 1;
                None
            }
        }
    }

    fn walk(&mut self, path: &mut Path, value: &Value, ctx: &mut WalkCtx) {
        match value {
            Value::Null => {}
            Value::Bool(b) => self.scalar(path, &Token::Bool(*b), ctx),
            Value::Number(n) => {
                let tok = if let Some(u) = n.as_u64() {
                    Token::U64(u)
                } else if let Some(i) = n.as_i64() {
                    Token::I64(i)
                } else {
                    Token::F32(n.as_f64().unwrap_or_default() as f32)
                };
                self.scalar(path, &tok, ctx);
            }
            Value::String(s) => {
                if path.like(&P_TYPE) {
                    ctx.saw_type = true;
                    ctx.current = self.select(s);
                } else {
                    let s = self.bounded(s);
                    self.scalar(path, &Token::Str(s), ctx);
                }
            }
            Value::Array(items) => {
                for (idx, item) in items.iter().enumerate() {
                    path.push_idx(idx);
                    self.walk(path, item, ctx);
                    path.pop();
                }
            }
            Value::Object(fields) => {
                if let Some(kind) = ctx.current {
                    if path.like(&P_ARG_OBJ) {
                        if let Some(parser) = self.parsers.get_mut(kind) {
                            parser.add_arg();
                        }
                    }
                }
                for (key, val) in fields {
                    path.push_key(key);
                    self.walk(path, val, ctx);
                    path.pop();
                }
            }
        }
    }

    fn scalar(&mut self, path: &Path, tok: &Token<'_>, ctx: &mut WalkCtx) {
        if let Some(kind) = ctx.current {
            if let Some(parser) = self.parsers.get_mut(kind) {
                parser.on_value(path, tok);
            }
        }
    }

    fn select(&mut self, kind: &str) -> Option<&'static str> {
        let key = self.parsers.keys().copied().find(|k| *k == kind)?;
        if let Some(parser) = self.parsers.get_mut(key) {
            parser.reset();
        }
        Some(key)
    }

    /// Enforce the token size bound, truncating at a char boundary.
    fn bounded<'a>(&mut self, s: &'a str) -> &'a str {
        if s.len() <= MAX_TOKEN_BYTES {
            return s;
        }
        self.stats.truncated += 1;
        let mut end = MAX_TOKEN_BYTES;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}
