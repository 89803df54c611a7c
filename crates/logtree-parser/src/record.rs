//! Per-discriminator record parsers.
//!
//! Each record type (`begin`, `m`, `ds`, `as`, `i`, `hb`, `end`, `d`)
//! has a small parser assembling its info struct from `(path, token)`
//! calls. Unknown paths are ignored silently; missing fields keep their
//! defaults, and consumers are tolerant of defaulted events.

use crate::path::{
    P_ARG_FIELD, P_INSTANCE, P_OFFSET, P_SOURCE, P_TAG, Pat, Path, Pattern,
};
use chrono::NaiveDateTime;
use logtree_core::{
    ActiveStateInfo, ArgValue, BeginInfo, DeclareStateInfo, DescriptionInfo, FinishInfo,
    HeartbeatInfo, Ident, IntervalInfo, MessageInfo, Severity, StreamEvent,
};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// One typed scalar from a record, keyed by its path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'a> {
    Bool(bool),
    I64(i64),
    U64(u64),
    F32(f32),
    Str(&'a str),
}

impl Token<'_> {
    /// Interpret a numeric token as non-negative seconds.
    fn as_secs(&self) -> Option<Duration> {
        match *self {
            Token::I64(v) => u64::try_from(v).ok().map(Duration::from_secs),
            Token::U64(v) => Some(Duration::from_secs(v)),
            Token::F32(v) => Duration::try_from_secs_f32(v).ok(),
            _ => None,
        }
    }

    /// Interpret a numeric token as non-negative nanoseconds.
    fn as_nanos(&self) -> Option<Duration> {
        match *self {
            Token::I64(v) => u64::try_from(v).ok().map(Duration::from_nanos),
            Token::U64(v) => Some(Duration::from_nanos(v)),
            Token::F32(v) => {
                if v >= 0.0 {
                    Some(Duration::from_nanos(v as u64))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn as_f32(&self) -> Option<f32> {
        match *self {
            Token::I64(v) => Some(v as f32),
            Token::U64(v) => Some(v as f32),
            Token::F32(v) => Some(v),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Parser trait
// ---------------------------------------------------------------------------

/// Assembles one record type from path-keyed tokens.
pub(crate) trait RecordParser: Send {
    /// Clear state before a new record of this type.
    fn reset(&mut self);

    /// A new element of the argument array begins.
    fn add_arg(&mut self) {}

    /// One scalar at the given record-relative path.
    fn on_value(&mut self, path: &Path, tok: &Token<'_>);

    /// Hand over the assembled event, leaving the parser reset.
    fn take(&mut self) -> StreamEvent;
}

// ---------------------------------------------------------------------------
// begin
// ---------------------------------------------------------------------------

const P_SESSION: Pattern = Pattern(&[Pat::Any, Pat::Lit("session")]);
const P_IDENTITY: Pattern = Pattern(&[Pat::Any, Pat::Lit("identity")]);
const P_TIME: Pattern = Pattern(&[Pat::Any, Pat::Lit("time")]);

#[derive(Default)]
pub(crate) struct BeginParser {
    info: Option<BeginInfo>,
}

impl BeginParser {
    fn info(&mut self) -> &mut BeginInfo {
        self.info.get_or_insert_with(BeginInfo::default)
    }
}

impl RecordParser for BeginParser {
    fn reset(&mut self) {
        self.info = Some(BeginInfo::default());
    }

    fn on_value(&mut self, path: &Path, tok: &Token<'_>) {
        if let Token::Str(s) = tok {
            if path.like(&P_SESSION) {
                self.info().session = (*s).to_owned();
            } else if path.like(&P_IDENTITY) {
                self.info().identity = (*s).to_owned();
            } else if path.like(&P_TIME) {
                if let Ok(t) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                    self.info().start = t.and_utc();
                }
            }
        }
    }

    fn take(&mut self) -> StreamEvent {
        StreamEvent::Begin(self.info.take().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// message
// ---------------------------------------------------------------------------

const P_FORMAT: Pattern = Pattern(&[Pat::Any, Pat::Lit("f")]);
const P_LEVEL: Pattern = Pattern(&[Pat::Any, Pat::Lit("lvl")]);

#[derive(Default)]
pub(crate) struct MessageParser {
    info: MessageInfo,
    /// Set when the current argument carried a `"u":"s"` unit token.
    unit_secs: bool,
}

impl MessageParser {
    fn on_arg_value(&mut self, path: &Path, tok: &Token<'_>) {
        let unit_secs = self.unit_secs;
        let Some(arg) = self.info.args.last_mut() else {
            return;
        };
        if path.ends_with("v") {
            arg.value = match *tok {
                Token::Bool(b) => ArgValue::Bool(b),
                Token::I64(v) if unit_secs => seconds_value(v as f32, ArgValue::SignedInt(v)),
                Token::I64(v) => ArgValue::SignedInt(v),
                Token::U64(v) if unit_secs => seconds_value(v as f32, ArgValue::UnsignedInt(v)),
                Token::U64(v) => ArgValue::UnsignedInt(v),
                Token::F32(v) if unit_secs => seconds_value(v, ArgValue::Float(v)),
                Token::F32(v) => ArgValue::Float(v),
                Token::Str(s) => ArgValue::Text(s.to_owned()),
            };
        } else if path.ends_with("n") {
            if let Token::Str(s) = tok {
                arg.name = Ident::new(s);
            }
        } else if path.ends_with("t") {
            if let Token::Str(s) = tok {
                arg.tag = Ident::new(s);
            }
        } else if path.ends_with("u") {
            if matches!(*tok, Token::Str("s")) {
                self.unit_secs = true;
                // The value may have arrived before the unit.
                arg.value = match std::mem::take(&mut arg.value) {
                    ArgValue::Float(v) => seconds_value(v, ArgValue::Float(v)),
                    ArgValue::UnsignedInt(v) => {
                        seconds_value(v as f32, ArgValue::UnsignedInt(v))
                    }
                    ArgValue::SignedInt(v) => seconds_value(v as f32, ArgValue::SignedInt(v)),
                    other => other,
                };
            }
        } else if path.ends_with("min") {
            arg.min = tok.as_f32();
        } else if path.ends_with("max") {
            arg.max = tok.as_f32();
        }
    }
}

/// A numeric argument in seconds; falls back when out of `Duration` range.
fn seconds_value(secs: f32, fallback: ArgValue) -> ArgValue {
    Duration::try_from_secs_f32(secs).map_or(fallback, ArgValue::FloatSeconds)
}

impl RecordParser for MessageParser {
    fn reset(&mut self) {
        self.info = MessageInfo::default();
        self.unit_secs = false;
    }

    fn add_arg(&mut self) {
        self.info.args.push(Default::default());
        self.unit_secs = false;
    }

    fn on_value(&mut self, path: &Path, tok: &Token<'_>) {
        if path.like(&P_ARG_FIELD) {
            self.on_arg_value(path, tok);
            return;
        }
        match tok {
            Token::Str(s) => {
                if path.like(&P_FORMAT) {
                    self.info.format = (*s).to_owned();
                } else if path.like(&P_LEVEL) {
                    self.info.severity = s.parse().unwrap_or(Severity::Info);
                } else if path.like(&P_SOURCE) {
                    self.info.source = Ident::new(s);
                } else if path.like(&P_TAG) {
                    self.info.tag = Ident::new(s);
                }
            }
            Token::U64(v) if path.like(&P_INSTANCE) => self.info.instance = *v,
            tok if path.like(&P_OFFSET) => {
                if let Some(d) = tok.as_secs() {
                    self.info.offset = d;
                }
            }
            _ => {}
        }
    }

    fn take(&mut self) -> StreamEvent {
        self.unit_secs = false;
        StreamEvent::Message(std::mem::take(&mut self.info))
    }
}

// ---------------------------------------------------------------------------
// declare state
// ---------------------------------------------------------------------------

const P_BEGIN_TAG: Pattern = Pattern(&[Pat::Any, Pat::Lit("bgn")]);
const P_END_TAG: Pattern = Pattern(&[Pat::Any, Pat::Lit("end")]);

#[derive(Default)]
pub(crate) struct DeclareStateParser {
    info: DeclareStateInfo,
}

impl RecordParser for DeclareStateParser {
    fn reset(&mut self) {
        self.info = DeclareStateInfo::default();
    }

    fn on_value(&mut self, path: &Path, tok: &Token<'_>) {
        match tok {
            Token::Str(s) => {
                if path.like(&P_SOURCE) {
                    self.info.source = Ident::new(s);
                } else if path.like(&P_TAG) {
                    self.info.state_tag = Ident::new(s);
                } else if path.like(&P_BEGIN_TAG) {
                    self.info.begin_tag = Ident::new(s);
                } else if path.like(&P_END_TAG) {
                    self.info.end_tag = Ident::new(s);
                }
            }
            Token::U64(v) if path.like(&P_INSTANCE) => self.info.instance = *v,
            tok if path.like(&P_OFFSET) => {
                if let Some(d) = tok.as_secs() {
                    self.info.offset = d;
                }
            }
            _ => {}
        }
    }

    fn take(&mut self) -> StreamEvent {
        StreamEvent::DeclareState(std::mem::take(&mut self.info))
    }
}

// ---------------------------------------------------------------------------
// active state
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct ActiveStateParser {
    info: ActiveStateInfo,
}

impl RecordParser for ActiveStateParser {
    fn reset(&mut self) {
        self.info = ActiveStateInfo::default();
    }

    fn on_value(&mut self, path: &Path, tok: &Token<'_>) {
        match tok {
            Token::Str(s) => {
                if path.like(&P_SOURCE) {
                    self.info.source = Ident::new(s);
                } else if path.like(&P_TAG) {
                    self.info.tag = Ident::new(s);
                }
            }
            tok if path.like(&P_OFFSET) => {
                if let Some(d) = tok.as_secs() {
                    self.info.offset = d;
                }
            }
            _ => {}
        }
    }

    fn take(&mut self) -> StreamEvent {
        StreamEvent::ActiveState(std::mem::take(&mut self.info))
    }
}

// ---------------------------------------------------------------------------
// interval
// ---------------------------------------------------------------------------

const P_NANOS: Pattern = Pattern(&[Pat::Any, Pat::Lit("tns")]);

#[derive(Default)]
pub(crate) struct IntervalParser {
    info: IntervalInfo,
}

impl RecordParser for IntervalParser {
    fn reset(&mut self) {
        self.info = IntervalInfo::default();
    }

    fn on_value(&mut self, path: &Path, tok: &Token<'_>) {
        match tok {
            Token::Str(s) if path.like(&P_TAG) => self.info.tag = Ident::new(s),
            Token::U64(v) if path.like(&P_INSTANCE) => self.info.instance = *v,
            tok if path.like(&P_NANOS) => {
                if let Some(d) = tok.as_nanos() {
                    self.info.duration = d;
                }
            }
            tok if path.like(&P_OFFSET) => {
                if let Some(d) = tok.as_secs() {
                    self.info.offset = d;
                }
            }
            _ => {}
        }
    }

    fn take(&mut self) -> StreamEvent {
        StreamEvent::Interval(std::mem::take(&mut self.info))
    }
}

// ---------------------------------------------------------------------------
// heartbeat
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct HeartbeatParser {
    info: HeartbeatInfo,
}

impl RecordParser for HeartbeatParser {
    fn reset(&mut self) {
        self.info = HeartbeatInfo::default();
    }

    fn on_value(&mut self, path: &Path, tok: &Token<'_>) {
        if path.like(&P_OFFSET) {
            if let Some(d) = tok.as_secs() {
                self.info.offset = d;
            }
        }
    }

    fn take(&mut self) -> StreamEvent {
        StreamEvent::Heartbeat(std::mem::take(&mut self.info))
    }
}

// ---------------------------------------------------------------------------
// finish
// ---------------------------------------------------------------------------

const P_CLEAN: Pattern = Pattern(&[Pat::Any, Pat::Lit("clean")]);

#[derive(Default)]
pub(crate) struct FinishParser {
    info: FinishInfo,
}

impl RecordParser for FinishParser {
    fn reset(&mut self) {
        // An omitted `clean` flag means an unclean shutdown.
        self.info = FinishInfo::default();
    }

    fn on_value(&mut self, path: &Path, tok: &Token<'_>) {
        match tok {
            Token::Bool(b) if path.like(&P_CLEAN) => self.info.clean = *b,
            tok if path.like(&P_OFFSET) => {
                if let Some(d) = tok.as_secs() {
                    self.info.offset = d;
                }
            }
            _ => {}
        }
    }

    fn take(&mut self) -> StreamEvent {
        StreamEvent::Finish(std::mem::take(&mut self.info))
    }
}

// ---------------------------------------------------------------------------
// description
// ---------------------------------------------------------------------------

const P_DISPLAY_NAME: Pattern = Pattern(&[Pat::Any, Pat::Lit("dn")]);
const P_DESCRIPTION: Pattern = Pattern(&[Pat::Any, Pat::Lit("desc")]);

#[derive(Default)]
pub(crate) struct DescriptionParser {
    info: DescriptionInfo,
}

impl RecordParser for DescriptionParser {
    fn reset(&mut self) {
        self.info = DescriptionInfo::default();
    }

    fn on_value(&mut self, path: &Path, tok: &Token<'_>) {
        match tok {
            Token::Str(s) => {
                if path.like(&P_SOURCE) {
                    self.info.source = Ident::new(s);
                } else if path.like(&P_DISPLAY_NAME) {
                    self.info.display_name = (*s).to_owned();
                } else if path.like(&P_DESCRIPTION) {
                    self.info.description = (*s).to_owned();
                }
            }
            Token::U64(v) if path.like(&P_INSTANCE) => self.info.instance = *v,
            _ => {}
        }
    }

    fn take(&mut self) -> StreamEvent {
        StreamEvent::Description(std::mem::take(&mut self.info))
    }
}
