//! Typed events of a reconstructed log session.
//!
//! Every producer stream is a sequence of these: one `Begin`, then
//! messages / heartbeats / interval samples / state declarations, then
//! at most one `Finish`. The [`StreamEvent`] sum type keeps sinks and
//! backlogs homogeneous; sinks match exhaustively in one place.

use crate::ident::Ident;
use crate::interval::AggregateIntervalInfo;
use crate::severity::Severity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Argument values
// ---------------------------------------------------------------------------

/// A typed message argument value.
///
/// The variant mirrors the JSON token encoding the producer used:
/// `1` arrives as `UnsignedInt`, `-1` as `SignedInt`, `1.0` as `Float`.
/// Downstream consumers (notably the SQL sink) dispatch on the variant,
/// so the distinction is preserved end to end.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Bool(bool),
    SignedInt(i64),
    UnsignedInt(u64),
    Float(f32),
    /// A duration expressed in seconds (argument carried a `"u":"s"` unit).
    FloatSeconds(Duration),
    Text(String),
}

impl Default for ArgValue {
    fn default() -> Self {
        ArgValue::Text(String::new())
    }
}

impl ArgValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Signed view; also accepts unsigned values that fit, mirroring the
    /// integer dispatch used for stream metadata columns.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ArgValue::SignedInt(v) => Some(*v),
            ArgValue::UnsignedInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ArgValue::UnsignedInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            ArgValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            ArgValue::FloatSeconds(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One named argument of a log message.
///
/// `min`/`max` are present only when the producer sent the matching
/// tokens and are meaningful only for numeric values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageArg {
    pub name: Ident,
    pub tag: Ident,
    pub value: ArgValue,
    pub min: Option<f32>,
    pub max: Option<f32>,
}

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

/// Opens a stream's logical session.
#[derive(Debug, Clone, PartialEq)]
pub struct BeginInfo {
    pub start: DateTime<Utc>,
    pub session: String,
    pub identity: String,
}

impl Default for BeginInfo {
    fn default() -> Self {
        BeginInfo {
            start: Utc::now(),
            session: String::new(),
            identity: String::new(),
        }
    }
}

/// A single log message with its arguments, in reception order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageInfo {
    pub offset: Duration,
    pub format: String,
    pub severity: Severity,
    pub source: Ident,
    pub tag: Ident,
    pub instance: u64,
    pub args: Vec<MessageArg>,
}

impl MessageInfo {
    /// Find an argument by name.
    pub fn find_arg(&self, name: &str) -> Option<&MessageArg> {
        let id = Ident::new(name);
        self.args.iter().find(|a| a.name == id)
    }
}

/// Declares a named state delimited by begin/end message tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclareStateInfo {
    pub offset: Duration,
    pub source: Ident,
    pub state_tag: Ident,
    pub begin_tag: Ident,
    pub end_tag: Ident,
    pub instance: u64,
}

/// Marks a previously declared state as active.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveStateInfo {
    pub offset: Duration,
    pub source: Ident,
    pub tag: Ident,
}

/// One raw profiling interval sample. Never crosses the sink/factory
/// boundary; only [`AggregateIntervalInfo`] does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntervalInfo {
    pub offset: Duration,
    pub tag: Ident,
    pub instance: u64,
    pub duration: Duration,
}

/// Periodic liveness signal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeartbeatInfo {
    pub offset: Duration,
}

/// Closes a stream's logical session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinishInfo {
    pub offset: Duration,
    pub clean: bool,
}

/// Human-readable description of a logger object instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptionInfo {
    pub source: Ident,
    pub instance: u64,
    pub display_name: String,
    pub description: String,
}

// ---------------------------------------------------------------------------
// The event sum type
// ---------------------------------------------------------------------------

/// Any event of a single stream, in the order the parser produced it.
///
/// `AggregateInterval` is never produced by the parser; it is
/// constructed by [`crate::IntervalAggregator`] inside a sink and is the
/// only interval shape forwarded to persistence.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Begin(BeginInfo),
    Description(DescriptionInfo),
    DeclareState(DeclareStateInfo),
    ActiveState(ActiveStateInfo),
    Message(MessageInfo),
    Interval(IntervalInfo),
    AggregateInterval(AggregateIntervalInfo),
    Heartbeat(HeartbeatInfo),
    Finish(FinishInfo),
}

impl StreamEvent {
    /// The time offset carried by this event, when it has one.
    pub fn offset(&self) -> Option<Duration> {
        match self {
            StreamEvent::Begin(_)
            | StreamEvent::Description(_)
            | StreamEvent::AggregateInterval(_) => None,
            StreamEvent::DeclareState(i) => Some(i.offset),
            StreamEvent::ActiveState(i) => Some(i.offset),
            StreamEvent::Message(i) => Some(i.offset),
            StreamEvent::Interval(i) => Some(i.offset),
            StreamEvent::Heartbeat(i) => Some(i.offset),
            StreamEvent::Finish(i) => Some(i.offset),
        }
    }
}

// ---------------------------------------------------------------------------
// Sink contract
// ---------------------------------------------------------------------------

/// Per-stream consumer of events.
///
/// A sink receives the events of exactly one stream, in parser order.
/// Implementations must latch the source of the first `Message` as the
/// stream's root identifier, route raw `Interval` samples through an
/// aggregator rather than forwarding them, and tolerate a missing
/// `Begin` (the first event of any kind implicitly opens the session).
#[async_trait]
pub trait StreamSink: Send {
    async fn consume(&mut self, event: StreamEvent);
}

#[async_trait]
impl<S: StreamSink + ?Sized> StreamSink for Box<S> {
    async fn consume(&mut self, event: StreamEvent) {
        (**self).consume(event).await;
    }
}

#[async_trait]
impl<'a, S: StreamSink + ?Sized> StreamSink for &'a mut S {
    async fn consume(&mut self, event: StreamEvent) {
        (**self).consume(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arg_value_accessors_match_variant_only() {
        assert_eq!(ArgValue::Bool(true).as_bool(), Some(true));
        assert_eq!(ArgValue::Bool(true).as_i64(), None);
        assert_eq!(ArgValue::SignedInt(-3).as_i64(), Some(-3));
        assert_eq!(ArgValue::SignedInt(-3).as_u64(), None);
        assert_eq!(ArgValue::UnsignedInt(7).as_u64(), Some(7));
        assert_eq!(ArgValue::Float(1.5).as_f32(), Some(1.5));
        assert_eq!(ArgValue::Float(1.5).as_str(), None);
        assert_eq!(
            ArgValue::FloatSeconds(Duration::from_millis(250)).as_duration(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(ArgValue::Text("x".into()).as_str(), Some("x"));
    }

    #[test]
    fn unsigned_fits_signed_view() {
        assert_eq!(ArgValue::UnsignedInt(42).as_i64(), Some(42));
        assert_eq!(ArgValue::UnsignedInt(u64::MAX).as_i64(), None);
    }

    #[test]
    fn default_value_is_empty_text() {
        assert_eq!(ArgValue::default().as_str(), Some(""));
    }

    #[test]
    fn find_arg_by_name() {
        let msg = MessageInfo {
            args: vec![
                MessageArg {
                    name: Ident::new("who"),
                    ..MessageArg::default()
                },
                MessageArg {
                    name: Ident::new("what"),
                    value: ArgValue::UnsignedInt(1),
                    ..MessageArg::default()
                },
            ],
            ..MessageInfo::default()
        };
        assert!(msg.find_arg("what").is_some());
        assert!(msg.find_arg("when").is_none());
    }

    #[test]
    fn event_offset_extraction() {
        let ev = StreamEvent::Heartbeat(HeartbeatInfo {
            offset: Duration::from_secs(2),
        });
        assert_eq!(ev.offset(), Some(Duration::from_secs(2)));
        assert_eq!(StreamEvent::Begin(BeginInfo::default()).offset(), None);
    }
}
