//! logtree-core: event model and contracts shared by the log server pieces.
//!
//! This crate holds the types a reconstructed log session is made of
//! (identifiers, severities, typed argument values, the `StreamEvent`
//! sum type), the per-stream interval aggregator, and the two seams the
//! rest of the workspace plugs into: [`StreamSink`] (per-stream event
//! consumer) and [`store::LogStore`] (relational storage backend).

pub mod event;
pub mod ident;
pub mod interval;
pub mod severity;
pub mod store;

pub use event::{
    ActiveStateInfo, ArgValue, BeginInfo, DeclareStateInfo, DescriptionInfo, FinishInfo,
    HeartbeatInfo, IntervalInfo, MessageArg, MessageInfo, StreamEvent, StreamSink,
};
pub use ident::Ident;
pub use interval::{AggregateIntervalInfo, IntervalAggregator};
pub use severity::Severity;

/// Stream identity assigned by a sink factory; unique within one run.
pub type StreamId = i64;
