//! The discard sink.

use super::SinkFactory;
use async_trait::async_trait;
use logtree_core::{StreamEvent, StreamSink};

/// Consumes and drops every event.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl StreamSink for NullSink {
    async fn consume(&mut self, _event: StreamEvent) {}
}

#[derive(Debug, Default)]
pub struct NullSinkFactory;

#[async_trait]
impl SinkFactory for NullSinkFactory {
    async fn make_stream(&self) -> Box<dyn StreamSink> {
        Box::new(NullSink)
    }

    async fn update(&self) {}
}
