//! Sink factories and sink combinators.
//!
//! A factory owns the resources its sinks share (output device, DB
//! connection) and produces one [`StreamSink`] per producer stream. The
//! embedding ticks every factory via [`SinkFactory::update`] once per
//! reader iteration.

pub mod null;
pub mod pg;
pub mod text;
pub mod tree;

use async_trait::async_trait;
use logtree_core::{Severity, StreamEvent, StreamSink};
use std::sync::Arc;

/// Produces per-stream sinks and holds sink-wide resources.
#[async_trait]
pub trait SinkFactory: Send + Sync {
    async fn make_stream(&self) -> Box<dyn StreamSink>;

    /// Periodic maintenance tick (flush, reconnect attempts).
    async fn update(&self);
}

// ---------------------------------------------------------------------------
// Fan-out to several sinks
// ---------------------------------------------------------------------------

/// Feeds every consumed event to each wrapped sink, in order.
pub struct MultiSink {
    sinks: Vec<Box<dyn StreamSink>>,
}

#[async_trait]
impl StreamSink for MultiSink {
    async fn consume(&mut self, event: StreamEvent) {
        let Some((last, head)) = self.sinks.split_last_mut() else {
            return;
        };
        for sink in head {
            sink.consume(event.clone()).await;
        }
        last.consume(event).await;
    }
}

/// Combines several factories into one.
pub struct MultiFactory {
    factories: Vec<Arc<dyn SinkFactory>>,
}

impl MultiFactory {
    pub fn new(factories: Vec<Arc<dyn SinkFactory>>) -> Self {
        MultiFactory { factories }
    }
}

#[async_trait]
impl SinkFactory for MultiFactory {
    async fn make_stream(&self) -> Box<dyn StreamSink> {
        let mut sinks = Vec::with_capacity(self.factories.len());
        for f in &self.factories {
            sinks.push(f.make_stream().await);
        }
        Box::new(MultiSink { sinks })
    }

    async fn update(&self) {
        for f in &self.factories {
            f.update().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Severity filtering
// ---------------------------------------------------------------------------

/// Drops `Message` events below a severity floor; every other event
/// kind passes through.
pub struct SeverityFilter {
    min: Severity,
    inner: Box<dyn StreamSink>,
}

#[async_trait]
impl StreamSink for SeverityFilter {
    async fn consume(&mut self, event: StreamEvent) {
        if let StreamEvent::Message(ref m) = event {
            if m.severity < self.min {
                return;
            }
        }
        self.inner.consume(event).await;
    }
}

/// Wraps a factory so every produced sink filters by severity.
pub struct FilterFactory {
    min: Severity,
    inner: Arc<dyn SinkFactory>,
}

impl FilterFactory {
    pub fn new(min: Severity, inner: Arc<dyn SinkFactory>) -> Self {
        FilterFactory { min, inner }
    }
}

#[async_trait]
impl SinkFactory for FilterFactory {
    async fn make_stream(&self) -> Box<dyn StreamSink> {
        Box::new(SeverityFilter {
            min: self.min,
            inner: self.inner.make_stream().await,
        })
    }

    async fn update(&self) {
        self.inner.update().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logtree_core::{FinishInfo, MessageInfo};
    use std::sync::Mutex;

    struct Captured(Arc<Mutex<Vec<StreamEvent>>>);

    #[async_trait]
    impl StreamSink for Captured {
        async fn consume(&mut self, event: StreamEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn message(severity: Severity) -> StreamEvent {
        StreamEvent::Message(MessageInfo {
            severity,
            ..MessageInfo::default()
        })
    }

    #[tokio::test]
    async fn severity_filter_drops_quiet_messages_only() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut filter = SeverityFilter {
            min: Severity::Warning,
            inner: Box::new(Captured(seen.clone())),
        };
        filter.consume(message(Severity::Debug)).await;
        filter.consume(message(Severity::Error)).await;
        filter
            .consume(StreamEvent::Finish(FinishInfo::default()))
            .await;
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0], StreamEvent::Message(_)));
        assert!(matches!(seen[1], StreamEvent::Finish(_)));
    }

    #[tokio::test]
    async fn multi_sink_fans_out_in_order() {
        let a = Arc::new(Mutex::new(Vec::new()));
        let b = Arc::new(Mutex::new(Vec::new()));
        let mut multi = MultiSink {
            sinks: vec![
                Box::new(Captured(a.clone())),
                Box::new(Captured(b.clone())),
            ],
        };
        multi.consume(message(Severity::Info)).await;
        multi
            .consume(StreamEvent::Finish(FinishInfo::default()))
            .await;
        assert_eq!(a.lock().unwrap().len(), 2);
        assert_eq!(b.lock().unwrap().len(), 2);
    }
}
