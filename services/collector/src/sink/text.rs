//! Plain line-per-event output sink.

use super::SinkFactory;
use crate::fmt::{format_message, format_reltime};
use async_trait::async_trait;
use logtree_core::{Ident, IntervalAggregator, StreamEvent, StreamSink};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

fn lock(out: &SharedWriter) -> MutexGuard<'_, Box<dyn Write + Send>> {
    match out.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Writes one human-readable line per event to a shared writer.
pub struct TextSink {
    id: u64,
    out: SharedWriter,
    root: Option<Ident>,
    begun: bool,
    intervals: IntervalAggregator,
}

impl TextSink {
    fn line(&self, text: &str) {
        let mut out = lock(&self.out);
        let _ = writeln!(out, "stream {} {}", self.id, text);
    }

    fn ensure_begun(&mut self) {
        if !self.begun {
            self.begun = true;
            self.line("begin");
        }
    }
}

#[async_trait]
impl StreamSink for TextSink {
    async fn consume(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Begin(info) => {
                if !self.begun {
                    self.begun = true;
                    self.line(&format!(
                        "begin session={:?} identity={:?}",
                        info.session, info.identity
                    ));
                }
            }
            StreamEvent::Message(m) => {
                self.ensure_begun();
                if self.root.is_none() {
                    self.root = Some(m.source);
                }
                let tag = if m.tag.is_empty() {
                    String::new()
                } else {
                    format!(".{}", m.tag)
                };
                self.line(&format!(
                    "+{} {} {}{}#{}: {}",
                    format_reltime(m.offset),
                    m.severity,
                    m.source,
                    tag,
                    m.instance,
                    format_message(&m)
                ));
            }
            StreamEvent::Interval(i) => {
                if let Some(agg) = self.intervals.update(&i) {
                    self.intervals.reset(agg.key());
                    self.ensure_begun();
                    self.line(&format!(
                        "interval {}#{} x{}: min {} avg {} max {}",
                        agg.tag(),
                        agg.instance(),
                        agg.hit_count(),
                        format_reltime(agg.min_duration()),
                        format_reltime(agg.avg_duration()),
                        format_reltime(agg.max_duration())
                    ));
                }
            }
            StreamEvent::Heartbeat(hb) => {
                self.ensure_begun();
                self.line(&format!("+{} heartbeat", format_reltime(hb.offset)));
            }
            StreamEvent::DeclareState(ds) => {
                self.ensure_begun();
                self.line(&format!(
                    "declare state {}/{} [{} .. {}]",
                    ds.source, ds.state_tag, ds.begin_tag, ds.end_tag
                ));
            }
            StreamEvent::ActiveState(a) => {
                self.ensure_begun();
                self.line(&format!("state active {}/{}", a.source, a.tag));
            }
            StreamEvent::Description(d) => {
                self.ensure_begun();
                self.line(&format!(
                    "description {}#{}: {} - {}",
                    d.source, d.instance, d.display_name, d.description
                ));
            }
            StreamEvent::Finish(f) => {
                if self.begun {
                    let outcome = if f.clean { "clean" } else { "unclean" };
                    let root = self.root.unwrap_or_default();
                    self.line(&format!(
                        "+{} {} finish ({outcome})",
                        format_reltime(f.offset),
                        root
                    ));
                    self.begun = false;
                }
            }
            StreamEvent::AggregateInterval(_) => {}
        }
    }
}

/// Factory sharing one output writer between all streams.
pub struct TextSinkFactory {
    out: SharedWriter,
    id_seq: AtomicU64,
    batch_size: u64,
    default_hit_interval: Duration,
}

impl TextSinkFactory {
    pub fn new(out: Box<dyn Write + Send>, batch_size: u64, default_hit_interval: Duration) -> Self {
        TextSinkFactory {
            out: Arc::new(Mutex::new(out)),
            id_seq: AtomicU64::new(0),
            batch_size,
            default_hit_interval,
        }
    }

    pub fn stdout(batch_size: u64, default_hit_interval: Duration) -> Self {
        TextSinkFactory::new(Box::new(std::io::stdout()), batch_size, default_hit_interval)
    }
}

#[async_trait]
impl SinkFactory for TextSinkFactory {
    async fn make_stream(&self) -> Box<dyn StreamSink> {
        Box::new(TextSink {
            id: self.id_seq.fetch_add(1, Ordering::Relaxed) + 1,
            out: self.out.clone(),
            root: None,
            begun: false,
            intervals: IntervalAggregator::new(self.batch_size, self.default_hit_interval),
        })
    }

    async fn update(&self) {
        let _ = lock(&self.out).flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logtree_core::{BeginInfo, FinishInfo, MessageInfo, Severity};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[tokio::test]
    async fn renders_session_lines() {
        let buf = SharedBuf::default();
        let factory =
            TextSinkFactory::new(Box::new(buf.clone()), 10, Duration::from_secs(120));
        let mut sink = factory.make_stream().await;
        sink.consume(StreamEvent::Begin(BeginInfo {
            session: "s1".into(),
            ..BeginInfo::default()
        }))
        .await;
        sink.consume(StreamEvent::Message(MessageInfo {
            severity: Severity::Info,
            source: Ident::new("App"),
            format: "hi".into(),
            offset: Duration::from_millis(10),
            ..MessageInfo::default()
        }))
        .await;
        sink.consume(StreamEvent::Finish(FinishInfo {
            offset: Duration::from_millis(20),
            clean: true,
        }))
        .await;
        let text = buf.contents();
        assert!(text.contains("stream 1 begin session=\"s1\""));
        assert!(text.contains("info App#0: hi"));
        assert!(text.contains("finish (clean)"));
    }

    #[tokio::test]
    async fn missing_begin_is_implicit() {
        let buf = SharedBuf::default();
        let factory =
            TextSinkFactory::new(Box::new(buf.clone()), 10, Duration::from_secs(120));
        let mut sink = factory.make_stream().await;
        sink.consume(StreamEvent::Message(MessageInfo::default())).await;
        let text = buf.contents();
        assert!(text.starts_with("stream 1 begin\n"));
    }
}
