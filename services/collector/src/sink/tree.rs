//! Terminal tree renderer.
//!
//! Interleaves the streams of every connected producer into one
//! vertical tree diagram. Each active stream owns a lane; events are
//! drawn as boxed blocks branching off their stream's lane, with
//! relative-time, severity, root/source/tag and instance columns.

use super::SinkFactory;
use crate::fmt::{format_arg, format_message, format_reltime, padded_to};
use async_trait::async_trait;
use logtree_core::{
    BeginInfo, Ident, IntervalAggregator, MessageInfo, StreamEvent, StreamSink,
};
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Shared output
// ---------------------------------------------------------------------------

/// The tree canvas shared by all streams of one factory.
pub struct TreeOutput {
    out: Box<dyn Write + Send>,
    lanes: BTreeSet<u64>,
    id_seq: u64,
}

impl TreeOutput {
    fn new(mut out: Box<dyn Write + Send>) -> Self {
        let _ = out.write_all("╮\n".as_bytes());
        TreeOutput {
            out,
            lanes: BTreeSet::new(),
            id_seq: 0,
        }
    }

    fn next_stream_id(&mut self) -> u64 {
        self.id_seq += 1;
        self.id_seq
    }

    fn w(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
    }

    fn flush(&mut self) {
        let _ = self.out.flush();
    }

    fn lane_ids(&self) -> Vec<u64> {
        self.lanes.iter().copied().collect()
    }

    // -----------------------------------------------------------------------
    // Lane connectors
    // -----------------------------------------------------------------------

    /// Pass-through row: every lane continues downward.
    fn conn_i(&mut self) {
        self.w("┊");
        for _ in 0..self.lanes.len() {
            self.w(" │");
        }
    }

    /// Stream-opening row crossing all existing lanes.
    fn conn_t(&mut self) {
        self.w("┝");
        for _ in 0..self.lanes.len() {
            self.w("━━");
        }
        self.w("━┯━┥");
    }

    /// Branch row: the target lane forks right into a block.
    fn conn_z(&mut self, id: u64) {
        self.w("┊");
        let mut before = true;
        for lane in self.lane_ids() {
            if lane == id {
                self.w(" ┝");
                before = false;
            } else if before {
                self.w(" │");
            } else {
                self.w("━━");
            }
        }
    }

    /// Closing row: the target lane ends into the closing block.
    fn conn_l(&mut self, id: u64) {
        self.w("┊");
        let mut before = true;
        for lane in self.lane_ids() {
            if lane == id {
                self.w(" ┕");
                before = false;
            } else if before {
                self.w(" │");
            } else {
                self.w("━━");
            }
        }
        self.w("━┥");
    }

    /// First shift row after a stream closed: later lanes move left.
    fn conn_shift(&mut self, id: u64) {
        self.w("┊");
        let mut before = true;
        for lane in self.lane_ids() {
            if lane == id {
                self.w("  ");
                before = false;
            } else if before {
                self.w(" │");
            } else {
                self.w("╭╯");
            }
        }
    }

    /// Second shift row, one cell narrower.
    fn conn_shift_tail(&mut self, id: u64) {
        self.w("┊");
        let mut before = true;
        for lane in self.lane_ids() {
            if lane == id {
                self.w(" ");
                before = false;
            } else if before {
                self.w(" │");
            } else {
                self.w("╭╯");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------------

    fn begin_stream(&mut self, id: u64, _info: &BeginInfo) {
        self.conn_i();
        self.w("   ╭────────────╮\n");
        self.conn_t();
        self.w("starting log│\n");
        self.conn_i();
        self.w(" │ ╰────────────╯\n");
        self.lanes.insert(id);
    }

    fn message(
        &mut self,
        id: u64,
        root: Ident,
        since_start: Duration,
        since_prev: Duration,
        info: &MessageInfo,
    ) {
        let tagged = !info.tag.is_empty();
        self.conn_i();
        if tagged {
            self.w(" ╭──────────┬──────────┬─────────┬──────────┬──────────┬──────────┬────────────╮\n");
        } else {
            self.w(" ╭──────────┬──────────┬─────────┬──────────┬──────────┬────────────╮\n");
        }
        self.conn_z(id);
        self.w("━┥");
        self.w(&padded_to(10, &format_reltime(since_start)));
        self.w("│");
        self.w(&padded_to(10, &format_reltime(since_prev)));
        self.w("│");
        self.w(&padded_to(9, info.severity.name()));
        self.w("│");
        self.w(&padded_to(10, &root.name()));
        self.w("│");
        self.w(&padded_to(10, &info.source.name()));
        self.w("│");
        if tagged {
            self.w(&padded_to(10, &info.tag.name()));
            self.w("│");
        }
        self.w(&padded_to(12, &info.instance.to_string()));
        self.w("│\n");
        self.conn_i();
        if tagged {
            self.w(" ╰┬─────────┴──────────┴─────────┴──────────┴──────────┴──────────┴────────────╯\n");
        } else {
            self.w(" ╰┬─────────┴──────────┴─────────┴──────────┴──────────┴────────────╯\n");
        }

        self.conn_i();
        self.w("  ╰");
        if info.args.is_empty() {
            self.w("╼ ");
        } else {
            self.w("─┐");
        }
        self.w(&format_message(info));
        self.w("\n");

        let count = info.args.len();
        for (i, arg) in info.args.iter().enumerate() {
            self.conn_i();
            self.w("    ");
            self.w(if i + 1 == count { "╰" } else { "├" });
            self.w("─╼ ");
            self.w(&arg.name.name());
            self.w(": ");
            self.w(&format_arg(arg));
            self.w("\n");
        }
    }

    fn aggregate(
        &mut self,
        id: u64,
        root: Ident,
        tag: Ident,
        instance: u64,
        min: Duration,
        avg: Duration,
        max: Duration,
    ) {
        self.conn_i();
        self.w(" ╭──────────┬──────────┬────────────╮\n");
        self.conn_z(id);
        self.w("━┥");
        self.w(&padded_to(10, &root.name()));
        self.w("│");
        self.w(&padded_to(10, &tag.name()));
        self.w("│");
        self.w(&padded_to(12, &instance.to_string()));
        self.w("│\n");
        self.conn_i();
        self.w(" ╰┬─────────┴──────────┴────────────╯\n");
        self.conn_i();
        self.w("  ├─╼ min: ");
        self.w(&format_reltime(min));
        self.w("\n");
        self.conn_i();
        self.w("  ├─╼ avg: ");
        self.w(&format_reltime(avg));
        self.w("\n");
        self.conn_i();
        self.w("  ╰─╼ max: ");
        self.w(&format_reltime(max));
        self.w("\n");
    }

    fn heartbeat(&mut self, id: u64, since_start: Duration, since_prev: Duration) {
        self.conn_i();
        self.w(" ╭──────────┬──────────┬──────────╮\n");
        self.conn_z(id);
        self.w("━┥");
        self.w(&padded_to(10, &format_reltime(since_start)));
        self.w("│");
        self.w(&padded_to(10, &format_reltime(since_prev)));
        self.w("│heart-beat│\n");
        self.conn_i();
        self.w(" ╰──────────┴──────────┴──────────╯\n");
    }

    fn finish_stream(
        &mut self,
        id: u64,
        root: Ident,
        since_start: Duration,
        since_prev: Duration,
        clean: bool,
    ) {
        self.conn_i();
        self.w(" ╭──────────┬──────────┬──────────┬───────────┬─────────╮\n");
        self.conn_l(id);
        self.w(&padded_to(10, &format_reltime(since_start)));
        self.w("│");
        self.w(&padded_to(10, &format_reltime(since_prev)));
        self.w("│");
        self.w(&padded_to(10, &root.name()));
        self.w("│closing log│");
        self.w(if clean { " success " } else { " failed  " });
        self.w("│\n");
        self.conn_shift(id);
        self.w(" ╰──────────┴──────────┴──────────┴───────────┴─────────╯\n");
        self.conn_shift_tail(id);
        self.w("\n");
        self.flush();
        self.lanes.remove(&id);
    }
}

fn lock(output: &Arc<Mutex<TreeOutput>>) -> MutexGuard<'_, TreeOutput> {
    match output.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ---------------------------------------------------------------------------
// Per-stream sink
// ---------------------------------------------------------------------------

pub struct TreeSink {
    id: u64,
    output: Arc<Mutex<TreeOutput>>,
    root: Option<Ident>,
    begun: bool,
    prev_offset: Duration,
    intervals: IntervalAggregator,
}

impl TreeSink {
    fn ensure_begun(&mut self) {
        if !self.begun {
            self.begun = true;
            lock(&self.output).begin_stream(self.id, &BeginInfo::default());
        }
    }
}

#[async_trait]
impl StreamSink for TreeSink {
    async fn consume(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Begin(info) => {
                if !self.begun {
                    self.begun = true;
                    lock(&self.output).begin_stream(self.id, &info);
                }
            }
            StreamEvent::Message(m) => {
                self.ensure_begun();
                if self.root.is_none() {
                    self.root = Some(m.source);
                }
                let since_prev = m.offset.saturating_sub(self.prev_offset);
                lock(&self.output).message(
                    self.id,
                    self.root.unwrap_or_default(),
                    m.offset,
                    since_prev,
                    &m,
                );
                self.prev_offset = m.offset;
            }
            StreamEvent::Interval(i) => {
                if let Some(agg) = self.intervals.update(&i) {
                    self.intervals.reset(agg.key());
                    self.ensure_begun();
                    lock(&self.output).aggregate(
                        self.id,
                        self.root.unwrap_or_default(),
                        agg.tag(),
                        agg.instance(),
                        agg.min_duration(),
                        agg.avg_duration(),
                        agg.max_duration(),
                    );
                }
            }
            StreamEvent::Heartbeat(hb) => {
                self.ensure_begun();
                let since_prev = hb.offset.saturating_sub(self.prev_offset);
                lock(&self.output).heartbeat(self.id, hb.offset, since_prev);
                self.prev_offset = hb.offset;
            }
            StreamEvent::Finish(f) => {
                if self.begun {
                    let since_prev = f.offset.saturating_sub(self.prev_offset);
                    lock(&self.output).finish_stream(
                        self.id,
                        self.root.unwrap_or_default(),
                        f.offset,
                        since_prev,
                        f.clean,
                    );
                    self.begun = false;
                }
            }
            // Not rendered in the tree view.
            StreamEvent::Description(_)
            | StreamEvent::DeclareState(_)
            | StreamEvent::ActiveState(_)
            | StreamEvent::AggregateInterval(_) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

pub struct TreeSinkFactory {
    output: Arc<Mutex<TreeOutput>>,
    batch_size: u64,
    default_hit_interval: Duration,
}

impl TreeSinkFactory {
    pub fn new(out: Box<dyn Write + Send>, batch_size: u64, default_hit_interval: Duration) -> Self {
        TreeSinkFactory {
            output: Arc::new(Mutex::new(TreeOutput::new(out))),
            batch_size,
            default_hit_interval,
        }
    }

    pub fn stdout(batch_size: u64, default_hit_interval: Duration) -> Self {
        TreeSinkFactory::new(Box::new(std::io::stdout()), batch_size, default_hit_interval)
    }
}

#[async_trait]
impl SinkFactory for TreeSinkFactory {
    async fn make_stream(&self) -> Box<dyn StreamSink> {
        let id = lock(&self.output).next_stream_id();
        Box::new(TreeSink {
            id,
            output: self.output.clone(),
            root: None,
            begun: false,
            prev_offset: Duration::ZERO,
            intervals: IntervalAggregator::new(self.batch_size, self.default_hit_interval),
        })
    }

    async fn update(&self) {
        lock(&self.output).flush();
    }
}
