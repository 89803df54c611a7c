//! Bounded-memory aggregation of profiling interval samples.
//!
//! Producers can emit an interval sample per measured code section hit,
//! which is far too chatty to persist row-per-sample. The aggregator
//! collapses every `batch_size` samples of one `(tag, instance)` key
//! into a single summary. Keys keep their map slot across batches; a
//! reset only zeroes the slot.

use crate::event::IntervalInfo;
use crate::ident::Ident;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Aggregation key: packed tag identifier plus instance id.
pub type IntervalKey = (u64, u64);

// ---------------------------------------------------------------------------
// Aggregate summary
// ---------------------------------------------------------------------------

/// Summary of one batch of interval samples with the same key.
///
/// Only [`IntervalAggregator`] constructs values of this type.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateIntervalInfo {
    tag: Ident,
    instance: u64,
    hit_count: u64,
    hit_interval: Duration,
    min_duration: Duration,
    avg_duration: Duration,
    max_duration: Duration,
}

impl AggregateIntervalInfo {
    pub fn tag(&self) -> Ident {
        self.tag
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn key(&self) -> IntervalKey {
        (self.tag.value(), self.instance)
    }

    /// Number of samples in the batch.
    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    /// Wall-clock span between the first and last sample of the batch.
    pub fn hit_interval(&self) -> Duration {
        self.hit_interval
    }

    pub fn min_duration(&self) -> Duration {
        self.min_duration
    }

    pub fn avg_duration(&self) -> Duration {
        self.avg_duration
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Slot {
    first_at: Option<Instant>,
    sum: Duration,
    min: Duration,
    max: Duration,
    count: u64,
}

impl Slot {
    fn update(&mut self, duration: Duration) {
        if self.count == 0 {
            self.first_at = Some(Instant::now());
            self.min = duration;
            self.max = duration;
        } else {
            self.min = self.min.min(duration);
            self.max = self.max.max(duration);
        }
        self.sum += duration;
        self.count += 1;
    }

    fn reset(&mut self) {
        self.first_at = None;
        self.sum = Duration::ZERO;
        self.min = Duration::ZERO;
        self.max = Duration::ZERO;
        self.count = 0;
    }
}

/// Online accumulator keyed by `(tag, instance)`.
#[derive(Debug)]
pub struct IntervalAggregator {
    slots: HashMap<IntervalKey, Slot>,
    batch_size: u64,
    default_hit_interval: Duration,
}

impl IntervalAggregator {
    /// `batch_size` samples produce one aggregate; `default_hit_interval`
    /// is reported for single-sample batches, where the observed span
    /// carries no information.
    pub fn new(batch_size: u64, default_hit_interval: Duration) -> Self {
        IntervalAggregator {
            slots: HashMap::new(),
            batch_size: batch_size.max(1),
            default_hit_interval,
        }
    }

    /// Accumulate one sample; returns the batch summary when the slot
    /// has reached the batch size. The caller consumes the aggregate and
    /// then calls [`IntervalAggregator::reset`] with its key.
    pub fn update(&mut self, info: &IntervalInfo) -> Option<AggregateIntervalInfo> {
        let key = (info.tag.value(), info.instance);
        let slot = self.slots.entry(key).or_default();
        slot.update(info.duration);
        if slot.count < self.batch_size {
            return None;
        }
        let hit_interval = if slot.count == 1 {
            self.default_hit_interval
        } else {
            slot.first_at.map_or(Duration::ZERO, |t| t.elapsed())
        };
        Some(AggregateIntervalInfo {
            tag: info.tag,
            instance: info.instance,
            hit_count: slot.count,
            hit_interval,
            min_duration: slot.min,
            avg_duration: slot.sum / u32::try_from(slot.count).unwrap_or(u32::MAX),
            max_duration: slot.max,
        })
    }

    /// Zero the slot whose aggregate has been consumed. The key keeps
    /// its map slot, so steady-state aggregation does not reallocate.
    pub fn reset(&mut self, key: IntervalKey) {
        if let Some(slot) = self.slots.get_mut(&key) {
            slot.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(tag: &str, instance: u64, millis: u64) -> IntervalInfo {
        IntervalInfo {
            offset: Duration::ZERO,
            tag: Ident::new(tag),
            instance,
            duration: Duration::from_millis(millis),
        }
    }

    #[test]
    fn emits_every_batch_size_samples() {
        let mut agg = IntervalAggregator::new(3, Duration::from_secs(120));
        let mut emitted = 0;
        for i in 0..10 {
            if let Some(a) = agg.update(&sample("work", 1, 10 + i)) {
                emitted += 1;
                agg.reset(a.key());
            }
        }
        // floor(10 / 3)
        assert_eq!(emitted, 3);
    }

    #[test]
    fn batch_statistics_are_per_batch() {
        let mut agg = IntervalAggregator::new(2, Duration::from_secs(120));
        assert!(agg.update(&sample("work", 1, 10)).is_none());
        let first = agg.update(&sample("work", 1, 20)).unwrap();
        assert_eq!(first.min_duration(), Duration::from_millis(10));
        assert_eq!(first.avg_duration(), Duration::from_millis(15));
        assert_eq!(first.max_duration(), Duration::from_millis(20));
        assert_eq!(first.hit_count(), 2);
        agg.reset(first.key());

        // The second batch must not inherit min/max from the first.
        assert!(agg.update(&sample("work", 1, 40)).is_none());
        let second = agg.update(&sample("work", 1, 30)).unwrap();
        assert_eq!(second.min_duration(), Duration::from_millis(30));
        assert_eq!(second.avg_duration(), Duration::from_millis(35));
        assert_eq!(second.max_duration(), Duration::from_millis(40));
    }

    #[test]
    fn keys_are_independent() {
        let mut agg = IntervalAggregator::new(2, Duration::from_secs(120));
        assert!(agg.update(&sample("work", 1, 10)).is_none());
        assert!(agg.update(&sample("work", 2, 10)).is_none());
        assert!(agg.update(&sample("idle", 1, 10)).is_none());
        assert!(agg.update(&sample("work", 1, 10)).is_some());
    }

    #[test]
    fn single_sample_batch_reports_default_hit_interval() {
        let mut agg = IntervalAggregator::new(1, Duration::from_secs(120));
        let a = agg.update(&sample("work", 1, 5)).unwrap();
        assert_eq!(a.hit_interval(), Duration::from_secs(120));
        assert_eq!(a.hit_count(), 1);
        assert_eq!(a.avg_duration(), Duration::from_millis(5));
    }

    #[test]
    fn reset_retains_key() {
        let mut agg = IntervalAggregator::new(2, Duration::from_secs(120));
        agg.update(&sample("work", 1, 10));
        let a = agg.update(&sample("work", 1, 20)).unwrap();
        agg.reset(a.key());
        assert_eq!(agg.slots.len(), 1);
        assert_eq!(agg.slots[&a.key()].count, 0);
    }
}
