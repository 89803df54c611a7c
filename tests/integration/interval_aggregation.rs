//! Interval aggregation cardinality through the full pipeline.

use collector::backoff::Backoff;
use collector::sink::pg::{PgSinkFactory, PgSinkHandle};
use logtree_parser::JsonParser;
use lt_test_utils::ScriptDb;
use std::time::Duration;

fn handle(batch_size: u64) -> PgSinkHandle<ScriptDb> {
    let factory = PgSinkFactory::new(
        ScriptDb::up(),
        Backoff::new(Duration::ZERO, Duration::from_secs(60)),
    );
    PgSinkHandle::new(factory, batch_size, Duration::from_secs(120))
}

fn interval_record(ts: f64, tag: &str, iid: u64, millis: u64) -> String {
    format!(
        r#"{{"_":{{"t":"i","ts":{ts},"tag":"{tag}","iid":{iid},"tns":{}}}}}"#,
        millis * 1_000_000
    )
}

#[tokio::test]
async fn five_samples_batch_of_two_yield_two_aggregates() {
    let handle = handle(2);
    let sink = handle.make_typed_stream();
    let mut parser = JsonParser::new(sink);

    let mut input = String::from(r#"{"_":{"t":"begin"}}"#);
    for (i, ms) in [10u64, 20, 30, 40, 50].iter().enumerate() {
        input.push_str(&interval_record(0.1 * (i as f64 + 1.0), "work", 1, *ms));
    }
    input.push_str(r#"{"_":{"t":"end","ts":1,"clean":true}}"#);
    parser.feed(input.as_bytes()).await;
    parser.finish().await;

    let factory_handle = handle.factory();
    let mut factory = factory_handle.lock().await;
    let store = factory.store_mut();
    let profiles: Vec<_> = store
        .calls
        .iter()
        .filter(|c| c.op() == "add_profile_interval")
        .collect();
    // floor(5 / 2) aggregates; the fifth sample is retained, not flushed.
    assert_eq!(profiles.len(), 2);

    // params: stream, tag, instance, hit_count, hit_interval, min, avg, max
    assert_eq!(profiles[0].params[1], "work");
    assert_eq!(profiles[0].params[2], "1");
    assert_eq!(profiles[0].params[3], "2");
    assert_eq!(profiles[0].params[5], "10");
    assert_eq!(profiles[0].params[6], "15");
    assert_eq!(profiles[0].params[7], "20");

    assert_eq!(profiles[1].params[5], "30");
    assert_eq!(profiles[1].params[6], "35");
    assert_eq!(profiles[1].params[7], "40");

    // Raw samples never become DB statements of their own.
    assert!(!store.calls.iter().any(|c| c.sql.contains("interval_info")));
}

#[tokio::test]
async fn distinct_keys_aggregate_independently() {
    let handle = handle(2);
    let sink = handle.make_typed_stream();
    let mut parser = JsonParser::new(sink);

    let mut input = String::from(r#"{"_":{"t":"begin"}}"#);
    input.push_str(&interval_record(0.1, "work", 1, 10));
    input.push_str(&interval_record(0.2, "work", 2, 100));
    input.push_str(&interval_record(0.3, "idle", 1, 200));
    input.push_str(&interval_record(0.4, "work", 1, 20));
    input.push_str(r#"{"_":{"t":"end","ts":1,"clean":true}}"#);
    parser.feed(input.as_bytes()).await;
    parser.finish().await;

    let factory_handle = handle.factory();
    let mut factory = factory_handle.lock().await;
    let profiles: Vec<_> = factory
        .store_mut()
        .calls
        .iter()
        .filter(|c| c.op() == "add_profile_interval")
        .cloned()
        .collect();
    // Only (work, 1) completed a batch.
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].params[1], "work");
    assert_eq!(profiles[0].params[2], "1");
    assert_eq!(profiles[0].params[5], "10");
    assert_eq!(profiles[0].params[7], "20");
}

#[tokio::test]
async fn aggregate_count_is_floor_of_samples_over_batch() {
    for (samples, batch, expected) in [(10u64, 3u64, 3usize), (9, 3, 3), (2, 3, 0), (1, 1, 1)] {
        let handle = handle(batch);
        let sink = handle.make_typed_stream();
        let mut parser = JsonParser::new(sink);
        let mut input = String::from(r#"{"_":{"t":"begin"}}"#);
        for i in 0..samples {
            input.push_str(&interval_record(i as f64, "work", 1, 10 + i));
        }
        input.push_str(r#"{"_":{"t":"end","ts":99,"clean":true}}"#);
        parser.feed(input.as_bytes()).await;
        parser.finish().await;

        let factory_handle = handle.factory();
        let mut factory = factory_handle.lock().await;
        let count = factory
            .store_mut()
            .calls
            .iter()
            .filter(|c| c.op() == "add_profile_interval")
            .count();
        assert_eq!(count, expected, "samples={samples} batch={batch}");
    }
}
