//! End-to-end: JSON byte stream -> parser -> SQL sink call sequence.
//!
//! Drives the real parser into a real `PgStreamSink` whose store is the
//! scripted double, then asserts the exact `eagilog.*` procedure
//! sequence and parameters.

use collector::backoff::Backoff;
use collector::sink::pg::{PgSinkFactory, PgSinkHandle};
use lt_test_utils::{Call, ScriptDb};
use logtree_parser::JsonParser;
use std::time::Duration;

fn handle(db: ScriptDb, batch_size: u64) -> PgSinkHandle<ScriptDb> {
    let factory = PgSinkFactory::new(db, Backoff::new(Duration::ZERO, Duration::from_secs(60)));
    PgSinkHandle::new(factory, batch_size, Duration::from_secs(120))
}

async fn run_input(handle: &PgSinkHandle<ScriptDb>, input: &str) {
    let sink = handle.make_typed_stream();
    let mut parser = JsonParser::new(sink);
    parser.feed(input.as_bytes()).await;
    parser.finish().await;
}

async fn calls(handle: &PgSinkHandle<ScriptDb>) -> Vec<Call> {
    handle.factory().lock().await.store_mut().calls.clone()
}

#[tokio::test]
async fn single_well_formed_message() {
    let handle = handle(ScriptDb::up(), 1000);
    run_input(
        &handle,
        concat!(
            r#"{"_":{"t":"begin"}}"#,
            r#"{"_":{"t":"m","lvl":"info","src":"App","tag":"hello","iid":7,"ts":0.0,"f":"hi","a":[{"n":"who","t":"str","v":"me"}]}}"#,
            r#"{"_":{"t":"end","ts":0.1,"clean":true}}"#,
        ),
    )
    .await;

    let calls = calls(&handle).await;
    let ops: Vec<&str> = calls.iter().map(Call::op).collect();
    assert_eq!(
        ops,
        vec![
            "start_stream",
            "add_entry",
            "add_entry_arg_string",
            "set_stream_application_id",
            "finish_stream",
        ]
    );
    assert_eq!(
        calls[1].params,
        vec!["1", "App", "7", "info", "hello", "hi", "0"]
    );
    assert_eq!(calls[2].params, vec!["2", "who", "str", "me"]);
    assert_eq!(calls[3].params, vec!["1", "App"]);
    assert_eq!(calls[4].params, vec!["1", "TRUE"]);
}

#[tokio::test]
async fn object_lifetime_message() {
    let handle = handle(ScriptDb::up(), 1000);
    run_input(
        &handle,
        concat!(
            r#"{"_":{"t":"begin"}}"#,
            r#"{"_":{"t":"m","lvl":"info","src":"Child","tag":"objCreate","iid":100,"ts":0.25,"f":"created","a":["#,
            r#"{"n":"sourceId","t":"str","v":"Parent"},"#,
            r#"{"n":"sourceInst","t":"uint","v":99}"#,
            r#"]}}"#,
            r#"{"_":{"t":"end","ts":1,"clean":true}}"#,
        ),
    )
    .await;

    let calls = calls(&handle).await;
    let entry_pos = calls.iter().position(|c| c.op() == "add_entry").unwrap();
    let create_pos = calls
        .iter()
        .position(|c| c.op() == "create_object")
        .unwrap();
    assert!(entry_pos < create_pos);
    assert_eq!(
        calls[create_pos].params,
        vec!["1", "Child", "100", "Parent", "99", "0.25", "FALSE"]
    );
}

#[tokio::test]
async fn special_argument_sets_stream_metadata() {
    let long_hostname = "a-very-long-hostname-exceeding-the-column-limit-".to_owned()
        + &"x".repeat(40);
    let handle = handle(ScriptDb::up(), 1000);
    run_input(
        &handle,
        &format!(
            concat!(
                r#"{{"_":{{"t":"begin"}}}}"#,
                r#"{{"_":{{"t":"m","lvl":"info","src":"App","tag":"Instance","iid":1,"ts":0.0,"f":"sys","a":[{{"n":"hostname","t":"str","v":"{}"}}]}}}}"#,
                r#"{{"_":{{"t":"end","ts":1,"clean":true}}}}"#,
            ),
            long_hostname
        ),
    )
    .await;

    let calls = calls(&handle).await;
    let full = calls
        .iter()
        .find(|c| c.op() == "add_entry_arg_string")
        .unwrap();
    assert_eq!(full.params[3], long_hostname);
    let truncated = calls
        .iter()
        .find(|c| c.op() == "set_stream_hostname")
        .unwrap();
    assert_eq!(truncated.params[1], long_hostname[..64]);
}

#[tokio::test]
async fn declare_and_activate_state() {
    let handle = handle(ScriptDb::up(), 1000);
    run_input(
        &handle,
        concat!(
            r#"{"_":{"t":"begin"}}"#,
            r#"{"_":{"t":"ds","ts":0.5,"src":"App","iid":1,"tag":"busy","bgn":"busyStart","end":"busyEnd"}}"#,
            r#"{"_":{"t":"as","ts":0.6,"src":"App","tag":"busy"}}"#,
            r#"{"_":{"t":"end","ts":1,"clean":true}}"#,
        ),
    )
    .await;

    let calls = calls(&handle).await;
    let declare = calls
        .iter()
        .find(|c| c.op() == "declare_stream_state")
        .unwrap();
    assert_eq!(
        declare.params,
        vec!["1", "App", "busy", "busyStart", "busyEnd"]
    );
    let activate = calls
        .iter()
        .find(|c| c.op() == "make_stream_state_active")
        .unwrap();
    assert_eq!(activate.params, vec!["1", "App", "busy"]);
}

#[tokio::test]
async fn heartbeat_round_trip() {
    let handle = handle(ScriptDb::up(), 1000);
    run_input(
        &handle,
        concat!(
            r#"{"_":{"t":"begin"}}"#,
            r#"{"_":{"t":"hb","ts":2.5}}"#,
            r#"{"_":{"t":"end","ts":3,"clean":true}}"#,
        ),
    )
    .await;

    let calls = calls(&handle).await;
    let hb = calls
        .iter()
        .find(|c| c.op() == "stream_heartbeat")
        .unwrap();
    assert_eq!(hb.params, vec!["1", "2.5"]);
}

#[tokio::test]
async fn missing_end_record_finishes_unclean() {
    let handle = handle(ScriptDb::up(), 1000);
    run_input(
        &handle,
        r#"{"_":{"t":"begin"}}{"_":{"t":"m","lvl":"info","src":"App","ts":1.5,"f":"x"}}"#,
    )
    .await;

    let calls = calls(&handle).await;
    let finish = calls.iter().find(|c| c.op() == "finish_stream").unwrap();
    assert_eq!(finish.params, vec!["1", "FALSE"]);
}
