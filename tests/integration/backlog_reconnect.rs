//! Backlog FIFO replay across a database outage (and backoff growth).

use collector::backoff::Backoff;
use collector::sink::SinkFactory;
use collector::sink::pg::{PgSinkFactory, PgSinkHandle};
use logtree_core::StreamSink;
use logtree_core::{MessageInfo, StreamEvent};
use logtree_parser::JsonParser;
use lt_test_utils::ScriptDb;
use std::time::Duration;

fn handle(db: ScriptDb) -> PgSinkHandle<ScriptDb> {
    let factory = PgSinkFactory::new(db, Backoff::new(Duration::ZERO, Duration::from_secs(60)));
    PgSinkHandle::new(factory, 1000, Duration::from_secs(120))
}

#[tokio::test]
async fn disconnected_db_backlogs_until_third_tick() {
    let mut db = ScriptDb::down();
    db.script_reconnects([false, false, true]);
    let handle = handle(db);
    let mut sink = handle.make_typed_stream();

    // Producer omitted `begin`; two messages arrive while the DB is down.
    let mut parser = JsonParser::new(&mut sink);
    parser
        .feed(
            concat!(
                r#"{"_":{"t":"m","lvl":"info","src":"App","tag":"m1","ts":0.1,"f":"one"}}"#,
                r#"{"_":{"t":"m","lvl":"info","src":"App","tag":"m2","ts":0.2,"f":"two"}}"#,
            )
            .as_bytes(),
        )
        .await;
    drop(parser);
    assert_eq!(sink.backlog_len(), 2);
    assert!(handle.factory().lock().await.store_mut().calls.is_empty());

    // Reconnect succeeds on the third update tick.
    for _ in 0..3 {
        handle.update().await;
    }
    assert_eq!(
        handle.factory().lock().await.store_mut().reconnect_attempts,
        3
    );

    // The next event drains the backlog first, in FIFO order.
    sink.consume(StreamEvent::Message(MessageInfo {
        tag: logtree_core::Ident::new("m3"),
        source: logtree_core::Ident::new("App"),
        offset: Duration::from_millis(300),
        format: "three".into(),
        ..MessageInfo::default()
    }))
    .await;
    assert_eq!(sink.backlog_len(), 0);

    let factory_handle = handle.factory();
    let mut factory = factory_handle.lock().await;
    let store = factory.store_mut();
    assert_eq!(store.calls[0].op(), "start_stream");
    let entry_tags: Vec<String> = store
        .calls
        .iter()
        .filter(|c| c.op() == "add_entry")
        .map(|c| c.params[4].clone())
        .collect();
    assert_eq!(entry_tags, vec!["m1", "m2", "m3"]);
}

#[tokio::test]
async fn drain_stops_at_first_refusal_and_preserves_order() {
    let handle = handle(ScriptDb::up());
    let mut sink = handle.make_typed_stream();

    sink.consume(StreamEvent::Message(MessageInfo {
        source: logtree_core::Ident::new("App"),
        tag: logtree_core::Ident::new("a"),
        ..MessageInfo::default()
    }))
    .await;

    // Outage window: two events go to the backlog.
    handle.factory().lock().await.store_mut().set_up(false);
    for tag in ["b", "c"] {
        sink.consume(StreamEvent::Message(MessageInfo {
            source: logtree_core::Ident::new("App"),
            tag: logtree_core::Ident::new(tag),
            ..MessageInfo::default()
        }))
        .await;
    }
    assert_eq!(sink.backlog_len(), 2);

    // Still down: the next event queues behind the backlog untried.
    sink.consume(StreamEvent::Message(MessageInfo {
        source: logtree_core::Ident::new("App"),
        tag: logtree_core::Ident::new("d"),
        ..MessageInfo::default()
    }))
    .await;
    assert_eq!(sink.backlog_len(), 3);

    handle.factory().lock().await.store_mut().set_up(true);
    sink.consume(StreamEvent::Message(MessageInfo {
        source: logtree_core::Ident::new("App"),
        tag: logtree_core::Ident::new("e"),
        ..MessageInfo::default()
    }))
    .await;
    assert_eq!(sink.backlog_len(), 0);

    let factory_handle = handle.factory();
    let mut factory = factory_handle.lock().await;
    let tags: Vec<String> = factory
        .store_mut()
        .calls
        .iter()
        .filter(|c| c.op() == "add_entry")
        .map(|c| c.params[4].clone())
        .collect();
    assert_eq!(tags, vec!["a", "b", "c", "d", "e"]);
}

#[tokio::test]
async fn backoff_waits_grow_monotonically_to_cap() {
    let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(60));
    let mut previous = backoff.current();
    for _ in 0..16 {
        backoff.extend();
        assert!(backoff.current() >= previous);
        assert!(backoff.current() <= Duration::from_secs(60));
        previous = backoff.current();
    }
    assert_eq!(backoff.current(), Duration::from_secs(60));
    backoff.rewind();
    assert_eq!(backoff.current(), Duration::from_millis(100));
}

#[tokio::test]
async fn unexpired_backoff_defers_reconnect_attempts() {
    let mut db = ScriptDb::down();
    db.script_reconnects([true]);
    let factory = PgSinkFactory::new(
        db,
        Backoff::new(Duration::from_secs(3600), Duration::from_secs(3600)),
    );
    let handle = PgSinkHandle::new(factory, 1000, Duration::from_secs(120));
    handle.update().await;
    handle.update().await;
    assert_eq!(
        handle.factory().lock().await.store_mut().reconnect_attempts,
        0
    );
}
