//! Parser resilience: malformed records are dropped, order is kept.

use logtree_core::StreamEvent;
use logtree_parser::JsonParser;
use lt_test_utils::RecordingSink;

async fn parse(input: &str) -> (Vec<StreamEvent>, logtree_parser::ParserStats) {
    let mut parser = JsonParser::new(RecordingSink::default());
    parser.feed(input.as_bytes()).await;
    parser.finish().await;
    let stats = parser.stats();
    (parser.into_sink().events, stats)
}

#[tokio::test]
async fn malformed_record_interleaved() {
    let input = concat!(
        r#"{"_":{"t":"begin"}}"#,
        r#"{"_":{"t":"m","lvl":}}"#, // truncated record body
        r#"{"_":{"t":"m","lvl":"info","src":"App","ts":0.2,"f":"ok"}}"#,
        r#"{"_":{"t":"end","ts":0.3,"clean":true}}"#,
    );
    let (events, stats) = parse(input).await;
    assert_eq!(stats.dropped, 1);
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], StreamEvent::Begin(_)));
    assert!(matches!(events[1], StreamEvent::Message(_)));
    assert!(matches!(events[2], StreamEvent::Finish(_)));
}

#[tokio::test]
async fn garbage_between_records_is_skipped() {
    let input = concat!(
        r#"{"_":{"t":"begin"}}"#,
        " #### not json #### ",
        r#"{"_":{"t":"end","ts":1,"clean":true}}"#,
    );
    let (events, stats) = parse(input).await;
    assert_eq!(stats.dropped, 1);
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn unclosed_final_record_is_dropped() {
    let input = concat!(
        r#"{"_":{"t":"m","lvl":"info","src":"App","ts":0.1,"f":"full"}}"#,
        r#"{"_":{"t":"m","lvl":"info"#,
    );
    let (events, stats) = parse(input).await;
    assert_eq!(stats.dropped, 1);
    // message + synthesized unclean finish
    assert_eq!(events.len(), 2);
    let StreamEvent::Finish(f) = &events[1] else {
        panic!("expected finish");
    };
    assert!(!f.clean);
}

#[tokio::test]
async fn order_preserved_around_drops() {
    let mut input = String::new();
    for i in 0..10 {
        input.push_str(&format!(
            r#"{{"_":{{"t":"m","lvl":"info","src":"App","ts":{i},"f":"m{i}"}}}}"#
        ));
        if i % 3 == 0 {
            input.push_str(r#"{"bad": }"#);
        }
    }
    input.push_str(r#"{"_":{"t":"end","ts":99,"clean":true}}"#);
    let (events, stats) = parse(&input).await;
    assert!(stats.dropped + stats.skipped > 0);
    let formats: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Message(m) => Some(m.format.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        formats,
        (0..10).map(|i| format!("m{i}")).collect::<Vec<_>>()
    );
}
