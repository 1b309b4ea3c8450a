use super::*;
use strand_protocol::DiagnosticLevel;

fn idle(session: &str) -> EngineEvent {
    EngineEvent::SessionIdle {
        session_id: session.to_string(),
    }
}

fn diagnostic(session: Option<&str>, message: &str) -> EngineEvent {
    EngineEvent::Diagnostic {
        session_id: session.map(str::to_string),
        level: DiagnosticLevel::Info,
        message: message.to_string(),
    }
}

#[tokio::test]
async fn test_publish_and_receive() {
    let bus = EventBus::new();
    let mut sub = bus.subscribe(EventFilter::All);

    bus.publish(idle("s1"));
    assert_eq!(sub.recv().await, Some(idle("s1")));
}

#[tokio::test]
async fn test_delivery_preserves_publication_order() {
    let bus = EventBus::new();
    let mut sub = bus.subscribe(EventFilter::All);

    for i in 0..100 {
        bus.publish(diagnostic(None, &format!("m{i}")));
    }
    for i in 0..100 {
        let event = sub.recv().await.unwrap();
        let EngineEvent::Diagnostic { message, .. } = event else {
            panic!("wrong event");
        };
        assert_eq!(message, format!("m{i}"));
    }
}

#[tokio::test]
async fn test_session_filter() {
    let bus = EventBus::new();
    let mut sub = bus.subscribe(EventFilter::Session("s1".to_string()));

    bus.publish(idle("s2"));
    bus.publish(idle("s1"));

    assert_eq!(sub.recv().await, Some(idle("s1")));
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn test_kind_filter() {
    let bus = EventBus::new();
    let mut sub = bus.subscribe(EventFilter::Kind(EventKind::Diagnostic));

    bus.publish(idle("s1"));
    bus.publish(diagnostic(Some("s1"), "note"));

    let event = sub.recv().await.unwrap();
    assert_eq!(event.kind(), EventKind::Diagnostic);
}

#[tokio::test]
async fn test_multi_subscriber_fanout() {
    let bus = EventBus::new();
    let mut a = bus.subscribe(EventFilter::All);
    let mut b = bus.subscribe(EventFilter::All);

    bus.publish(idle("s1"));
    assert_eq!(a.recv().await, Some(idle("s1")));
    assert_eq!(b.recv().await, Some(idle("s1")));
}

#[tokio::test]
async fn test_slow_subscriber_overflow_drops_oldest() {
    let bus = EventBus::with_capacity(4);
    let mut sub = bus.subscribe(EventFilter::All);

    for i in 0..10 {
        bus.publish(diagnostic(None, &format!("m{i}")));
    }

    let mut received = Vec::new();
    while let Some(event) = sub.try_recv() {
        received.push(event);
    }

    // An overflow notice must be present, and the newest event must survive.
    let overflow = received
        .iter()
        .find_map(|e| match e {
            EngineEvent::SubscriberOverflow { dropped, .. } => Some(*dropped),
            _ => None,
        })
        .expect("expected an overflow notice");
    assert!(overflow > 0);

    let last = received.last().unwrap();
    let EngineEvent::Diagnostic { message, .. } = last else {
        panic!("newest event lost");
    };
    assert_eq!(message, "m9");

    // Survivors (ignoring the notice) stay in publication order.
    let messages: Vec<&str> = received
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Diagnostic { message, .. } => Some(message.as_str()),
            _ => None,
        })
        .collect();
    let mut sorted = messages.clone();
    sorted.sort();
    assert_eq!(messages, sorted);
}

#[tokio::test]
async fn test_overflow_does_not_block_publisher() {
    let bus = EventBus::with_capacity(2);
    let _sub = bus.subscribe(EventFilter::All);

    // A subscriber that never drains must not block publishes.
    let started = std::time::Instant::now();
    for i in 0..10_000 {
        bus.publish(diagnostic(None, &format!("m{i}")));
    }
    assert!(started.elapsed() < std::time::Duration::from_secs(1));
}

#[tokio::test]
async fn test_unsubscribe_on_drop() {
    let bus = EventBus::new();
    let sub = bus.subscribe(EventFilter::All);
    assert_eq!(bus.subscriber_count(), 1);
    drop(sub);
    assert_eq!(bus.subscriber_count(), 0);
}

#[tokio::test]
async fn test_recv_ends_when_bus_dropped() {
    let bus = EventBus::new();
    let mut sub = bus.subscribe(EventFilter::All);
    bus.publish(idle("s1"));
    drop(bus);

    // Queued events still drain, then end-of-stream.
    assert_eq!(sub.recv().await, Some(idle("s1")));
    assert_eq!(sub.recv().await, None);
}

#[tokio::test]
async fn test_recv_wakes_on_late_publish() {
    let bus = EventBus::new();
    let mut sub = bus.subscribe(EventFilter::All);

    let publisher = bus.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        publisher.publish(idle("s1"));
    });

    let event = tokio::time::timeout(std::time::Duration::from_secs(2), sub.recv())
        .await
        .expect("recv timed out");
    assert_eq!(event, Some(idle("s1")));
}
