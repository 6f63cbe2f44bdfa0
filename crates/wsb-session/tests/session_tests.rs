//! The session actor: raw frames in, events out, on a tokio task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use wsb_protocol::{Command, Event, Handle, Protocols, TRANSMIT_ON_CLOSED};
use wsb_session::{SessionConfig, spawn_session};
use wsb_socket::mock::{MockCall, MockConnector};

async fn next(events: &mut mpsc::Receiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event stream closed")
}

#[tokio::test]
async fn raw_frames_drive_a_full_lifecycle() {
    let mock = MockConnector::echoing();
    let (session, mut events) = spawn_session(Arc::new(mock.clone()), SessionConfig::default());

    assert!(session.submit_text(r#"["feed","open",{"url":"ws://upstream.test"}]"#));
    assert_eq!(next(&mut events).await, Event::connected(Handle::from("feed")));

    session.submit_text(r#"["feed","transmit","hello"]"#);
    assert_eq!(next(&mut events).await, Event::message(Handle::from("feed"), "hello"));

    session.submit_text(r#"["feed","close",null]"#);
    assert_eq!(next(&mut events).await, Event::disconnected(Handle::from("feed")));

    session.shutdown().await;
    assert!(mock.calls().contains(&MockCall::Close {
        handle: Handle::from("feed"),
        code: 1000,
        reason: String::new(),
    }));
}

#[tokio::test]
async fn unknown_and_unparseable_frames_are_dropped() {
    let (session, mut events) =
        spawn_session(Arc::new(MockConnector::echoing()), SessionConfig::default());

    session.submit_text(r#"["a","reconnect",null]"#);
    session.submit_text("not json");
    session.submit_text(r#"[1.5,"transmit","x"]"#);
    session.submit_text(r#"["a","transmit","x"]"#);

    // Only the last frame produces anything.
    assert_eq!(
        next(&mut events).await,
        Event::error(Handle::from("a"), TRANSMIT_ON_CLOSED)
    );
    assert!(events.try_recv().is_err());

    session.shutdown().await;
}

#[tokio::test]
async fn bad_data_for_a_known_kind_is_an_error_event() {
    let (session, mut events) =
        spawn_session(Arc::new(MockConnector::echoing()), SessionConfig::default());

    session.submit_text(r#"["a","transmit",null]"#);
    match next(&mut events).await {
        Event::Error { handle, message } => {
            assert_eq!(handle, Handle::from("a"));
            assert!(message.contains("invalid transmit data"), "{message}");
        }
        other => panic!("expected error, got {other:?}"),
    }

    session.submit_text(r#"[9,"open",{"protocol":"chat"}]"#);
    assert!(matches!(
        next(&mut events).await,
        Event::Error { handle: Handle::Number(9), .. }
    ));

    session.shutdown().await;
}

#[tokio::test]
async fn stalled_application_ends_the_session() {
    let mock = MockConnector::echoing();
    let config = SessionConfig {
        event_capacity: 3,
        ..SessionConfig::default()
    };
    let (session, mut events) = spawn_session(Arc::new(mock.clone()), config);

    session.submit_text(r#"["a","open",{"url":"ws://upstream.test"}]"#);
    for i in 0..10 {
        session.submit_text(format!(r#"["a","transmit","{i}"]"#));
    }

    // The buffered events are still delivered, then the stream ends.
    let mut received = 0;
    while let Some(_event) = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for the session to end")
    {
        received += 1;
    }
    assert_eq!(received, 3);

    assert!(mock.calls_for(&Handle::from("a")).contains(&MockCall::Close {
        handle: Handle::from("a"),
        code: 1001,
        reason: "going away".into(),
    }));
    session.shutdown().await;
}

#[tokio::test]
async fn decoded_commands_are_accepted_too() {
    let (session, mut events) =
        spawn_session(Arc::new(MockConnector::echoing()), SessionConfig {
            debug: true,
            ..SessionConfig::default()
        });

    session.submit(Command::Open {
        handle: Handle::Number(1),
        url: "ws://upstream.test".into(),
        protocol: Protocols::from("chat"),
    });
    assert_eq!(next(&mut events).await, Event::connected(Handle::Number(1)));

    session.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_open_connections_without_events() {
    let mock = MockConnector::echoing();
    let (session, mut events) = spawn_session(Arc::new(mock.clone()), SessionConfig::default());

    session.submit_text(r#"["a","open",{"url":"ws://upstream.test/a"}]"#);
    session.submit_text(r#"["b","open",{"url":"ws://upstream.test/b"}]"#);
    next(&mut events).await;
    next(&mut events).await;

    session.shutdown().await;

    for name in ["a", "b"] {
        let handle = Handle::from(name);
        let calls = mock.calls_for(&handle);
        assert!(calls.contains(&MockCall::Detach { handle: handle.clone() }));
        assert!(calls.contains(&MockCall::Close {
            handle,
            code: 1001,
            reason: "going away".into(),
        }));
    }
    assert!(events.recv().await.is_none());
}
