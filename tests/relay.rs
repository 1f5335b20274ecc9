use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use chatr_calls::api::server::serve;
use chatr_calls::call::CallStatus;
use chatr_calls::events::{CallEvent, EndReason, EventReceiver};
use chatr_calls::media::tracks::SampleMediaSource;
use chatr_calls::models::{ClientFrame, Profile, ServerFrame, Signal};
use chatr_calls::state::ServiceContext;
use chatr_calls::{CallClient, CallConfig};

async fn start_relay() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, ServiceContext::new()));
    format!("127.0.0.1:{}", addr.port())
}

fn client_config(addr: &str, answer_timeout: Duration) -> CallConfig {
    CallConfig {
        relay_url: format!("ws://{}/ws", addr),
        answer_timeout,
        ice_servers: Vec::new(),
    }
}

async fn login(addr: &str, id: &str, name: &str, answer_timeout: Duration) -> CallClient {
    CallClient::connect(
        client_config(addr, answer_timeout),
        Profile::new(id, name),
        Arc::new(SampleMediaSource::default()),
    )
    .await
    .unwrap()
}

async fn wait_for_event(events: &mut EventReceiver, matches: impl Fn(&CallEvent) -> bool) -> CallEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn wait_online(client: &CallClient, user_id: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !client.presence().is_online(user_id).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("peer never came online");
}

type Socket = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn raw_register(addr: &str, id: &str) -> Socket {
    let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    let frame = ClientFrame::Register {
        profile: Profile::new(id, id),
    };
    ws.send(Message::Text(serde_json::to_string(&frame).unwrap()))
        .await
        .unwrap();
    ws
}

async fn next_frame(ws: &mut Socket) -> ServerFrame {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn relay_forwards_envelopes_and_tracks_presence() {
    let addr = start_relay().await;
    let mut alice = raw_register(&addr, "alice").await;
    assert!(matches!(next_frame(&mut alice).await, ServerFrame::Registered { online, .. } if online.is_empty()));

    let mut bob = raw_register(&addr, "bob").await;
    assert!(matches!(next_frame(&mut bob).await, ServerFrame::Registered { online, .. } if online.len() == 1));
    assert!(matches!(
        next_frame(&mut alice).await,
        ServerFrame::PresenceJoined { profile } if profile.user_id == "bob"
    ));

    let relay = ClientFrame::Relay {
        to: "bob".to_string(),
        envelope: Signal::CallEnd {}.into_envelope().unwrap(),
    };
    alice
        .send(Message::Text(serde_json::to_string(&relay).unwrap()))
        .await
        .unwrap();
    match next_frame(&mut bob).await {
        ServerFrame::Signal { from, envelope } => {
            assert_eq!(from, "alice");
            assert_eq!(Signal::try_from(envelope).unwrap(), Signal::CallEnd {});
        }
        other => panic!("unexpected frame {:?}", other),
    }

    bob.close(None).await.unwrap();
    assert_eq!(
        next_frame(&mut alice).await,
        ServerFrame::Disconnect { user_id: "bob".to_string() }
    );
}

#[tokio::test]
async fn relay_answers_ping_and_rejects_garbage() {
    let addr = start_relay().await;
    let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();

    ws.send(Message::Text(r#"{"type":"ping"}"#.to_string())).await.unwrap();
    assert_eq!(next_frame(&mut ws).await, ServerFrame::Pong);

    ws.send(Message::Text("not json".to_string())).await.unwrap();
    assert!(matches!(next_frame(&mut ws).await, ServerFrame::Error { .. }));

    let relay = ClientFrame::Relay {
        to: "bob".to_string(),
        envelope: Signal::CallEnd {}.into_envelope().unwrap(),
    };
    ws.send(Message::Text(serde_json::to_string(&relay).unwrap()))
        .await
        .unwrap();
    assert!(matches!(next_frame(&mut ws).await, ServerFrame::Error { .. }));
}

#[tokio::test]
async fn presence_endpoints_reflect_registrations() {
    let addr = start_relay().await;
    let mut alice = raw_register(&addr, "alice").await;
    let _ = next_frame(&mut alice).await;

    let listener_addr = addr.clone();
    let body = tokio::task::spawn_blocking(move || {
        use std::io::{Read, Write};
        let mut stream = std::net::TcpStream::connect(&listener_addr).unwrap();
        write!(
            stream,
            "GET /api/v1/presence/alice HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            listener_addr
        )
        .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    })
    .await
    .unwrap();

    assert!(body.starts_with("HTTP/1.1 200"));
    assert!(body.contains(r#""userId":"alice""#));
    assert!(body.contains(r#""online":true"#));
}

#[tokio::test]
async fn rejected_call_ends_on_both_sides() {
    let addr = start_relay().await;
    let alice = login(&addr, "alice", "Alice", Duration::from_secs(30)).await;
    let bob = login(&addr, "bob", "Bob", Duration::from_secs(30)).await;
    wait_online(&alice, "bob").await;

    let mut alice_events = alice.calls().subscribe();
    let mut bob_events = bob.calls().subscribe();
    alice
        .calls()
        .call_user(Profile::new("bob", "Bob"), false)
        .await
        .unwrap();

    let incoming = wait_for_event(&mut bob_events, |e| matches!(e, CallEvent::IncomingCall { .. })).await;
    assert!(matches!(incoming, CallEvent::IncomingCall { caller, is_video: false } if caller.display_name == "Alice"));
    assert_eq!(bob.calls().snapshot().status, CallStatus::Incoming);

    bob.calls().reject_call().await.unwrap();
    let ended = wait_for_event(&mut alice_events, |e| matches!(e, CallEvent::CallEnded { .. })).await;
    assert!(matches!(ended, CallEvent::CallEnded { reason: EndReason::Rejected, .. }));
    assert_eq!(alice.calls().snapshot().status, CallStatus::Idle);

    alice.disconnect().await;
    bob.disconnect().await;
}

#[tokio::test]
async fn answered_call_connects_and_hangs_up() {
    let addr = start_relay().await;
    let alice = login(&addr, "alice", "Alice", Duration::from_secs(30)).await;
    let bob = login(&addr, "bob", "Bob", Duration::from_secs(30)).await;
    wait_online(&alice, "bob").await;

    let mut alice_events = alice.calls().subscribe();
    let mut bob_events = bob.calls().subscribe();
    alice
        .calls()
        .call_user(Profile::new("bob", "Bob"), true)
        .await
        .unwrap();
    wait_for_event(&mut bob_events, |e| matches!(e, CallEvent::IncomingCall { .. })).await;

    bob.calls().answer_call().await.unwrap();
    wait_for_event(&mut bob_events, |e| matches!(e, CallEvent::CallConnected { .. })).await;
    wait_for_event(&mut alice_events, |e| matches!(e, CallEvent::CallConnected { .. })).await;
    assert_eq!(alice.calls().snapshot().status, CallStatus::Connected);

    alice.calls().end_call().await.unwrap();
    let ended = wait_for_event(&mut bob_events, |e| matches!(e, CallEvent::CallEnded { .. })).await;
    assert!(matches!(ended, CallEvent::CallEnded { reason: EndReason::Ended, .. }));

    alice.disconnect().await;
    bob.disconnect().await;
}

#[tokio::test]
async fn unanswered_call_becomes_missed_call() {
    let addr = start_relay().await;
    let alice = login(&addr, "alice", "Alice", Duration::from_millis(300)).await;
    let bob = login(&addr, "bob", "Bob", Duration::from_secs(30)).await;
    wait_online(&alice, "bob").await;

    let mut alice_events = alice.calls().subscribe();
    let mut bob_events = bob.calls().subscribe();
    alice
        .calls()
        .call_user(Profile::new("bob", "Bob"), false)
        .await
        .unwrap();

    let ended = wait_for_event(&mut alice_events, |e| matches!(e, CallEvent::CallEnded { .. })).await;
    assert!(matches!(ended, CallEvent::CallEnded { reason: EndReason::NoAnswer, .. }));
    let missed = wait_for_event(&mut alice_events, |e| matches!(e, CallEvent::MissedCall { .. })).await;
    assert!(matches!(missed, CallEvent::MissedCall { caller_name } if caller_name == "Alice"));

    let ended = wait_for_event(&mut bob_events, |e| matches!(e, CallEvent::CallEnded { .. })).await;
    assert!(matches!(ended, CallEvent::CallEnded { reason: EndReason::Missed, .. }));
    assert_eq!(bob.calls().snapshot().status, CallStatus::Idle);

    alice.disconnect().await;
    bob.disconnect().await;
}

#[tokio::test]
async fn logging_out_ends_the_counterparts_call() {
    let addr = start_relay().await;
    let alice = login(&addr, "alice", "Alice", Duration::from_secs(30)).await;
    let bob = login(&addr, "bob", "Bob", Duration::from_secs(30)).await;
    wait_online(&alice, "bob").await;

    let mut bob_events = bob.calls().subscribe();
    alice
        .calls()
        .call_user(Profile::new("bob", "Bob"), false)
        .await
        .unwrap();
    wait_for_event(&mut bob_events, |e| matches!(e, CallEvent::IncomingCall { .. })).await;

    alice.disconnect().await;
    let ended = wait_for_event(&mut bob_events, |e| matches!(e, CallEvent::CallEnded { .. })).await;
    assert!(matches!(
        ended,
        CallEvent::CallEnded { reason: EndReason::CounterpartDisconnected, .. }
    ));
    bob.disconnect().await;
}
