//! Connection state machine behaviour against a scripted connector.
//!
//! Every test runs on a paused clock, so delays and heartbeat periods are
//! observed exactly.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::time::Instant;

use taskwire_channel::{Channel, Connector, SharedToken};
use taskwire_core::{ClientMessage, ConnectionStatus, StatusChange};

use common::{MockConnector, Outcome, changes, channel, record_status, settings, settle, wait_until};

fn collector() -> (Arc<Mutex<Vec<Value>>>, impl Fn(&Value) + Clone + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |payload: &Value| sink.lock().push(payload.clone()))
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

// ─── Connect idempotence and credentials ────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn rapid_connect_calls_make_one_attempt() {
    let (connector, _peers) = MockConnector::new(Outcome::Hang);
    let channel = channel(settings(), &connector);

    for _ in 0..5 {
        channel.connect().await;
    }
    settle().await;

    assert_eq!(connector.attempts(), 1);
    assert_eq!(channel.status_change(), StatusChange::connecting(1));
}

#[tokio::test(start_paused = true)]
async fn connect_while_connected_is_a_no_op() {
    let (connector, mut peers) = MockConnector::new(Outcome::Accept);
    let channel = channel(settings(), &connector);

    channel.connect().await;
    let _peer = peers.recv().await.unwrap();
    settle().await;
    assert_eq!(channel.status(), ConnectionStatus::Connected);

    for _ in 0..3 {
        channel.connect().await;
    }
    settle().await;
    assert_eq!(connector.attempts(), 1);
    assert_eq!(channel.status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn connect_without_credential_stays_disconnected() {
    let (connector, _peers) = MockConnector::new(Outcome::Accept);
    let token = SharedToken::default();
    let dyn_connector: Arc<dyn Connector> = connector.clone();
    let channel =
        Channel::with_connector(settings(), Arc::new(token.clone()), dyn_connector).unwrap();
    let (log, _sub) = record_status(&channel);

    channel.connect().await;
    settle().await;
    assert_eq!(connector.attempts(), 0);
    assert_eq!(
        changes(&log),
        vec![StatusChange::settled(ConnectionStatus::Disconnected)]
    );

    token.set("late-token");
    channel.connect().await;
    settle().await;
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn endpoint_url_carries_token() {
    let (connector, _peers) = MockConnector::new(Outcome::Hang);
    let channel = channel(settings(), &connector);

    channel.connect().await;
    settle().await;

    let urls = connector.urls();
    assert_eq!(urls[0].as_str(), "ws://tasks.test/ws/tasks?token=t0k3n");
}

// ─── Subscriptions ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn subscribed_type_receives_payload_once() {
    let (connector, mut peers) = MockConnector::new(Outcome::Accept);
    let channel = channel(settings(), &connector);
    let (seen, cb) = collector();
    let _sub = channel.subscribe("X", cb);

    channel.connect().await;
    let peer = peers.recv().await.unwrap();
    assert!(peer.send_text(r#"{"type":"X","value":42}"#).await);
    settle().await;

    assert_eq!(*seen.lock(), vec![json!({"type": "X", "value": 42})]);
}

#[tokio::test(start_paused = true)]
async fn subscription_made_before_connect_survives_reconnects() {
    let (connector, mut peers) = MockConnector::new(Outcome::Accept);
    let channel = channel(settings(), &connector);
    let (seen, cb) = collector();
    let _sub = channel.subscribe("task_created", cb);

    channel.connect().await;
    let first = peers.recv().await.unwrap();
    assert!(first.close(1011).await);
    let second = peers.recv().await.unwrap();
    settle().await;
    assert_eq!(connector.attempts(), 2);
    assert_eq!(channel.status(), ConnectionStatus::Connected);

    let event = r#"{"type":"task_created","task":{"id":1,"title":"Ship it"},"created_by":7}"#;
    assert!(second.send_text(event).await);
    settle().await;

    assert_eq!(seen.lock().len(), 1);
    assert_eq!(seen.lock()[0]["task"]["title"], "Ship it");
}

#[tokio::test(start_paused = true)]
async fn unsubscribing_removes_exactly_one_registration() {
    let (connector, mut peers) = MockConnector::new(Outcome::Accept);
    let channel = channel(settings(), &connector);

    let first_hits = Arc::new(AtomicU32::new(0));
    let second_hits = Arc::new(AtomicU32::new(0));
    let (a, b) = (Arc::clone(&first_hits), Arc::clone(&second_hits));
    let first = channel.subscribe("X", move |_| {
        let _ = a.fetch_add(1, Ordering::SeqCst);
    });
    let _second = channel.subscribe("X", move |_| {
        let _ = b.fetch_add(1, Ordering::SeqCst);
    });
    first.unsubscribe();

    channel.connect().await;
    let peer = peers.recv().await.unwrap();
    assert!(peer.send_text(r#"{"type":"X"}"#).await);
    settle().await;

    assert_eq!(first_hits.load(Ordering::SeqCst), 0);
    assert_eq!(second_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn panicking_subscriber_does_not_disturb_others() {
    let (connector, mut peers) = MockConnector::new(Outcome::Accept);
    let channel = channel(settings(), &connector);
    let _bad = channel.subscribe("X", |_| panic!("subscriber bug"));
    let (seen, cb) = collector();
    let _good = channel.subscribe("X", cb);

    channel.connect().await;
    let peer = peers.recv().await.unwrap();
    assert!(peer.send_text(r#"{"type":"X","value":1}"#).await);
    assert!(peer.send_text(r#"{"type":"X","value":2}"#).await);
    settle().await;

    assert_eq!(seen.lock().len(), 2);
    assert_eq!(channel.status(), ConnectionStatus::Connected);
    let faults = channel.subscriber_faults();
    assert_eq!(faults.len(), 2);
    assert_eq!(faults[0].message, "subscriber bug");
}

#[tokio::test(start_paused = true)]
async fn server_ping_is_answered_and_not_forwarded() {
    let (connector, mut peers) = MockConnector::new(Outcome::Accept);
    let channel = channel(settings(), &connector);
    let (seen, cb) = collector();
    let _all = channel.subscribe_all(cb);
    let (named, named_cb) = collector();
    let _ping = channel.subscribe("ping", named_cb.clone());
    let _pong = channel.subscribe("pong", named_cb);

    channel.connect().await;
    let mut peer = peers.recv().await.unwrap();
    assert!(peer.send_text(r#"{"type":"ping","data":"abc"}"#).await);
    assert!(peer.send_text(r#"{"type":"pong"}"#).await);
    settle().await;

    let reply: Value = serde_json::from_str(&peer.frames.try_recv().unwrap()).unwrap();
    assert_eq!(reply["type"], "pong");
    assert_eq!(reply["data"], "abc");
    assert!(peer.frames.try_recv().is_err());
    assert!(seen.lock().is_empty());
    assert!(named.lock().is_empty());
    assert_eq!(channel.stats().messages_received, 2);
    assert!(channel.recent_events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn welcome_and_task_events_are_tracked() {
    let (connector, mut peers) = MockConnector::new(Outcome::Accept);
    let channel = channel(settings(), &connector);
    let (seen, cb) = collector();
    let _all = channel.subscribe_all(cb);

    channel.connect().await;
    let peer = peers.recv().await.unwrap();
    for frame in [
        r#"{"type":"connection","connection_id":"c-42","message":"Connected to real-time updates"}"#,
        r#"{"type":"heartbeat","timestamp":"2024-01-01T00:00:00Z","active_connections":3}"#,
        r#"{"type":"task_updated","task":{"id":5},"updated_by":2}"#,
    ] {
        assert!(peer.send_text(frame).await);
    }
    settle().await;

    assert_eq!(channel.connection_id().as_deref(), Some("c-42"));
    assert_eq!(seen.lock().len(), 3);
    let recent = channel.recent_events();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].event_type, "task_updated");
    assert_eq!(channel.stats().messages_received, 3);
}

// ─── Outbound ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn send_only_succeeds_on_open_connection() {
    let (connector, mut peers) = MockConnector::new(Outcome::Accept);
    let channel = channel(settings(), &connector);

    assert!(!channel.send(&json!({"type": "stats"})));

    channel.connect().await;
    let mut peer = peers.recv().await.unwrap();
    settle().await;

    assert!(channel.send(&json!({"type": "stats"})));
    assert!(channel.send_message(&ClientMessage::subscribe(["task_created"])));
    assert_eq!(peer.frames.try_recv().unwrap(), r#"{"type":"stats"}"#);
    let subscribe: Value = serde_json::from_str(&peer.frames.try_recv().unwrap()).unwrap();
    assert_eq!(subscribe["events"], json!(["task_created"]));

    channel.disconnect().await;
    assert!(!channel.send(&json!({"type": "stats"})));

    let stats = channel.stats();
    assert_eq!(stats.messages_sent, 2);
    assert_eq!(stats.sends_dropped, 2);
}

// ─── Close handling ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn clean_server_close_settles_disconnected() {
    let (connector, mut peers) = MockConnector::new(Outcome::Accept);
    let channel = channel(settings(), &connector);

    channel.connect().await;
    let peer = peers.recv().await.unwrap();
    assert!(peer.send_text(r#"{"type":"forced_disconnect","reason":"maintenance"}"#).await);
    assert!(peer.close(1000).await);
    settle().await;
    assert_eq!(channel.status(), ConnectionStatus::Disconnected);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn malformed_frame_triggers_reconnect() {
    let (connector, mut peers) = MockConnector::new(Outcome::Accept);
    let channel = channel(settings(), &connector);

    channel.connect().await;
    let first = peers.recv().await.unwrap();
    assert!(first.send_text("Echo: hello").await);
    settle().await;

    assert!(first.closed.is_cancelled());
    assert_eq!(channel.status_change(), StatusChange::connecting(1));

    let _second = peers.recv().await.unwrap();
    settle().await;
    assert_eq!(connector.attempts(), 2);
    assert_eq!(channel.status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn dropping_channel_closes_connection() {
    let (connector, mut peers) = MockConnector::new(Outcome::Accept);
    let channel = channel(settings(), &connector);

    channel.connect().await;
    let peer = peers.recv().await.unwrap();
    settle().await;

    drop(channel);
    settle().await;
    assert!(peer.closed.is_cancelled());
}

// ─── Heartbeat ──────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn unanswered_heartbeats_tear_down_at_exact_deadline() {
    let (connector, mut peers) = MockConnector::new(Outcome::Accept);
    let channel = channel(settings(), &connector);
    let (log, _sub) = record_status(&channel);

    channel.connect().await;
    let mut peer = peers.recv().await.unwrap();
    settle().await;
    assert_eq!(channel.status(), ConnectionStatus::Connected);

    for _ in 0..2 {
        tokio::time::advance(ms(1000)).await;
        settle().await;
    }
    tokio::time::advance(ms(999)).await;
    settle().await;
    assert_eq!(channel.status(), ConnectionStatus::Connected);
    assert!(!peer.closed.is_cancelled());

    tokio::time::advance(ms(1)).await;
    settle().await;
    assert!(peer.closed.is_cancelled());
    assert_eq!(channel.stats().heartbeat_timeouts, 1);

    let mut probes = 0;
    while let Ok(frame) = peer.frames.try_recv() {
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "ping");
        assert!(value["timestamp"].is_string());
        probes += 1;
    }
    assert_eq!(probes, 3);

    assert_eq!(
        changes(&log),
        vec![
            StatusChange::settled(ConnectionStatus::Disconnected),
            StatusChange::connecting(1),
            StatusChange::settled(ConnectionStatus::Connected),
            StatusChange::connecting(1),
        ]
    );
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn inbound_traffic_keeps_connection_alive() {
    let (connector, mut peers) = MockConnector::new(Outcome::Accept);
    let channel = channel(settings(), &connector);

    channel.connect().await;
    let peer = peers.recv().await.unwrap();
    settle().await;

    for _ in 0..10 {
        tokio::time::advance(ms(1000)).await;
        settle().await;
        assert!(peer.send_text(r#"{"type":"pong","timestamp":"2024-01-01T00:00:00Z"}"#).await);
        settle().await;
    }

    assert_eq!(channel.status(), ConnectionStatus::Connected);
    assert_eq!(connector.attempts(), 1);
    assert_eq!(channel.stats().heartbeat_timeouts, 0);
}

// ─── Backoff ────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn retry_delays_double_then_reset_after_success() {
    let (connector, mut peers) = MockConnector::new(Outcome::Accept);
    connector.script([Outcome::Refuse; 4]);
    let channel = channel(
        taskwire_settings::ChannelSettings {
            max_attempts: 10,
            ..settings()
        },
        &connector,
    );

    channel.connect().await;
    let peer = peers.recv().await.unwrap();
    settle().await;
    assert_eq!(channel.status(), ConnectionStatus::Connected);

    let times = connector.attempt_times();
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(gaps, vec![ms(100), ms(200), ms(400), ms(800)]);

    connector.script([Outcome::Refuse]);
    let lost_at = Instant::now();
    assert!(peer.close(4000).await);
    let _next = peers.recv().await.unwrap();

    let times = connector.attempt_times();
    assert_eq!(times.len(), 7);
    assert_eq!(times[5] - lost_at, ms(100));
    assert_eq!(times[6] - times[5], ms(200));
}

#[tokio::test(start_paused = true)]
async fn exhausted_attempts_end_in_error() {
    let (connector, _peers) = MockConnector::new(Outcome::Refuse);
    let channel = channel(settings(), &connector);
    let (log, _sub) = record_status(&channel);

    channel.connect().await;
    wait_until(|| channel.status() == ConnectionStatus::Error).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(connector.attempts(), 3);
    let statuses: Vec<ConnectionStatus> = changes(&log).iter().map(|c| c.status).collect();
    assert_eq!(
        statuses,
        vec![
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connecting,
            ConnectionStatus::Error,
        ]
    );
    let attempts: Vec<u32> = changes(&log).iter().map(|c| c.attempt).collect();
    assert_eq!(attempts, vec![0, 1, 2, 3, 0]);
    assert_eq!(channel.stats().failed_attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn handshake_timeout_counts_as_failure() {
    let (connector, _peers) = MockConnector::new(Outcome::Hang);
    let channel = channel(
        taskwire_settings::ChannelSettings {
            connect_timeout_ms: 2000,
            ..settings()
        },
        &connector,
    );

    channel.connect().await;
    wait_until(|| connector.attempts() == 2).await;

    let times = connector.attempt_times();
    assert_eq!(times[1] - times[0], ms(2100));
    assert_eq!(channel.status_change(), StatusChange::connecting(2));
}

// ─── Manual control ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_retry() {
    let (connector, _peers) = MockConnector::new(Outcome::Refuse);
    let channel = channel(settings(), &connector);

    channel.connect().await;
    settle().await;
    assert_eq!(channel.status_change(), StatusChange::connecting(2));

    channel.disconnect().await;
    assert_eq!(channel.status(), ConnectionStatus::Disconnected);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(connector.attempts(), 1);
    assert_eq!(channel.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn reconnect_reopens_after_fixed_delay() {
    let (connector, mut peers) = MockConnector::new(Outcome::Accept);
    let channel = channel(settings(), &connector);

    channel.connect().await;
    let first = peers.recv().await.unwrap();
    settle().await;

    let start = Instant::now();
    channel.reconnect().await;
    assert!(first.closed.is_cancelled());
    assert_eq!(channel.status(), ConnectionStatus::Disconnected);

    let _second = peers.recv().await.unwrap();
    assert_eq!(start.elapsed(), ms(500));
    settle().await;
    assert_eq!(channel.status(), ConnectionStatus::Connected);
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_reconnect_delay_cancels_it() {
    let (connector, mut peers) = MockConnector::new(Outcome::Accept);
    let channel = channel(settings(), &connector);

    channel.connect().await;
    let _first = peers.recv().await.unwrap();
    settle().await;

    channel.reconnect().await;
    channel.disconnect().await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(connector.attempts(), 1);
    assert_eq!(channel.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn reconnect_after_exhaustion_starts_fresh_sequence() {
    let (connector, mut peers) = MockConnector::new(Outcome::Refuse);
    let channel = channel(settings(), &connector);

    channel.connect().await;
    wait_until(|| channel.status() == ConnectionStatus::Error).await;

    connector.script([Outcome::Accept]);
    channel.reconnect().await;
    assert_eq!(channel.status(), ConnectionStatus::Disconnected);

    let _peer = peers.recv().await.unwrap();
    settle().await;
    assert_eq!(connector.attempts(), 4);
    assert_eq!(channel.status(), ConnectionStatus::Connected);
}

// ─── Credential rotation ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn rotated_credential_recovers_from_error() {
    let (connector, mut peers) = MockConnector::new(Outcome::Refuse);
    let token = SharedToken::new("expired");
    let dyn_connector: Arc<dyn Connector> = connector.clone();
    let channel =
        Channel::with_connector(settings(), Arc::new(token.clone()), dyn_connector).unwrap();

    channel.connect().await;
    wait_until(|| channel.status() == ConnectionStatus::Error).await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(connector.attempts(), 3);

    connector.script([Outcome::Accept]);
    token.set("fresh");
    channel.credentials_changed().await;
    assert_eq!(channel.status_change(), StatusChange::connecting(1));

    let _peer = peers.recv().await.unwrap();
    settle().await;
    assert_eq!(channel.status(), ConnectionStatus::Connected);
    assert_eq!(connector.attempts(), 4);
    assert_eq!(
        connector.urls()[3].as_str(),
        "ws://tasks.test/ws/tasks?token=fresh"
    );
}

#[tokio::test(start_paused = true)]
async fn credential_change_leaves_other_states_alone() {
    let (connector, mut peers) = MockConnector::new(Outcome::Accept);
    let channel = channel(settings(), &connector);

    channel.credentials_changed().await;
    settle().await;
    assert_eq!(connector.attempts(), 0);
    assert_eq!(channel.status(), ConnectionStatus::Disconnected);

    channel.connect().await;
    let _peer = peers.recv().await.unwrap();
    settle().await;
    channel.credentials_changed().await;
    settle().await;
    assert_eq!(connector.attempts(), 1);
    assert_eq!(channel.status(), ConnectionStatus::Connected);
}
