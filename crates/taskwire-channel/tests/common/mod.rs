//! Scripted connector and helpers shared by the channel integration tests.

#![allow(dead_code, missing_docs)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

use taskwire_channel::{Channel, Connector, Link, LinkPeer, SharedToken, Subscription};
use taskwire_core::{ChannelError, StatusChange};
use taskwire_settings::ChannelSettings;

/// What the next physical attempt does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Accept,
    Refuse,
    Hang,
}

pub struct MockConnector {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    attempts: AtomicU32,
    attempt_times: Mutex<Vec<Instant>>,
    urls: Mutex<Vec<Url>>,
    peers: mpsc::UnboundedSender<LinkPeer>,
}

impl MockConnector {
    pub fn new(fallback: Outcome) -> (Arc<Self>, mpsc::UnboundedReceiver<LinkPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            attempts: AtomicU32::new(0),
            attempt_times: Mutex::new(Vec::new()),
            urls: Mutex::new(Vec::new()),
            peers: tx,
        });
        (connector, rx)
    }

    pub fn script(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.script.lock().extend(outcomes);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempt_times.lock().clone()
    }

    pub fn urls(&self) -> Vec<Url> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &Url) -> Result<Link, ChannelError> {
        let _ = self.attempts.fetch_add(1, Ordering::SeqCst);
        self.attempt_times.lock().push(Instant::now());
        self.urls.lock().push(url.clone());

        let outcome = self.script.lock().pop_front().unwrap_or(self.fallback);
        match outcome {
            Outcome::Accept => {
                let (link, peer) = Link::in_memory(64);
                let _ = self.peers.send(peer);
                Ok(link)
            }
            Outcome::Refuse => Err(ChannelError::Handshake("HTTP 403 Forbidden".into())),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

/// Fast timings with no jitter so delays are exact.
pub fn settings() -> ChannelSettings {
    ChannelSettings {
        base_delay_ms: 100,
        max_delay_ms: 1000,
        max_attempts: 3,
        jitter_ms: 0,
        heartbeat_interval_ms: 1000,
        max_missed_heartbeats: 3,
        reconnect_delay_ms: 500,
        ..ChannelSettings::new("ws://tasks.test")
    }
}

pub fn channel(settings: ChannelSettings, connector: &Arc<MockConnector>) -> Channel {
    let connector: Arc<dyn Connector> = connector.clone();
    Channel::with_connector(settings, Arc::new(SharedToken::new("t0k3n")), connector).unwrap()
}

pub type StatusLog = Arc<Mutex<Vec<(StatusChange, Instant)>>>;

pub fn record_status(channel: &Channel) -> (StatusLog, Subscription) {
    let log: StatusLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let sub = channel.on_status_change(move |change| sink.lock().push((change, Instant::now())));
    (log, sub)
}

pub fn changes(log: &StatusLog) -> Vec<StatusChange> {
    log.lock().iter().map(|(change, _)| *change).collect()
}

/// Let spawned tasks run without moving the paused clock.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// Poll `condition` in 1ms steps of virtual time.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..600_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}
