//! Connection state machine.
//!
//! A single task owns the physical connection and everything that touches
//! it: facade commands, handshake completion, inbound frames, close
//! notifications, heartbeat ticks and retry timers are all handled here one
//! at a time. The current [`Phase`] owns whatever is pending (an attempt
//! future, a timer, or the open link plus its heartbeat), so replacing the
//! phase is what cancels it.

use std::pin::Pin;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Sleep};
use tracing::{debug, error, info, warn};

use taskwire_core::{
    ChannelError, ClientMessage, ConnectionStatus, Inbound, MessageKind, StatusChange,
};
use taskwire_settings::ChannelSettings;

use crate::credentials::CredentialProvider;
use crate::heartbeat::{HeartbeatMonitor, Liveness};
use crate::recent::RecentEvents;
use crate::reconnect::ReconnectState;
use crate::registry::EventRegistry;
use crate::stats::Counters;
use crate::status::StatusHub;
use crate::transport::{CloseReason, Connector, Link, LinkEvent};

// ─────────────────────────────────────────────────────────────────────────────
// Shared state
// ─────────────────────────────────────────────────────────────────────────────

/// State readable from the facade while the actor runs.
pub(crate) struct Shared {
    pub registry: Arc<EventRegistry>,
    pub status: Arc<StatusHub>,
    pub recent: Mutex<RecentEvents>,
    /// Queue into the open connection; `Some` only while connected.
    pub outbound: Mutex<Option<mpsc::Sender<String>>>,
    pub connection_id: Mutex<Option<String>>,
    pub counters: Counters,
}

impl Shared {
    pub fn new(settings: &ChannelSettings) -> Self {
        Self {
            registry: Arc::new(EventRegistry::new(settings.fault_log_capacity)),
            status: Arc::new(StatusHub::default()),
            recent: Mutex::new(RecentEvents::new(settings.recent_events_capacity)),
            outbound: Mutex::new(None),
            connection_id: Mutex::new(None),
            counters: Counters::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands and phases
// ─────────────────────────────────────────────────────────────────────────────

/// Facade request; the sender is acknowledged once the request is applied.
pub(crate) enum Command {
    Connect(oneshot::Sender<()>),
    Disconnect(oneshot::Sender<()>),
    Reconnect(oneshot::Sender<()>),
    CredentialsChanged(oneshot::Sender<()>),
}

type Attempt = BoxFuture<'static, Result<Link, ChannelError>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Resume {
    /// Next attempt of an automatic reconnection sequence.
    Retry,
    /// Second half of a manual reconnect.
    Reconnect,
}

enum Phase {
    /// `disconnected` or `error`; nothing pending.
    Idle,
    /// Handshake in flight.
    Attempting(Attempt),
    /// Timer before the next attempt.
    Waiting {
        until: Pin<Box<Sleep>>,
        resume: Resume,
    },
    /// Connected, with its heartbeat.
    Open {
        link: Link,
        heartbeat: HeartbeatMonitor,
    },
}

enum Wake {
    Command(Command),
    AttemptDone(Result<Link, ChannelError>),
    WaitElapsed(Resume),
    Link(Option<LinkEvent>),
    HeartbeatDue,
}

impl Phase {
    /// Resolves when the pending work of this phase produces something.
    ///
    /// Every handler of the returned wake replaces the phase, so a finished
    /// attempt or timer is never polled again.
    async fn next(&mut self) -> Wake {
        match self {
            Self::Idle => std::future::pending().await,
            Self::Attempting(attempt) => Wake::AttemptDone(attempt.as_mut().await),
            Self::Waiting { until, resume } => {
                until.as_mut().await;
                Wake::WaitElapsed(*resume)
            }
            Self::Open { link, heartbeat } => tokio::select! {
                event = link.recv() => Wake::Link(event),
                () = heartbeat.tick() => Wake::HeartbeatDue,
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct ChannelActor {
    settings: ChannelSettings,
    credentials: Arc<dyn CredentialProvider>,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
    reconnect: ReconnectState,
    phase: Phase,
}

impl ChannelActor {
    pub fn new(
        settings: ChannelSettings,
        credentials: Arc<dyn CredentialProvider>,
        connector: Arc<dyn Connector>,
        shared: Arc<Shared>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            reconnect: ReconnectState::new(settings.backoff()),
            settings,
            credentials,
            connector,
            shared,
            commands,
            phase: Phase::Idle,
        }
    }

    /// Run until the facade is dropped.
    pub async fn run(mut self) {
        loop {
            let wake = tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(command) => Wake::Command(command),
                    None => break,
                },
                wake = self.phase.next() => wake,
            };
            self.handle(wake);
        }
        self.close_link();
        debug!("channel actor stopped");
    }

    fn handle(&mut self, wake: Wake) {
        match wake {
            Wake::Command(Command::Connect(ack)) => {
                self.connect();
                let _ = ack.send(());
            }
            Wake::Command(Command::Disconnect(ack)) => {
                self.disconnect();
                let _ = ack.send(());
            }
            Wake::Command(Command::Reconnect(ack)) => {
                self.disconnect();
                let delay = self.settings.reconnect_delay();
                debug!(
                    delay_ms = self.settings.reconnect_delay_ms,
                    "manual reconnect scheduled"
                );
                self.phase = Phase::Waiting {
                    until: Box::pin(time::sleep(delay)),
                    resume: Resume::Reconnect,
                };
                let _ = ack.send(());
            }
            Wake::Command(Command::CredentialsChanged(ack)) => {
                self.credentials_changed();
                let _ = ack.send(());
            }
            Wake::AttemptDone(Ok(link)) => self.on_open(link),
            Wake::AttemptDone(Err(err)) => self.on_attempt_failed(&err),
            Wake::WaitElapsed(Resume::Retry) => self.start_attempt(),
            Wake::WaitElapsed(Resume::Reconnect) => {
                self.phase = Phase::Idle;
                self.connect();
            }
            Wake::Link(event) => self.on_link_event(event),
            Wake::HeartbeatDue => self.on_heartbeat_due(),
        }
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────

    fn connect(&mut self) {
        let status = self.shared.status.status();
        if status.is_active() {
            debug!(%status, "connect ignored, channel already active");
            return;
        }
        if self.credentials.token().is_none() {
            debug!("connect skipped, no credential available");
            self.phase = Phase::Idle;
            return;
        }
        self.reconnect.reset();
        self.start_attempt();
    }

    /// Leave `error` with a fresh sequence. In any other state the next
    /// attempt reads the new credential anyway.
    fn credentials_changed(&mut self) {
        if self.shared.status.status() != ConnectionStatus::Error {
            debug!("credential changed, nothing to restart");
            return;
        }
        info!("credential changed, retrying after exhausted attempts");
        self.connect();
    }

    fn disconnect(&mut self) {
        if matches!(self.phase, Phase::Open { .. }) {
            info!("closing connection on request");
        }
        self.close_link();
        self.reconnect.reset();
        let _ = self
            .shared
            .status
            .transition(StatusChange::settled(ConnectionStatus::Disconnected));
    }

    fn start_attempt(&mut self) {
        let Some(token) = self.credentials.token() else {
            warn!("credential no longer available, staying disconnected");
            self.phase = Phase::Idle;
            let _ = self
                .shared
                .status
                .transition(StatusChange::settled(ConnectionStatus::Disconnected));
            return;
        };
        let url = match self.settings.endpoint_url(&token) {
            Ok(url) => url,
            Err(e) => {
                let err = ChannelError::from(e);
                error!(error = %err, "cannot build endpoint url");
                self.phase = Phase::Idle;
                let _ = self
                    .shared
                    .status
                    .transition(StatusChange::settled(ConnectionStatus::Error));
                return;
            }
        };

        let attempt = self.reconnect.attempts() + 1;
        debug!(
            attempt,
            host = url.host_str().unwrap_or_default(),
            path = url.path(),
            "opening connection"
        );

        let connector = Arc::clone(&self.connector);
        let timeout = self.settings.connect_timeout();
        self.phase = Phase::Attempting(Box::pin(async move {
            match time::timeout(timeout, connector.connect(&url)).await {
                Ok(result) => result,
                Err(_) => Err(ChannelError::Timeout(timeout)),
            }
        }));
        let _ = self
            .shared
            .status
            .transition(StatusChange::connecting(attempt));
    }

    fn on_open(&mut self, link: Link) {
        self.reconnect.reset();
        Counters::bump(&self.shared.counters.connections_opened);
        *self.shared.outbound.lock() = Some(link.sender());
        *self.shared.connection_id.lock() = None;

        let heartbeat = HeartbeatMonitor::new(
            self.settings.heartbeat_interval(),
            self.settings.max_missed_heartbeats,
        );
        self.phase = Phase::Open { link, heartbeat };
        info!("connection open");
        let _ = self
            .shared
            .status
            .transition(StatusChange::settled(ConnectionStatus::Connected));
    }

    fn on_attempt_failed(&mut self, err: &ChannelError) {
        self.reconnect.record_failure();
        Counters::bump(&self.shared.counters.failed_attempts);
        let attempts = self.reconnect.attempts();
        warn!(attempt = attempts, error = %err, "connection attempt failed");

        if !err.is_retryable() || self.reconnect.exhausted() {
            self.phase = Phase::Idle;
            warn!(
                attempts,
                max_attempts = self.settings.max_attempts,
                "giving up on reconnection"
            );
            let _ = self
                .shared
                .status
                .transition(StatusChange::settled(ConnectionStatus::Error));
            return;
        }
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        let delay = self.reconnect.next_delay();
        let attempt = self.reconnect.attempts() + 1;
        info!(attempt, ?delay, "reconnect scheduled");
        self.phase = Phase::Waiting {
            until: Box::pin(time::sleep(delay)),
            resume: Resume::Retry,
        };
        let _ = self
            .shared
            .status
            .transition(StatusChange::connecting(attempt));
    }

    /// Tear down an open connection that ended unexpectedly and start the
    /// reconnection sequence.
    fn connection_lost(&mut self) {
        self.close_link();
        self.schedule_retry();
    }

    /// Drop whatever the current phase holds and forget the open connection.
    fn close_link(&mut self) {
        *self.shared.outbound.lock() = None;
        *self.shared.connection_id.lock() = None;
        self.phase = Phase::Idle;
    }

    // ─── Open connection ────────────────────────────────────────────────

    fn on_link_event(&mut self, event: Option<LinkEvent>) {
        match event {
            Some(LinkEvent::Text(text)) => self.on_frame(&text),
            Some(LinkEvent::Closed(reason)) if reason.is_normal() => {
                info!("server closed the connection normally");
                self.close_link();
                let _ = self
                    .shared
                    .status
                    .transition(StatusChange::settled(ConnectionStatus::Disconnected));
            }
            Some(LinkEvent::Closed(reason)) => {
                match &reason {
                    CloseReason::Clean { code, reason } => {
                        warn!(code, reason = %reason, "connection closed unexpectedly");
                    }
                    CloseReason::Unclean(detail) => {
                        warn!(error = %detail, "connection lost");
                    }
                }
                self.connection_lost();
            }
            None => {
                warn!("transport stopped without a close notification");
                self.connection_lost();
            }
        }
    }

    fn on_frame(&mut self, text: &str) {
        Counters::bump(&self.shared.counters.messages_received);
        if let Phase::Open { heartbeat, .. } = &mut self.phase {
            heartbeat.record_inbound();
        }

        let inbound = match Inbound::decode(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                let err = ChannelError::from(e);
                warn!(error = %err, "dropping connection after malformed frame");
                self.connection_lost();
                return;
            }
        };

        if inbound.kind.is_control() {
            if inbound.kind == MessageKind::Ping {
                let _ = self.send_control(&ClientMessage::pong(inbound.data().cloned()));
            }
            return;
        }

        if let Some(id) = inbound.connection_id() {
            info!(connection_id = id, "server assigned connection id");
            *self.shared.connection_id.lock() = Some(id.to_string());
        }
        if inbound.kind.is_domain_event() {
            self.shared
                .recent
                .lock()
                .push(inbound.event_type(), inbound.payload.clone());
        }
        let delivered = self
            .shared
            .registry
            .dispatch(inbound.event_type(), &inbound.payload);
        debug!(event_type = inbound.event_type(), delivered, "message dispatched");
    }

    fn on_heartbeat_due(&mut self) {
        let probe = ClientMessage::probe();
        let _ = self.send_control(&probe);

        let verdict = match &mut self.phase {
            Phase::Open { heartbeat, .. } => (heartbeat.record_probe(), heartbeat.missed()),
            _ => return,
        };
        if let (Liveness::Dead, missed) = verdict {
            warn!(missed, "heartbeat timed out, connection presumed dead");
            Counters::bump(&self.shared.counters.heartbeat_timeouts);
            self.connection_lost();
        }
    }

    fn send_control(&self, message: &ClientMessage) -> bool {
        let Phase::Open { link, .. } = &self.phase else {
            return false;
        };
        let sent = message.to_json().is_ok_and(|json| link.try_send(json));
        if sent {
            Counters::bump(&self.shared.counters.messages_sent);
        } else {
            warn!("control frame could not be queued");
        }
        sent
    }
}
