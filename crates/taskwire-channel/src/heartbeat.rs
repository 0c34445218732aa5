//! Heartbeat liveness monitoring.
//!
//! The monitor lives inside the open-connection state of the actor, so it
//! is created on entering `connected` and dropped on leaving it. Each tick
//! the actor emits a probe and calls [`HeartbeatMonitor::record_probe`];
//! every inbound frame calls [`HeartbeatMonitor::record_inbound`].

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Verdict after a probe is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Still within the allowance of unanswered probes.
    Alive,
    /// `max_missed` probes went unanswered; the connection is dead.
    Dead,
}

/// Counts unanswered liveness probes for one connection.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    ticker: Interval,
    missed: u32,
    max_missed: u32,
}

impl HeartbeatMonitor {
    /// Monitor whose first tick fires one `period` from now.
    pub fn new(period: Duration, max_missed: u32) -> Self {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            ticker,
            missed: 0,
            max_missed: max_missed.max(1),
        }
    }

    /// Wait for the next probe time.
    pub async fn tick(&mut self) {
        let _ = self.ticker.tick().await;
    }

    /// A probe was emitted.
    pub fn record_probe(&mut self) -> Liveness {
        self.missed = self.missed.saturating_add(1);
        if self.missed >= self.max_missed {
            Liveness::Dead
        } else {
            Liveness::Alive
        }
    }

    /// Any inbound frame proves the peer is alive.
    pub fn record_inbound(&mut self) {
        self.missed = 0;
    }

    /// Probes emitted since the last inbound frame.
    pub fn missed(&self) -> u32 {
        self.missed
    }
}
