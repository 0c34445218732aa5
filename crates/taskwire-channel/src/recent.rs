//! Bounded history of recent task events.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// One remembered task event.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentEvent {
    /// The message `type`.
    pub event_type: String,
    /// The whole message object.
    pub payload: Value,
    /// Arrival time.
    pub received_at: DateTime<Utc>,
}

/// Fixed-capacity ring; the oldest entry is evicted first.
#[derive(Debug)]
pub struct RecentEvents {
    entries: VecDeque<RecentEvent>,
    capacity: usize,
}

impl RecentEvents {
    /// Ring holding at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an event, evicting the oldest when full.
    pub fn push(&mut self, event_type: &str, payload: Value) {
        if self.entries.len() == self.capacity {
            let _ = self.entries.pop_front();
        }
        self.entries.push_back(RecentEvent {
            event_type: event_type.to_string(),
            payload,
            received_at: Utc::now(),
        });
    }

    /// Entries, oldest first.
    pub fn snapshot(&self) -> Vec<RecentEvent> {
        self.entries.iter().cloned().collect()
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
