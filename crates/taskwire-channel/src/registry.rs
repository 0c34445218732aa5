//! Event subscription registry.
//!
//! Maps an event type to an ordered list of callback registrations. The
//! registry is independent of any connection: registrations made before the
//! first connect, or across any number of reconnects, stay in place until
//! their [`Subscription`] is released.
//!
//! Dispatch clones the matching callbacks under the read lock and invokes
//! them after releasing it, so callbacks may subscribe or unsubscribe
//! re-entrantly. Each callback runs inside its own panic boundary.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use taskwire_core::ANY_EVENT;

use crate::subscription::Subscription;

/// Callback invoked with the full message object.
pub type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

struct Registration {
    id: u64,
    callback: EventCallback,
}

/// A callback that panicked during dispatch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberFault {
    /// Event type being dispatched.
    pub event_type: String,
    /// Panic message, if it was a string.
    pub message: String,
    /// When the panic was caught.
    pub occurred_at: DateTime<Utc>,
}

/// Connection-independent event type → callbacks mapping.
pub struct EventRegistry {
    handlers: RwLock<HashMap<String, Vec<Registration>>>,
    next_id: AtomicU64,
    faults: Mutex<VecDeque<SubscriberFault>>,
    fault_capacity: usize,
}

impl EventRegistry {
    /// Registry keeping up to `fault_capacity` fault records.
    pub fn new(fault_capacity: usize) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            faults: Mutex::new(VecDeque::new()),
            fault_capacity: fault_capacity.max(1),
        }
    }

    /// Register `callback` for `event_type` and return its release handle.
    ///
    /// The handle holds only a weak reference, so an outstanding
    /// subscription never keeps the registry alive.
    pub fn subscribe<F>(self: &Arc<Self>, event_type: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.register(event_type, Arc::new(callback));
        let registry: Weak<Self> = Arc::downgrade(self);
        let event_type = event_type.to_string();
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                let _ = registry.unregister(&event_type, id);
            }
        })
    }

    /// Register a callback; returns its registration id.
    pub fn register(&self, event_type: &str, callback: EventCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .entry(event_type.to_string())
            .or_default()
            .push(Registration { id, callback });
        debug!(event_type, id, "subscriber registered");
        id
    }

    /// Remove one registration. Returns `false` if it was already gone.
    pub fn unregister(&self, event_type: &str, id: u64) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            let _ = handlers.remove(event_type);
        }
        if removed {
            debug!(event_type, id, "subscriber removed");
        }
        removed
    }

    /// Invoke every callback registered for `event_type`, then every
    /// [`ANY_EVENT`] callback. Returns how many callbacks ran.
    pub fn dispatch(&self, event_type: &str, payload: &Value) -> usize {
        let snapshot: Vec<EventCallback> = {
            let handlers = self.handlers.read();
            let specific = handlers.get(event_type).into_iter().flatten();
            let wildcard = (event_type != ANY_EVENT)
                .then(|| handlers.get(ANY_EVENT))
                .flatten()
                .into_iter()
                .flatten();
            specific
                .chain(wildcard)
                .map(|r| Arc::clone(&r.callback))
                .collect()
        };

        for callback in &snapshot {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(payload)));
            if let Err(panic) = outcome {
                self.record_fault(event_type, panic_message(panic.as_ref()));
            }
        }
        snapshot.len()
    }

    /// Registrations currently held for `event_type`.
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.read().get(event_type).map_or(0, Vec::len)
    }

    /// Most recent subscriber faults, oldest first.
    pub fn faults(&self) -> Vec<SubscriberFault> {
        self.faults.lock().iter().cloned().collect()
    }

    fn record_fault(&self, event_type: &str, message: String) {
        error!(event_type, panic = %message, "subscriber panicked during dispatch");
        let mut faults = self.faults.lock();
        if faults.len() == self.fault_capacity {
            let _ = faults.pop_front();
        }
        faults.push_back(SubscriberFault {
            event_type: event_type.to_string(),
            message,
            occurred_at: Utc::now(),
        });
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
