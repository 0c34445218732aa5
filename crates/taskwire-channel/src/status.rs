//! Status observers.
//!
//! Holds the current [`StatusChange`] and the observers that want to hear
//! about transitions. Only the state machine calls [`StatusHub::transition`];
//! anyone may observe. Delivery is serialized by a reentrant lock so a new
//! observer's immediate callback never interleaves with a transition, while
//! observers can still register further observers from inside a callback.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tracing::{error, info};

use taskwire_core::{ConnectionStatus, StatusChange};

use crate::registry::panic_message;
use crate::subscription::Subscription;

/// Callback invoked with every status notification.
pub type StatusCallback = Arc<dyn Fn(StatusChange) + Send + Sync>;

/// Current status plus its observers.
pub struct StatusHub {
    current: Mutex<StatusChange>,
    observers: RwLock<Vec<(u64, StatusCallback)>>,
    next_id: AtomicU64,
    delivery: ReentrantMutex<()>,
}

impl Default for StatusHub {
    fn default() -> Self {
        Self {
            current: Mutex::new(StatusChange::default()),
            observers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            delivery: ReentrantMutex::new(()),
        }
    }
}

impl StatusHub {
    /// Current status notification.
    pub fn current(&self) -> StatusChange {
        *self.current.lock()
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.current.lock().status
    }

    /// Move to `next` and notify every observer exactly once.
    ///
    /// Returns `false` without notifying when `next` equals the current value.
    pub fn transition(&self, next: StatusChange) -> bool {
        let _delivery = self.delivery.lock();
        {
            let mut current = self.current.lock();
            if *current == next {
                return false;
            }
            *current = next;
        }
        info!(status = %next.status, attempt = next.attempt, "channel status changed");

        let snapshot: Vec<StatusCallback> = self
            .observers
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in &snapshot {
            notify(callback, next);
        }
        true
    }

    /// Register `callback`, invoking it immediately with the current status.
    pub fn observe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(StatusChange) + Send + Sync + 'static,
    {
        let _delivery = self.delivery.lock();
        let callback: StatusCallback = Arc::new(callback);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.write().push((id, Arc::clone(&callback)));
        notify(&callback, self.current());

        let hub: Weak<Self> = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(hub) = hub.upgrade() {
                hub.observers.write().retain(|(other, _)| *other != id);
            }
        })
    }

    /// Registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }
}

fn notify(callback: &StatusCallback, change: StatusChange) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| callback(change))) {
        error!(
            status = %change.status,
            panic = %panic_message(panic.as_ref()),
            "status observer panicked"
        );
    }
}
