//! Scoped registration handle.

use std::fmt;

type Release = Box<dyn FnOnce() + Send + Sync>;

/// Keeps one registration alive.
///
/// Calling [`Subscription::unsubscribe`] or dropping the handle removes
/// exactly the registration that produced it; other registrations of the
/// same callback or event type are untouched. Use [`Subscription::detach`]
/// to keep the registration for as long as its owner lives.
#[must_use = "dropping a Subscription removes the registration immediately"]
pub struct Subscription {
    release: Option<Release>,
}

impl Subscription {
    pub(crate) fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Remove the registration now.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    /// Give up the handle without removing the registration.
    pub fn detach(mut self) {
        let _ = self.release.take();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}
