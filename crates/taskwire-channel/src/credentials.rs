//! Credential lookup.
//!
//! The channel never stores or refreshes credentials. It asks the provider
//! for the current token right before every physical attempt, so a token
//! rotated by the application is picked up on the next reconnect.

use std::sync::Arc;

use parking_lot::RwLock;

/// Supplies the current authentication token on demand.
pub trait CredentialProvider: Send + Sync {
    /// Current token, or `None` when the user is signed out.
    fn token(&self) -> Option<String>;
}

impl<F> CredentialProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// A token slot the application can update at any time.
///
/// Cloning shares the slot. Updating it does not wake the channel; call
/// [`Channel::credentials_changed`](crate::Channel::credentials_changed)
/// after a rotation to recover a channel that gave up reconnecting.
#[derive(Clone, Debug, Default)]
pub struct SharedToken {
    inner: Arc<RwLock<Option<String>>>,
}

impl SharedToken {
    /// Slot holding `token`.
    pub fn new(token: impl Into<String>) -> Self {
        let slot = Self::default();
        slot.set(token);
        slot
    }

    /// Replace the token.
    pub fn set(&self, token: impl Into<String>) {
        *self.inner.write() = Some(token.into());
    }

    /// Remove the token.
    pub fn clear(&self) {
        *self.inner.write() = None;
    }
}

impl CredentialProvider for SharedToken {
    fn token(&self) -> Option<String> {
        self.inner.read().clone().filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_provider() {
        let provider = || Some("abc".to_string());
        assert_eq!(provider.token().as_deref(), Some("abc"));
    }

    #[test]
    fn shared_token_updates_are_visible_to_clones() {
        let slot = SharedToken::default();
        let view = slot.clone();
        assert_eq!(view.token(), None);

        slot.set("t1");
        assert_eq!(view.token().as_deref(), Some("t1"));

        slot.clear();
        assert_eq!(view.token(), None);
    }

    #[test]
    fn empty_token_counts_as_missing() {
        let slot = SharedToken::new("");
        assert_eq!(slot.token(), None);
    }
}
