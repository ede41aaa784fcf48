//! Set of channels currently under capture.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use livekeep_core::ChannelKey;

/// Shared membership set. A key is present exactly while a [`SessionClaim`]
/// for it is alive.
#[derive(Debug, Clone, Default)]
pub struct ActiveSessions {
    inner: Arc<Mutex<HashSet<ChannelKey>>>,
}

impl ActiveSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `key` unless present. The returned claim removes it on drop.
    pub fn try_claim(&self, key: &ChannelKey) -> Option<SessionClaim> {
        if !self.lock().insert(key.clone()) {
            return None;
        }
        Some(SessionClaim {
            sessions: self.clone(),
            key: key.clone(),
        })
    }

    pub fn contains(&self, key: &ChannelKey) -> bool {
        self.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn keys(&self) -> Vec<ChannelKey> {
        let mut keys: Vec<_> = self.lock().iter().cloned().collect();
        keys.sort();
        keys
    }

    // A panic while holding the lock cannot leave the set half-updated.
    fn lock(&self) -> MutexGuard<'_, HashSet<ChannelKey>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive right to capture one channel.
#[derive(Debug)]
pub struct SessionClaim {
    sessions: ActiveSessions,
    key: ChannelKey,
}

impl SessionClaim {
    pub fn key(&self) -> &ChannelKey {
        &self.key
    }
}

impl Drop for SessionClaim {
    fn drop(&mut self) {
        self.sessions.lock().remove(&self.key);
        tracing::trace!(channel = %self.key, "session released");
    }
}
