use super::entry::Outcome;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Joinable handle to a running fetch. Every clone resolves to the same outcome.
pub type InFlightHandle = Shared<BoxFuture<'static, Outcome>>;

/// Result of asking the registry for a key.
pub enum Claim {
    /// The key settled while we were waiting for the lock.
    Settled(Outcome),
    /// Another caller already owns the fetch.
    Joined(InFlightHandle),
    /// This caller started the fetch.
    Claimed(InFlightHandle),
}

/// Transient map of key to running fetch. Never serialized.
#[derive(Default)]
pub struct InFlightRegistry {
    handles: Mutex<HashMap<String, InFlightHandle>>,
}

impl InFlightRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, InFlightHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomic check-and-set for `key`.
    ///
    /// Under one lock: join an existing handle, or return the settled outcome
    /// reported by `settled`, or build a handle with `start` and insert it
    /// before anyone else can look.
    pub fn claim_or_join<S, F>(&self, key: &str, settled: S, start: F) -> Claim
    where
        S: FnOnce() -> Option<Outcome>,
        F: FnOnce() -> InFlightHandle,
    {
        let mut handles = self.lock();

        if let Some(handle) = handles.get(key) {
            debug!("Joining in-flight fetch: {}", key);
            return Claim::Joined(handle.clone());
        }

        // Settling writes the store before releasing the handle, so a miss
        // above plus a hit here means the fetch just finished.
        if let Some(outcome) = settled() {
            return Claim::Settled(outcome);
        }

        let handle = start();
        handles.insert(key.to_string(), handle.clone());
        Claim::Claimed(handle)
    }

    pub fn release(&self, key: &str) {
        if self.lock().remove(key).is_some() {
            debug!("Released in-flight handle: {}", key);
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl std::fmt::Debug for InFlightRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightRegistry")
            .field("keys", &self.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}
