use crate::cache::{CacheEntry, CacheStore, FetchCoordinator, FetchError, Outcome};
use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::debug;
use uuid::Uuid;

// At most one settled state is pushed per subscription
const CHANNEL_CAPACITY: usize = 1;

/// What a consumer renders for one key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchState {
    pub is_loading: bool,
    pub data: Option<Value>,
    pub error: Option<FetchError>,
}

impl FetchState {
    #[must_use]
    pub const fn loading() -> Self {
        Self {
            is_loading: true,
            data: None,
            error: None,
        }
    }

    /// Loading until a settled entry exists, then mirrors it.
    #[must_use]
    pub fn from_entry(entry: Option<&CacheEntry>) -> Self {
        match entry {
            Some(entry) if entry.is_settled() => Self {
                is_loading: false,
                data: entry.data.clone(),
                error: entry.error.clone(),
            },
            _ => Self::loading(),
        }
    }
}

impl From<Outcome> for FetchState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Ok(data) => Self {
                is_loading: false,
                data: Some(data),
                error: None,
            },
            Err(error) => Self {
                is_loading: false,
                data: None,
                error: Some(error),
            },
        }
    }
}

type SubscriberMap = HashMap<String, HashMap<String, mpsc::Sender<FetchState>>>;

#[derive(Debug, Default)]
struct Subscribers {
    by_key: RwLock<SubscriberMap>,
}

impl Subscribers {
    fn insert(&self, key: &str, id: &str, sender: mpsc::Sender<FetchState>) {
        self.by_key
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .insert(id.to_string(), sender);
    }

    fn remove(&self, key: &str, id: &str) -> bool {
        let mut subs = self.by_key.write().unwrap_or_else(PoisonError::into_inner);
        let Some(ids) = subs.get_mut(key) else {
            return false;
        };
        let removed = ids.remove(id).is_some();

        // Clean up empty entries
        if ids.is_empty() {
            subs.remove(key);
        }
        removed
    }

    fn sender(&self, key: &str, id: &str) -> Option<mpsc::Sender<FetchState>> {
        self.by_key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .and_then(|ids| ids.get(id))
            .cloned()
    }

    fn count(&self, key: Option<&str>) -> usize {
        let subs = self.by_key.read().unwrap_or_else(PoisonError::into_inner);
        match key {
            Some(key) => subs.get(key).map_or(0, HashMap::len),
            None => subs.values().map(HashMap::len).sum(),
        }
    }
}

/// A consumer's notification channel for one key.
///
/// Dropping it unsubscribes. The underlying fetch is never cancelled.
#[derive(Debug)]
pub struct Subscription {
    pub id: String,
    pub key: String,
    receiver: mpsc::Receiver<FetchState>,
    subscribers: Arc<Subscribers>,
}

impl Subscription {
    /// Next pushed state, or `None` once nothing more will arrive.
    pub async fn recv(&mut self) -> Option<FetchState> {
        self.receiver.recv().await
    }

    /// Pushed state if one is waiting.
    ///
    /// # Errors
    ///
    /// `TryRecvError::Empty` when nothing is waiting, `TryRecvError::Disconnected`
    /// once the subscription was detached.
    pub fn try_recv(&mut self) -> Result<FetchState, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Detach from the key. Later fetch completions are not delivered.
    pub fn unsubscribe(&mut self) {
        if self.subscribers.remove(&self.key, &self.id) {
            debug!("Unsubscribed {} from {}", self.id, self.key);
        }
        self.receiver.close();
        // Drop anything that raced in before the close
        while self.receiver.try_recv().is_ok() {}
    }
}

impl Stream for Subscription {
    type Item = FetchState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.subscribers.remove(&self.key, &self.id);
    }
}

/// Observer-style bridge from the store and coordinator to reactive consumers.
///
/// Holds no cache data of its own; every subscription of the same key shares
/// the coordinator's single fetch.
#[derive(Debug, Clone)]
pub struct SubscriptionAdapter {
    store: Arc<CacheStore>,
    coordinator: FetchCoordinator,
    subscribers: Arc<Subscribers>,
}

impl SubscriptionAdapter {
    #[must_use]
    pub fn new(store: Arc<CacheStore>, coordinator: FetchCoordinator) -> Self {
        Self {
            store,
            coordinator,
            subscribers: Arc::new(Subscribers::default()),
        }
    }

    /// Returns the current state of `key` and a channel for later updates.
    ///
    /// If `key` is not settled, a task awaits the coordinator and pushes the
    /// settled state, unless the subscription is gone by then.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime while `key` is unsettled.
    #[must_use]
    pub fn subscribe(&self, key: &str) -> (FetchState, Subscription) {
        let state = FetchState::from_entry(self.store.get(key).as_ref());

        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let id = Uuid::new_v4().to_string();
        self.subscribers.insert(key, &id, sender);

        if state.is_loading {
            let coordinator = self.coordinator.clone();
            let subscribers = self.subscribers.clone();
            let key = key.to_string();
            let id = id.clone();

            tokio::spawn(async move {
                let outcome = coordinator.ensure(&key).await;

                if let Some(sender) = subscribers.sender(&key, &id) {
                    // Send update, ignore if receiver dropped
                    let _ = sender.send(FetchState::from(outcome)).await;
                } else {
                    debug!("Subscription {} for {} detached before settle", id, key);
                }
            });
        }

        let subscription = Subscription {
            id,
            key: key.to_string(),
            receiver,
            subscribers: self.subscribers.clone(),
        };

        (state, subscription)
    }

    /// Current state of `key` without subscribing or fetching.
    #[must_use]
    pub fn peek(&self, key: &str) -> FetchState {
        FetchState::from_entry(self.store.get(key).as_ref())
    }

    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.subscribers.count(None)
    }

    #[must_use]
    pub fn subscribers(&self, key: &str) -> usize {
        self.subscribers.count(Some(key))
    }
}
