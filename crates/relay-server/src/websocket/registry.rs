//! Process-wide set of open subscribers.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use super::subscriber::{Subscriber, SubscriberHandle, SubscriberId};

/// Registry of all open subscribers.
///
/// Every entry is in state `Open`: removal happens before the transition to
/// `Closing`, so a [`snapshot`](Self::snapshot) never observes anything else.
pub struct SubscriberRegistry {
    subscribers: DashMap<SubscriberId, Arc<Subscriber>>,
    queue_capacity: usize,
}

impl SubscriberRegistry {
    /// `queue_capacity` bounds how many envelopes may wait for one subscriber.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Add a new open subscriber. Returns its handle and the receiving end of
    /// its delivery queue, which the connection's writer drains.
    pub fn register(&self) -> (SubscriberHandle, mpsc::Receiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let subscriber = Arc::new(Subscriber::new(SubscriberId::new(), tx));
        let _ = self
            .subscribers
            .insert(subscriber.id().clone(), Arc::clone(&subscriber));
        (SubscriberHandle::new(subscriber), rx)
    }

    /// Remove the subscriber behind `handle`. Idempotent.
    pub fn unregister(&self, handle: &SubscriberHandle) -> bool {
        self.remove(handle.id())
    }

    /// Remove a subscriber by ID. Returns `true` only for the call that
    /// actually removed it; that call alone drives `Open` → `Closing`.
    pub fn remove(&self, id: &SubscriberId) -> bool {
        match self.subscribers.remove(id) {
            Some((_, subscriber)) => {
                let _ = subscriber.begin_close();
                debug!(subscriber_id = %id, "subscriber removed from registry");
                true
            }
            None => false,
        }
    }

    /// Point-in-time copy of the open subscribers.
    pub fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        self.subscribers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Remove every subscriber, waking their connection tasks.
    pub fn close_all(&self) -> usize {
        let ids: Vec<SubscriberId> = self
            .subscribers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.iter().filter(|id| self.remove(id)).count()
    }

    /// Whether `id` is still registered.
    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.contains_key(id)
    }

    /// Number of open subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// True when no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
