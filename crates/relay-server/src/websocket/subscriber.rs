//! A single push-channel subscriber and its lifecycle state.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::Utf8Bytes;
use parking_lot::Mutex;
use relay_core::RelayError;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

/// Unique subscriber identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub String);

impl SubscriberId {
    /// Fresh time-ordered id, `sub_<uuid v7>`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self(format!("sub_{}", Uuid::now_v7()))
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle: `Open` → `Closing` → `Closed`. Never moves backwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscriberState {
    /// Registered and receiving envelopes.
    Open = 0,
    /// Removed from the registry, socket teardown in progress.
    Closing = 1,
    /// Socket torn down.
    Closed = 2,
}

impl SubscriberState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// A connected viewer. Owned by the registry while open; the connection
/// task holds another reference through its [`SubscriberHandle`].
pub struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<Utf8Bytes>,
    state: AtomicU8,
    close: CancellationToken,
    connected_at: Instant,
    last_seen: Mutex<Instant>,
    delivered: AtomicU64,
}

impl Subscriber {
    pub(crate) fn new(id: SubscriberId, tx: mpsc::Sender<Utf8Bytes>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            state: AtomicU8::new(SubscriberState::Open as u8),
            close: CancellationToken::new(),
            connected_at: now,
            last_seen: Mutex::new(now),
            delivered: AtomicU64::new(0),
        }
    }

    /// Registry key of this subscriber.
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SubscriberState {
        SubscriberState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Queue a serialized envelope for this subscriber's writer.
    ///
    /// Never waits. A full queue means the writer is stuck behind a slow
    /// socket and counts as a delivery failure, as does a closed one.
    pub fn deliver(&self, frame: Utf8Bytes) -> Result<(), RelayError> {
        match self.tx.try_send(frame) {
            Ok(()) => {
                let _ = self.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(self.delivery_failure("send queue full")),
            Err(TrySendError::Closed(_)) => Err(self.delivery_failure("connection closed")),
        }
    }

    fn delivery_failure(&self, reason: &str) -> RelayError {
        RelayError::DeliveryFailure {
            subscriber: self.id.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Envelopes accepted into the queue so far.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// `Open` → `Closing`, waking the connection task. Returns `false` if the
    /// subscriber was already past `Open`.
    ///
    /// Only the registry calls this, right after removing the entry.
    pub(crate) fn begin_close(&self) -> bool {
        let moved = self
            .state
            .compare_exchange(
                SubscriberState::Open as u8,
                SubscriberState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        self.close.cancel();
        moved
    }

    /// Final transition once the socket is gone.
    pub(crate) fn mark_closed(&self) {
        self.state.store(SubscriberState::Closed as u8, Ordering::Release);
    }

    /// Resolves once the subscriber has been removed from the registry.
    pub fn removed(&self) -> WaitForCancellationFuture<'_> {
        self.close.cancelled()
    }

    /// Record inbound activity (pong or any frame).
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the peer last showed signs of life.
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Returned by [`super::registry::SubscriberRegistry::register`]; used for removal.
#[derive(Clone, Debug)]
pub struct SubscriberHandle {
    subscriber: Arc<Subscriber>,
}

impl SubscriberHandle {
    pub(crate) fn new(subscriber: Arc<Subscriber>) -> Self {
        Self { subscriber }
    }

    pub fn id(&self) -> &SubscriberId {
        self.subscriber.id()
    }

    /// The shared subscriber behind this handle.
    pub fn subscriber(&self) -> &Arc<Subscriber> {
        &self.subscriber
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_subscriber(capacity: usize) -> (Subscriber, mpsc::Receiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Subscriber::new(SubscriberId::new(), tx), rx)
    }

    #[test]
    fn ids_are_unique_and_prefixed() {
        let a = SubscriberId::new();
        let b = SubscriberId::new();
        assert_ne!(a, b);
        assert!(a.0.starts_with("sub_"));
    }

    #[test]
    fn starts_open() {
        let (sub, _rx) = make_subscriber(4);
        assert_eq!(sub.state(), SubscriberState::Open);
        assert_eq!(sub.delivered_count(), 0);
    }

    #[tokio::test]
    async fn deliver_queues_frame() {
        let (sub, mut rx) = make_subscriber(4);
        sub.deliver(Utf8Bytes::from("hello")).unwrap();
        assert_eq!(rx.recv().await.unwrap().as_str(), "hello");
        assert_eq!(sub.delivered_count(), 1);
    }

    #[test]
    fn deliver_to_full_queue_fails() {
        let (sub, _rx) = make_subscriber(1);
        sub.deliver(Utf8Bytes::from("one")).unwrap();
        let err = sub.deliver(Utf8Bytes::from("two")).unwrap_err();
        assert!(err.to_string().contains("send queue full"));
    }

    #[test]
    fn deliver_after_receiver_dropped_fails() {
        let (sub, rx) = make_subscriber(4);
        drop(rx);
        let err = sub.deliver(Utf8Bytes::from("x")).unwrap_err();
        assert!(matches!(err, RelayError::DeliveryFailure { .. }));
    }

    #[test]
    fn begin_close_transitions_once() {
        let (sub, _rx) = make_subscriber(4);
        assert!(sub.begin_close());
        assert_eq!(sub.state(), SubscriberState::Closing);
        assert!(!sub.begin_close());
        sub.mark_closed();
        assert_eq!(sub.state(), SubscriberState::Closed);
    }

    #[tokio::test]
    async fn removed_resolves_after_begin_close() {
        let (sub, _rx) = make_subscriber(4);
        let sub = Arc::new(sub);
        let waiter = Arc::clone(&sub);
        let handle = tokio::spawn(async move { waiter.removed().await });
        let _ = sub.begin_close();
        handle.await.unwrap();
    }

    #[test]
    fn mark_alive_resets_idle() {
        let (sub, _rx) = make_subscriber(4);
        std::thread::sleep(Duration::from_millis(20));
        assert!(sub.idle_for() >= Duration::from_millis(20));
        sub.mark_alive();
        assert!(sub.idle_for() < Duration::from_millis(20));
        assert!(sub.age() >= Duration::from_millis(20));
    }
}
