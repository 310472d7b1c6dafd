//! Envelope fan-out to every open subscriber.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use relay_core::Envelope;
use tracing::{debug, warn};

use super::registry::SubscriberRegistry;

/// Outcome of one broadcast pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers in the snapshot.
    pub attempted: usize,
    /// Envelopes accepted into a subscriber queue.
    pub queued: usize,
    /// Subscribers dropped because delivery failed.
    pub dropped: usize,
}

/// Delivers envelopes to the subscribers in a [`SubscriberRegistry`].
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self { registry }
    }

    /// Queue `envelope` for every subscriber open at snapshot time.
    ///
    /// Returns once every attempt has been dispatched; socket writes happen
    /// on each subscriber's own task. A subscriber whose queue rejects the
    /// envelope is removed from the registry and the pass moves on.
    pub fn broadcast(&self, envelope: &Envelope) -> BroadcastReport {
        let frame = match envelope.to_wire() {
            Ok(json) => Utf8Bytes::from(json),
            Err(e) => {
                warn!(category = %envelope.category(), error = %e, "failed to serialize envelope");
                return BroadcastReport::default();
            }
        };

        let snapshot = self.registry.snapshot();
        let mut report = BroadcastReport {
            attempted: snapshot.len(),
            ..BroadcastReport::default()
        };

        for subscriber in snapshot {
            match subscriber.deliver(frame.clone()) {
                Ok(()) => report.queued += 1,
                Err(e) => {
                    warn!(subscriber_id = %subscriber.id(), error = %e, "dropping subscriber");
                    if self.registry.remove(subscriber.id()) {
                        report.dropped += 1;
                    }
                }
            }
        }

        debug!(
            category = %envelope.category(),
            recipients = report.attempted,
            queued = report.queued,
            dropped = report.dropped,
            "broadcast envelope"
        );
        report
    }
}
