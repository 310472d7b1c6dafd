//! Builds envelopes from inbound webhook bodies.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

use crate::envelope::{Envelope, EventCategory};
use crate::errors::Result;
use crate::payload::RawBody;

/// Wall clock that never goes backwards across calls.
///
/// A reading earlier than the previous one is clamped up to it, so
/// envelopes created later never carry an earlier `timestamp`.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_ms: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time, clamped to be no earlier than any previous reading.
    pub fn now(&self) -> DateTime<Utc> {
        self.observe(Utc::now().timestamp_millis())
    }

    fn observe(&self, wall_ms: i64) -> DateTime<Utc> {
        let prev = self.last_ms.fetch_max(wall_ms, Ordering::AcqRel);
        let ms = prev.max(wall_ms);
        DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
    }
}

/// Converts a category plus raw body into an [`Envelope`].
///
/// Payload-agnostic: any body the transport can decode is accepted as-is.
#[derive(Debug, Default)]
pub struct Normalizer {
    clock: MonotonicClock,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `raw` and stamp it with the ingestion time.
    ///
    /// Fails with [`crate::RelayError::MalformedPayload`] only when the body
    /// cannot be decoded for its content type.
    pub fn normalize(&self, category: EventCategory, raw: RawBody<'_>) -> Result<Envelope> {
        let payload = raw.decode()?;
        Ok(Envelope::new(category, payload, self.clock.now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RelayError;
    use serde_json::json;

    #[test]
    fn clock_clamps_backwards_readings() {
        let clock = MonotonicClock::new();
        let a = clock.observe(1_000_000);
        let b = clock.observe(999_000);
        let c = clock.observe(1_000_500);
        assert_eq!(a.timestamp_millis(), 1_000_000);
        assert_eq!(b.timestamp_millis(), 1_000_000);
        assert_eq!(c.timestamp_millis(), 1_000_500);
    }

    #[test]
    fn clock_tracks_wall_time() {
        let clock = MonotonicClock::new();
        let before = Utc::now().timestamp_millis();
        let now = clock.now().timestamp_millis();
        assert!(now >= before);
    }

    #[test]
    fn normalize_json_body() {
        let n = Normalizer::new();
        let env = n
            .normalize(
                EventCategory::Normal,
                RawBody::new(Some("application/json"), br#"{"temp":72}"#),
            )
            .unwrap();
        assert_eq!(env.category(), EventCategory::Normal);
        assert_eq!(env.payload(), &json!({"temp": 72}));
    }

    #[test]
    fn normalize_keeps_category() {
        let n = Normalizer::new();
        let env = n
            .normalize(EventCategory::Anomalous, RawBody::new(Some("text/plain"), b"spike"))
            .unwrap();
        assert_eq!(env.category(), EventCategory::Anomalous);
        assert_eq!(env.payload(), &json!("spike"));
    }

    #[test]
    fn normalize_rejects_undecodable_body() {
        let n = Normalizer::new();
        let err = n
            .normalize(
                EventCategory::Normal,
                RawBody::new(Some("application/json"), b"{\"temp\":"),
            )
            .unwrap_err();
        assert!(matches!(err, RelayError::MalformedPayload(_)));
    }

    #[test]
    fn timestamps_non_decreasing() {
        let n = Normalizer::new();
        let mut last = None;
        for _ in 0..100 {
            let env = n
                .normalize(EventCategory::Normal, RawBody::new(None, b""))
                .unwrap();
            if let Some(prev) = last {
                assert!(env.received_at() >= prev);
            }
            last = Some(env.received_at());
        }
    }
}
