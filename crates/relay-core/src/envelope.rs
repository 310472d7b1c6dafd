//! Event envelope sent to every subscriber.
//!
//! Wire shape: `{"type": "normal"|"anomalous", "data": <body>, "timestamp": "<ISO-8601>"}`.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Classification of an inbound webhook. Both categories are relayed the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    /// Events from the normal dataset route.
    Normal,
    /// Events from the anomalous dataset route.
    Anomalous,
}

impl EventCategory {
    /// Lowercase label used on the wire and in route paths.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Anomalous => "anomalous",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized webhook event. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    category: EventCategory,
    #[serde(rename = "data")]
    payload: Value,
    #[serde(rename = "timestamp", serialize_with = "serialize_millis")]
    received_at: DateTime<Utc>,
}

impl Envelope {
    /// Build an envelope. Ingestion goes through [`crate::Normalizer`].
    pub fn new(category: EventCategory, payload: Value, received_at: DateTime<Utc>) -> Self {
        Self {
            category,
            payload,
            received_at,
        }
    }

    /// Which webhook route produced this event.
    pub fn category(&self) -> EventCategory {
        self.category
    }

    /// The decoded request body, unchanged.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Ingestion time; serialized with millisecond precision.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// The canonical serialized form delivered to subscribers.
    pub fn to_wire(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn serialize_millis<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}
