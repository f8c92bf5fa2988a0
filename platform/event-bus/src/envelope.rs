//! # Integration Event Envelope
//!
//! Wire format for every message on the catalog topic.
//!
//! ## Envelope Fields
//!
//! - `event_id`: unique identifier, UUIDv7 so ids sort by creation time;
//!   consumers use it as an idempotency key
//! - `occurred_at_utc`: when the event was generated
//! - `type`: string discriminator naming the payload shape
//!   (e.g. `product.created`)
//! - `payload`: complete snapshot of the entity; consumers never need a
//!   follow-up lookup to act on the event

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping every catalog integration event.
///
/// The payload is a *full* snapshot: the search sync service rebuilds the
/// whole search document from it, which is what makes re-indexing after a
/// redelivery idempotent.
///
/// # Examples
///
/// ```rust
/// use event_bus::IntegrationEvent;
/// use serde_json::json;
///
/// let event = IntegrationEvent::new(
///     "product.created".to_string(),
///     json!({ "product_id": "...", "product": {} }),
/// );
/// assert_eq!(event.event_type, "product.created");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationEvent {
    /// Unique event identifier (UUIDv7, time-ordered)
    pub event_id: Uuid,

    /// UTC timestamp when the event was generated
    pub occurred_at_utc: DateTime<Utc>,

    /// Discriminator naming the payload shape, e.g. `product.created`
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event-specific snapshot
    pub payload: serde_json::Value,
}

impl IntegrationEvent {
    /// Create a new envelope with a freshly generated UUIDv7 id.
    pub fn new(event_type: String, payload: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            occurred_at_utc: Utc::now(),
            event_type,
            payload,
        }
    }

    /// Rebuild an envelope from already-persisted parts.
    ///
    /// Used by the outbox relay: the outbox row id doubles as the event id,
    /// so a republished row carries the same `event_id` as the first
    /// attempt and consumers can deduplicate.
    pub fn from_parts(
        event_id: Uuid,
        occurred_at_utc: DateTime<Utc>,
        event_type: String,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id,
            occurred_at_utc,
            event_type,
            payload,
        }
    }

    /// Serialize to the wire format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from the wire format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Validate the raw JSON of an envelope before dispatching it.
///
/// # Validation Rules
///
/// - `event_id`: present, string
/// - `occurred_at_utc`: present, string
/// - `type`: present, non-empty string
/// - `payload`: present
///
/// # Errors
///
/// Returns a descriptive error string if validation fails
pub fn validate_envelope_fields(envelope: &serde_json::Value) -> Result<(), String> {
    envelope
        .get("event_id")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid event_id")?;

    envelope
        .get("occurred_at_utc")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid occurred_at_utc")?;

    let event_type = envelope
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid type")?;

    if event_type.is_empty() {
        return Err("type cannot be empty".to_string());
    }

    if envelope.get("payload").is_none() {
        return Err("Missing payload".to_string());
    }

    Ok(())
}
