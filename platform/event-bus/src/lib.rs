//! # EventBus Abstraction
//!
//! Transport seam between the outbox relay (producer side) and the search
//! sync service (consumer side).
//!
//! ## Why a trait
//!
//! Both binaries take an `Arc<dyn EventBus>` so the transport can be swapped
//! by configuration:
//! - **NatsBus**: production implementation backed by NATS
//! - **InMemoryBus**: tokio-broadcast implementation for tests and local dev
//!
//! ## Subjects and ordering
//!
//! All catalog events are published under [`TOPIC_PREFIX`]. The subject of
//! an event ends with the id of the entity it concerns (the partition key),
//! e.g. `catalog.events.product.created.<product_id>`. NATS preserves
//! publish order per subject, so all events for one product are delivered
//! to a consumer in commit order while distinct products may interleave.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{EventBus, NatsBus, InMemoryBus, event_subject};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Production: NATS
//! let nats_client = async_nats::connect("nats://localhost:4222").await?;
//! let bus: Arc<dyn EventBus> = Arc::new(NatsBus::new(nats_client));
//!
//! // Dev/Test: In-Memory
//! let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
//!
//! let subject = event_subject("product.created", "7d74bc1e");
//! bus.publish(&subject, b"{}".to_vec()).await?;
//!
//! // Consumer side
//! let mut stream = bus.subscribe("catalog.events.>").await?;
//! while let Some(msg) = futures::StreamExt::next(&mut stream).await {
//!     println!("{} bytes on {}", msg.payload.len(), msg.subject);
//! }
//! # Ok(())
//! # }
//! ```

pub mod consumer_retry;
mod envelope;
mod inmemory_bus;
mod nats_bus;

pub use envelope::{validate_envelope_fields, IntegrationEvent};
pub use inmemory_bus::InMemoryBus;
pub use nats_bus::NatsBus;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;

/// Root of the subject hierarchy for catalog integration events.
pub const TOPIC_PREFIX: &str = "catalog.events";

/// Subject pattern that matches every catalog event (consumer side).
pub const TOPIC_WILDCARD: &str = "catalog.events.>";

/// Build the subject for an event about one entity.
///
/// The entity id is the last token so that NATS per-subject ordering gives
/// per-entity ordering. `event_type` uses dot notation, e.g.
/// `product.created`.
pub fn event_subject(event_type: &str, subject_id: &str) -> String {
    format!("{TOPIC_PREFIX}.{event_type}.{subject_id}")
}

/// A message received from the event bus
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// The subject this message was published to
    pub subject: String,
    /// The message payload (raw bytes, JSON envelope)
    pub payload: Vec<u8>,
    /// Optional headers
    pub headers: Option<std::collections::HashMap<String, String>>,
    /// Optional reply-to subject (unused by the catalog flow)
    pub reply_to: Option<String>,
}

impl BusMessage {
    /// Create a new bus message
    pub fn new(subject: String, payload: Vec<u8>) -> Self {
        Self {
            subject,
            payload,
            headers: None,
            reply_to: None,
        }
    }

    /// Add headers to the message
    pub fn with_headers(mut self, headers: std::collections::HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Add a reply-to subject
    pub fn with_reply_to(mut self, reply_to: String) -> Self {
        self.reply_to = Some(reply_to);
        self
    }
}

/// Errors that can occur when using the event bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    PublishError(String),

    #[error("failed to subscribe to subject: {0}")]
    SubscribeError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("invalid subject pattern: {0}")]
    InvalidSubject(String),
}

/// Result type for event bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Core publish-subscribe abstraction.
///
/// A successful `publish` means the broker acknowledged the message; the
/// outbox relay only marks a row dispatched after `publish` returns `Ok`.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a message to a subject.
    ///
    /// # Arguments
    /// * `subject` - e.g. `catalog.events.product.created.<product_id>`
    /// * `payload` - serialized [`IntegrationEvent`] envelope
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Subscribe to messages matching a subject pattern.
    ///
    /// Patterns support NATS wildcards: `*` matches a single token,
    /// `>` matches one or more trailing tokens. The search sync service
    /// subscribes to [`TOPIC_WILDCARD`].
    async fn subscribe(&self, subject: &str) -> BusResult<BoxStream<'static, BusMessage>>;
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_ends_with_partition_key() {
        let subject = event_subject("product.created", "p-123");
        assert_eq!(subject, "catalog.events.product.created.p-123");
        assert!(subject.starts_with(TOPIC_PREFIX));
    }
}
