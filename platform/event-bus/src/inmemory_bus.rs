//! In-memory implementation of the EventBus trait for testing and development

use crate::{BusMessage, BusResult, EventBus};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;

/// EventBus implementation using an in-process broadcast channel.
///
/// Used for unit tests and for running the relay + sync binaries locally
/// without a NATS container. Delivery order matches publish order, which
/// the ordering tests rely on.
///
/// # Example
/// ```rust
/// use event_bus::{EventBus, InMemoryBus};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryBus::new();
///
/// // Subscribe before publishing
/// let mut stream = bus.subscribe("catalog.events.>").await?;
///
/// bus.publish("catalog.events.product.created.p-1", b"{}".to_vec()).await?;
///
/// let msg = stream.next().await.unwrap();
/// assert_eq!(msg.subject, "catalog.events.product.created.p-1");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryBus {
    // Single broadcast channel for all subjects; subscribers filter by
    // pattern. Buffer must outlast test bursts or old messages drop.
    sender: Arc<broadcast::Sender<BusMessage>>,
}

impl InMemoryBus {
    /// Create a new in-memory event bus with a 1000-message buffer.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1000);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create a bus with a custom buffer size.
    pub fn with_capacity(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Check if a subject matches a subscription pattern.
    ///
    /// NATS-style wildcards:
    /// - `*` matches exactly one token
    /// - `>` matches one or more trailing tokens
    fn matches_pattern(subject: &str, pattern: &str) -> bool {
        let subject_tokens: Vec<&str> = subject.split('.').collect();
        let pattern_tokens: Vec<&str> = pattern.split('.').collect();

        let mut s_idx = 0;
        let mut p_idx = 0;

        while s_idx < subject_tokens.len() && p_idx < pattern_tokens.len() {
            let pattern_token = pattern_tokens[p_idx];

            if pattern_token == ">" {
                return true;
            } else if pattern_token == "*" || subject_tokens[s_idx] == pattern_token {
                s_idx += 1;
                p_idx += 1;
            } else {
                return false;
            }
        }

        s_idx == subject_tokens.len() && p_idx == pattern_tokens.len()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        let msg = BusMessage::new(subject.to_string(), payload);

        // A send error just means no receivers are connected yet
        let _ = self.sender.send(msg);

        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> BusResult<BoxStream<'static, BusMessage>> {
        let mut receiver = self.sender.subscribe();
        let pattern = pattern.to_string();

        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(msg) => {
                        if Self::matches_pattern(&msg.subject, &pattern) {
                            yield msg;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "in-memory bus subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_pattern_matching() {
        // Exact match
        assert!(InMemoryBus::matches_pattern(
            "catalog.events.product.created.p-1",
            "catalog.events.product.created.p-1"
        ));

        // Single wildcard
        assert!(InMemoryBus::matches_pattern(
            "catalog.events.product.created.p-1",
            "catalog.events.product.created.*"
        ));
        assert!(!InMemoryBus::matches_pattern(
            "catalog.events.product.created.p-1",
            "catalog.events.*"
        ));

        // Multi-level wildcard
        assert!(InMemoryBus::matches_pattern(
            "catalog.events.product.created.p-1",
            "catalog.events.>"
        ));
        assert!(!InMemoryBus::matches_pattern(
            "catalog.events.product.created.p-1",
            "billing.>"
        ));

        // Edge cases
        assert!(InMemoryBus::matches_pattern("single", "single"));
        assert!(InMemoryBus::matches_pattern("single", "*"));
        assert!(InMemoryBus::matches_pattern("single", ">"));
        assert!(!InMemoryBus::matches_pattern("one.two", "one"));
    }

    #[tokio::test]
    async fn test_publish_and_subscribe() {
        let bus = InMemoryBus::new();

        let mut stream = bus.subscribe("catalog.events.>").await.unwrap();

        let payload = br#"{"type":"product.created"}"#.to_vec();
        bus.publish("catalog.events.product.created.p-1", payload.clone())
            .await
            .unwrap();

        let msg = tokio::time::timeout(std::time::Duration::from_secs(1), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended");

        assert_eq!(msg.subject, "catalog.events.product.created.p-1");
        assert_eq!(msg.payload, payload);
    }

    #[tokio::test]
    async fn test_per_subject_ordering() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe("catalog.events.>").await.unwrap();

        // Five events for the same product must arrive in publish order
        for i in 0..5 {
            let payload = format!("update {i}").into_bytes();
            bus.publish("catalog.events.product.updated.p-1", payload)
                .await
                .unwrap();
        }

        for i in 0..5 {
            let msg = tokio::time::timeout(std::time::Duration::from_secs(1), stream.next())
                .await
                .expect("timeout")
                .expect("stream ended");

            assert_eq!(msg.payload, format!("update {i}").into_bytes());
        }
    }

    #[tokio::test]
    async fn test_wildcard_filtering() {
        let bus = InMemoryBus::new();

        // Only product.created events for any product
        let mut stream = bus
            .subscribe("catalog.events.product.created.*")
            .await
            .unwrap();

        bus.publish("catalog.events.product.created.p-1", b"match".to_vec())
            .await
            .unwrap();
        bus.publish("catalog.events.product.deleted.p-1", b"no match".to_vec())
            .await
            .unwrap();
        bus.publish("catalog.events.product.created.p-2", b"match".to_vec())
            .await
            .unwrap();

        let msg1 = tokio::time::timeout(std::time::Duration::from_millis(100), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        assert_eq!(msg1.subject, "catalog.events.product.created.p-1");

        let msg2 = tokio::time::timeout(std::time::Duration::from_millis(100), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        assert_eq!(msg2.subject, "catalog.events.product.created.p-2");

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(100), stream.next()).await;
        assert!(result.is_err(), "should timeout, no more messages");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = InMemoryBus::new();

        // Two independent logical consumers see the same event
        let mut stream1 = bus.subscribe("catalog.events.>").await.unwrap();
        let mut stream2 = bus.subscribe("catalog.events.>").await.unwrap();

        let payload = b"broadcast".to_vec();
        bus.publish("catalog.events.product.created.p-1", payload.clone())
            .await
            .unwrap();

        let msg1 = tokio::time::timeout(std::time::Duration::from_secs(1), stream1.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        let msg2 = tokio::time::timeout(std::time::Duration::from_secs(1), stream2.next())
            .await
            .expect("timeout")
            .expect("stream ended");

        assert_eq!(msg1.payload, payload);
        assert_eq!(msg2.payload, payload);
    }
}
