//! The event consumer loop: bus message in, index write (or dead letter) out.
//!
//! Messages are processed strictly one at a time off the subscription
//! stream. The broker orders messages per subject and every subject ends
//! with a product id, so all events for one product apply in commit order.

use event_bus::consumer_retry::{retry_with_backoff, RetryConfig};
use event_bus::{validate_envelope_fields, BusMessage, EventBus, IntegrationEvent, TOPIC_WILDCARD};
use futures::StreamExt;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

use crate::dlq;
use crate::handlers::{EventHandlerRegistry, HandlerError};

/// What became of one bus message.
#[derive(Debug)]
pub enum MessageOutcome {
    /// A handler applied the event to the index.
    Applied { event_type: String },
    /// Forward compatibility: a discriminator no handler is registered for.
    SkippedUnknown { event_type: String },
    /// The message could not be applied; it belongs in the dead-letter
    /// table. `retries` is 0 for permanent data errors (retrying cannot
    /// fix a malformed payload).
    DeadLetter {
        event_id: Option<Uuid>,
        envelope_json: serde_json::Value,
        error: String,
        retries: i32,
    },
}

/// Decode a bus message and route it through the registry, retrying
/// transient index failures with backoff.
pub async fn handle_message(
    registry: &EventHandlerRegistry,
    msg: &BusMessage,
    retry: &RetryConfig,
) -> MessageOutcome {
    let raw: serde_json::Value = match serde_json::from_slice(&msg.payload) {
        Ok(raw) => raw,
        Err(e) => {
            return MessageOutcome::DeadLetter {
                event_id: None,
                envelope_json: serde_json::json!({
                    "raw": String::from_utf8_lossy(&msg.payload)
                }),
                error: format!("envelope is not JSON: {e}"),
                retries: 0,
            }
        }
    };

    if let Err(e) = validate_envelope_fields(&raw) {
        return MessageOutcome::DeadLetter {
            event_id: None,
            envelope_json: raw,
            error: format!("envelope validation failed: {e}"),
            retries: 0,
        };
    }

    let envelope: IntegrationEvent = match serde_json::from_value(raw.clone()) {
        Ok(envelope) => envelope,
        Err(e) => {
            return MessageOutcome::DeadLetter {
                event_id: None,
                envelope_json: raw,
                error: format!("envelope does not deserialize: {e}"),
                retries: 0,
            }
        }
    };

    let handler = match registry.get(&envelope.event_type) {
        Some(handler) => handler,
        None => {
            return MessageOutcome::SkippedUnknown {
                event_type: envelope.event_type,
            }
        }
    };

    // First attempt classifies the failure: a payload that does not decode
    // is permanent and goes straight to the dead letters, an index error
    // gets the retry budget.
    match handler.handle(&envelope).await {
        Ok(()) => MessageOutcome::Applied {
            event_type: envelope.event_type,
        },
        Err(HandlerError::Payload(e)) => MessageOutcome::DeadLetter {
            event_id: Some(envelope.event_id),
            envelope_json: raw,
            error: format!("malformed payload for {}: {e}", envelope.event_type),
            retries: 0,
        },
        Err(HandlerError::Index(first)) => {
            tracing::warn!(
                event_id = %envelope.event_id,
                event_type = %envelope.event_type,
                error = %first,
                "Index write failed, retrying with backoff"
            );

            let result = retry_with_backoff(
                || async {
                    handler
                        .handle(&envelope)
                        .await
                        .map_err(|e| e.to_string())
                },
                retry,
                "project_catalog_event",
            )
            .await;

            match result {
                Ok(()) => MessageOutcome::Applied {
                    event_type: envelope.event_type,
                },
                Err(error) => MessageOutcome::DeadLetter {
                    event_id: Some(envelope.event_id),
                    envelope_json: raw,
                    error,
                    retries: retry.max_attempts as i32,
                },
            }
        }
    }
}

/// Subscribe to the catalog topic and run until the shutdown signal flips.
///
/// Index failures never stop the loop: after retries the message is
/// recorded in `sync_failed_events` and the consumer moves on, so one
/// poisoned event cannot stall the projection of every other product.
pub async fn run_consumer(
    bus: Arc<dyn EventBus>,
    pool: PgPool,
    registry: EventHandlerRegistry,
    retry: RetryConfig,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut stream = bus.subscribe(TOPIC_WILDCARD).await?;
    tracing::info!(subject = TOPIC_WILDCARD, "Search sync consumer subscribed");

    loop {
        let msg = tokio::select! {
            changed = shutdown.changed() => {
                // A dropped sender counts as shutdown; without this the
                // closed channel resolves instantly and the loop spins.
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("Search sync consumer stopping");
                    return Ok(());
                }
                continue;
            }
            msg = stream.next() => match msg {
                Some(msg) => msg,
                None => {
                    tracing::warn!("Event bus stream ended");
                    return Ok(());
                }
            },
        };

        let span = tracing::info_span!("project_event", subject = %msg.subject);
        let outcome = handle_message(&registry, &msg, &retry)
            .instrument(span)
            .await;

        match outcome {
            MessageOutcome::Applied { event_type } => {
                tracing::debug!(event_type = %event_type, "Event applied to index");
            }
            MessageOutcome::SkippedUnknown { event_type } => {
                tracing::warn!(
                    event_type = %event_type,
                    subject = %msg.subject,
                    "Unknown event type, skipping"
                );
            }
            MessageOutcome::DeadLetter {
                event_id,
                envelope_json,
                error,
                retries,
            } => {
                if let Err(e) = dlq::record_failed_event(
                    &pool,
                    event_id,
                    &msg.subject,
                    &envelope_json,
                    &error,
                    retries,
                )
                .await
                {
                    // The message is lost if this also fails; log loudly
                    // and keep consuming.
                    tracing::error!(
                        event_id = ?event_id,
                        subject = %msg.subject,
                        error = %e,
                        "Failed to record dead letter"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::{envelope_for, snapshot, RecordingStore};
    use crate::handlers::DocumentStore;
    use async_trait::async_trait;
    use catalog_events::events::{CatalogEvent, ProductCreatedEvent, PRODUCT_DELETED};
    use catalog_search::{ProductSearchDocument, SearchError, SearchResult};
    use std::time::Duration;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    fn message_for(event: CatalogEvent) -> BusMessage {
        let subject_id = event.subject_id().to_string();
        let envelope = envelope_for(event);
        let subject = event_bus::event_subject(&envelope.event_type, &subject_id);
        BusMessage::new(subject, envelope.to_bytes().unwrap())
    }

    #[tokio::test]
    async fn well_formed_event_is_applied() {
        let store = RecordingStore::new();
        let registry = EventHandlerRegistry::catalog(store.clone(), "products");

        let product_id = Uuid::new_v4();
        let msg = message_for(CatalogEvent::ProductCreated(ProductCreatedEvent {
            product_id,
            product: snapshot("Trail Shoe"),
        }));

        let outcome = handle_message(&registry, &msg, &fast_retry()).await;

        assert!(matches!(
            outcome,
            MessageOutcome::Applied { ref event_type } if event_type.as_str() == "product.created"
        ));
        assert!(store
            .documents
            .lock()
            .unwrap()
            .contains_key(&product_id.to_string()));
    }

    #[tokio::test]
    async fn unknown_event_type_is_skipped_not_dead_lettered() {
        let store = RecordingStore::new();
        let registry = EventHandlerRegistry::catalog(store.clone(), "products");

        let envelope = IntegrationEvent::new(
            "product.archived".to_string(),
            serde_json::json!({ "product_id": Uuid::new_v4() }),
        );
        let msg = BusMessage::new(
            "catalog.events.product.archived.x".to_string(),
            envelope.to_bytes().unwrap(),
        );

        let outcome = handle_message(&registry, &msg, &fast_retry()).await;

        assert!(matches!(
            outcome,
            MessageOutcome::SkippedUnknown { ref event_type } if event_type.as_str() == "product.archived"
        ));
        assert!(store.documents.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_dead_lettered_without_retries() {
        let registry = EventHandlerRegistry::catalog(RecordingStore::new(), "products");

        // Known discriminator, payload that cannot decode
        let envelope = IntegrationEvent::new(
            PRODUCT_DELETED.to_string(),
            serde_json::json!({ "product_id": "not-a-uuid" }),
        );
        let msg = BusMessage::new(
            "catalog.events.product.deleted.x".to_string(),
            envelope.to_bytes().unwrap(),
        );

        let outcome = handle_message(&registry, &msg, &fast_retry()).await;

        match outcome {
            MessageOutcome::DeadLetter {
                event_id, retries, ..
            } => {
                assert_eq!(event_id, Some(envelope.event_id));
                assert_eq!(retries, 0);
            }
            other => panic!("expected dead letter, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_bytes_are_dead_lettered_without_an_event_id() {
        let registry = EventHandlerRegistry::catalog(RecordingStore::new(), "products");

        let msg = BusMessage::new(
            "catalog.events.product.created.x".to_string(),
            b"not json at all".to_vec(),
        );

        let outcome = handle_message(&registry, &msg, &fast_retry()).await;

        match outcome {
            MessageOutcome::DeadLetter {
                event_id,
                envelope_json,
                retries,
                ..
            } => {
                assert_eq!(event_id, None);
                assert_eq!(retries, 0);
                assert_eq!(envelope_json["raw"], "not json at all");
            }
            other => panic!("expected dead letter, got {other:?}"),
        }
    }

    struct FailingStore;

    #[async_trait]
    impl DocumentStore for FailingStore {
        async fn put(
            &self,
            _index: &str,
            _id: &str,
            _document: &ProductSearchDocument,
        ) -> SearchResult<()> {
            Err(SearchError::Http("connection refused".to_string()))
        }

        async fn delete(&self, _index: &str, _id: &str) -> SearchResult<()> {
            Err(SearchError::Http("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn index_failure_exhausts_retries_then_dead_letters() {
        let registry = EventHandlerRegistry::catalog(Arc::new(FailingStore), "products");
        let retry = fast_retry();

        let msg = message_for(CatalogEvent::ProductCreated(ProductCreatedEvent {
            product_id: Uuid::new_v4(),
            product: snapshot("Unreachable"),
        }));

        let outcome = handle_message(&registry, &msg, &retry).await;

        match outcome {
            MessageOutcome::DeadLetter { retries, error, .. } => {
                assert_eq!(retries, retry.max_attempts as i32);
                assert!(error.contains("connection refused"));
            }
            other => panic!("expected dead letter, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_shutdown_sender_stops_the_consumer() {
        // Lazy pool: never connects, the loop must exit before any query
        let pool = PgPool::connect_lazy("postgres://localhost/unused").unwrap();
        let bus: Arc<dyn EventBus> = Arc::new(event_bus::InMemoryBus::new());
        let registry = EventHandlerRegistry::catalog(RecordingStore::new(), "products");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_consumer(bus, pool, registry, fast_retry(), shutdown_rx));
        drop(shutdown_tx);

        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .expect("consumer must stop when the shutdown channel closes")
            .unwrap()
            .unwrap();
    }
}
