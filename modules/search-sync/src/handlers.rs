//! Typed event handlers and the registry that routes to them.
//!
//! Each handler owns one event type end to end: decode the payload, map it,
//! write the index. The projection is a full replace (create and update
//! both write the complete document under the product id, delete removes
//! it), so replaying any event converges on the same index state, which is
//! what makes at-least-once delivery safe.

use async_trait::async_trait;
use catalog_events::events::{
    ProductCreatedEvent, ProductDeletedEvent, ProductUpdatedEvent, PRODUCT_CREATED,
    PRODUCT_DELETED, PRODUCT_UPDATED,
};
use catalog_search::mapper::{map_product_created, map_product_updated};
use catalog_search::{ProductSearchDocument, SearchClient, SearchError, SearchResult};
use event_bus::IntegrationEvent;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

/// Write surface of the index, split out so handlers can be tested against
/// a recording stub instead of a live engine.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put(
        &self,
        index: &str,
        id: &str,
        document: &ProductSearchDocument,
    ) -> SearchResult<()>;

    async fn delete(&self, index: &str, id: &str) -> SearchResult<()>;
}

#[async_trait]
impl DocumentStore for SearchClient {
    async fn put(
        &self,
        index: &str,
        id: &str,
        document: &ProductSearchDocument,
    ) -> SearchResult<()> {
        self.index_document(index, id, document).await
    }

    async fn delete(&self, index: &str, id: &str) -> SearchResult<()> {
        self.delete_document(index, id).await
    }
}

/// Why a handler failed: the consumer retries transient index errors but
/// never a payload that cannot decode.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("malformed payload: {0}")]
    Payload(#[source] serde_json::Error),

    #[error(transparent)]
    Index(#[from] SearchError),
}

/// One event type's projection into the index.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: &IntegrationEvent) -> Result<(), HandlerError>;
}

/// Routes envelopes to handlers by the `event_type` discriminator.
///
/// An explicit map rather than a type switch: adding an event type means
/// registering one more handler, and an unregistered type is visibly "not
/// ours" instead of a decode failure.
pub struct EventHandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn EventHandler>>,
}

impl EventHandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry wired with every catalog product event.
    pub fn catalog(store: Arc<dyn DocumentStore>, index_name: impl Into<String>) -> Self {
        let index_name = index_name.into();
        Self::new()
            .register(
                PRODUCT_CREATED,
                Arc::new(ProductCreatedHandler {
                    store: store.clone(),
                    index_name: index_name.clone(),
                }),
            )
            .register(
                PRODUCT_UPDATED,
                Arc::new(ProductUpdatedHandler {
                    store: store.clone(),
                    index_name: index_name.clone(),
                }),
            )
            .register(
                PRODUCT_DELETED,
                Arc::new(ProductDeletedHandler { store, index_name }),
            )
    }

    pub fn register(
        mut self,
        event_type: &'static str,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        self.handlers.insert(event_type, handler);
        self
    }

    pub fn get(&self, event_type: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(event_type).cloned()
    }
}

impl Default for EventHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn decode<T: DeserializeOwned>(payload: &serde_json::Value) -> Result<T, HandlerError> {
    serde_json::from_value(payload.clone()).map_err(HandlerError::Payload)
}

struct ProductCreatedHandler {
    store: Arc<dyn DocumentStore>,
    index_name: String,
}

#[async_trait]
impl EventHandler for ProductCreatedHandler {
    async fn handle(&self, envelope: &IntegrationEvent) -> Result<(), HandlerError> {
        let event: ProductCreatedEvent = decode(&envelope.payload)?;
        let document = map_product_created(&event);
        self.store
            .put(&self.index_name, &event.product_id.to_string(), &document)
            .await?;
        tracing::info!(product_id = %event.product_id, "Product document indexed");
        Ok(())
    }
}

struct ProductUpdatedHandler {
    store: Arc<dyn DocumentStore>,
    index_name: String,
}

#[async_trait]
impl EventHandler for ProductUpdatedHandler {
    async fn handle(&self, envelope: &IntegrationEvent) -> Result<(), HandlerError> {
        let event: ProductUpdatedEvent = decode(&envelope.payload)?;
        let document = map_product_updated(&event);
        self.store
            .put(&self.index_name, &event.product_id.to_string(), &document)
            .await?;
        tracing::info!(product_id = %event.product_id, "Product document re-indexed");
        Ok(())
    }
}

struct ProductDeletedHandler {
    store: Arc<dyn DocumentStore>,
    index_name: String,
}

#[async_trait]
impl EventHandler for ProductDeletedHandler {
    async fn handle(&self, envelope: &IntegrationEvent) -> Result<(), HandlerError> {
        let event: ProductDeletedEvent = decode(&envelope.payload)?;
        // 404 from the engine counts as success inside the store, so
        // redelivered deletes are no-ops.
        self.store
            .delete(&self.index_name, &event.product_id.to_string())
            .await?;
        tracing::info!(product_id = %event.product_id, "Product document removed");
        Ok(())
    }
}
