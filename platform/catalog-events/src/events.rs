//! The catalog event family and its envelope (de)serialization.

use event_bus::IntegrationEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ProductSnapshot;

/// Discriminator for [`ProductCreatedEvent`].
pub const PRODUCT_CREATED: &str = "product.created";
/// Discriminator for [`ProductUpdatedEvent`].
pub const PRODUCT_UPDATED: &str = "product.updated";
/// Discriminator for [`ProductDeletedEvent`].
pub const PRODUCT_DELETED: &str = "product.deleted";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCreatedEvent {
    pub product_id: Uuid,
    pub product: ProductSnapshot,
}

/// Carries the same full snapshot as a create; the search document is fully
/// replaced either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductUpdatedEvent {
    pub product_id: Uuid,
    pub product: ProductSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDeletedEvent {
    pub product_id: Uuid,
}

/// Closed tagged union of every event the catalog emits.
#[derive(Debug, Clone)]
pub enum CatalogEvent {
    ProductCreated(ProductCreatedEvent),
    ProductUpdated(ProductUpdatedEvent),
    ProductDeleted(ProductDeletedEvent),
}

/// Failure to decode a known event type's payload.
///
/// Unknown event types are *not* an error: [`CatalogEvent::from_envelope`]
/// returns `Ok(None)` for those so consumers stay forward compatible.
#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error("malformed payload for event type {event_type}: {source}")]
    Payload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize event payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CatalogEvent {
    /// The discriminator written to the envelope's `type` field.
    pub fn event_type(&self) -> &'static str {
        match self {
            CatalogEvent::ProductCreated(_) => PRODUCT_CREATED,
            CatalogEvent::ProductUpdated(_) => PRODUCT_UPDATED,
            CatalogEvent::ProductDeleted(_) => PRODUCT_DELETED,
        }
    }

    /// The entity this event concerns, and the broker partition key: all
    /// events for one product share an ordered sub-log.
    pub fn subject_id(&self) -> Uuid {
        match self {
            CatalogEvent::ProductCreated(e) => e.product_id,
            CatalogEvent::ProductUpdated(e) => e.product_id,
            CatalogEvent::ProductDeleted(e) => e.product_id,
        }
    }

    /// Wrap this event in a wire envelope with a fresh event id.
    pub fn into_envelope(self) -> Result<IntegrationEvent, EventDecodeError> {
        let event_type = self.event_type().to_string();
        let payload = match self {
            CatalogEvent::ProductCreated(e) => serde_json::to_value(e)?,
            CatalogEvent::ProductUpdated(e) => serde_json::to_value(e)?,
            CatalogEvent::ProductDeleted(e) => serde_json::to_value(e)?,
        };
        Ok(IntegrationEvent::new(event_type, payload))
    }

    /// Decode a wire envelope into a typed event.
    ///
    /// Returns `Ok(None)` for discriminators this consumer does not know,
    /// `Err` only when a *known* type carries a payload that does not
    /// deserialize (a permanent data error).
    pub fn from_envelope(envelope: &IntegrationEvent) -> Result<Option<Self>, EventDecodeError> {
        let decoded = match envelope.event_type.as_str() {
            PRODUCT_CREATED => Some(CatalogEvent::ProductCreated(
                decode(&envelope.event_type, &envelope.payload)?,
            )),
            PRODUCT_UPDATED => Some(CatalogEvent::ProductUpdated(
                decode(&envelope.event_type, &envelope.payload)?,
            )),
            PRODUCT_DELETED => Some(CatalogEvent::ProductDeleted(
                decode(&envelope.event_type, &envelope.payload)?,
            )),
            _ => None,
        };
        Ok(decoded)
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    event_type: &str,
    payload: &serde_json::Value,
) -> Result<T, EventDecodeError> {
    serde_json::from_value(payload.clone()).map_err(|source| EventDecodeError::Payload {
        event_type: event_type.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn snapshot() -> ProductSnapshot {
        ProductSnapshot {
            name: "Trail Shoe".to_string(),
            url_slug: "trail-shoe".to_string(),
            description: "A shoe".to_string(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            brand: BrandInfo {
                brand_id: Uuid::new_v4(),
                name: "Acme".to_string(),
                description: None,
                logo_url: None,
            },
            path: vec![],
            groups: vec![],
            dimensions: vec![],
            variants: vec![VariantInfo {
                id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
                sku: "SKU-1".to_string(),
                barcode: None,
                price: dec!(49.90),
                description: None,
                is_active: true,
                in_stock: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                dimension_values: vec![],
                images: vec![],
            }],
            images: vec![],
        }
    }

    #[test]
    fn envelope_round_trip() {
        let product_id = Uuid::new_v4();
        let event = CatalogEvent::ProductCreated(ProductCreatedEvent {
            product_id,
            product: snapshot(),
        });

        let envelope = event.into_envelope().unwrap();
        assert_eq!(envelope.event_type, PRODUCT_CREATED);

        let decoded = CatalogEvent::from_envelope(&envelope).unwrap().unwrap();
        match decoded {
            CatalogEvent::ProductCreated(e) => {
                assert_eq!(e.product_id, product_id);
                assert_eq!(e.product.name, "Trail Shoe");
                assert_eq!(e.product.variants[0].price, dec!(49.90));
            }
            other => panic!("decoded wrong variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_type_decodes_to_none() {
        let envelope = IntegrationEvent::new(
            "product.archived".to_string(),
            serde_json::json!({ "product_id": Uuid::new_v4() }),
        );

        assert!(CatalogEvent::from_envelope(&envelope).unwrap().is_none());
    }

    #[test]
    fn malformed_payload_for_known_type_is_an_error() {
        let envelope = IntegrationEvent::new(
            PRODUCT_DELETED.to_string(),
            serde_json::json!({ "product_id": "not-a-uuid" }),
        );

        let err = CatalogEvent::from_envelope(&envelope).unwrap_err();
        assert!(matches!(err, EventDecodeError::Payload { .. }));
    }

    #[test]
    fn subject_id_is_the_product_id() {
        let product_id = Uuid::new_v4();
        let event = CatalogEvent::ProductDeleted(ProductDeletedEvent { product_id });
        assert_eq!(event.subject_id(), product_id);
        assert_eq!(event.event_type(), PRODUCT_DELETED);
    }
}
