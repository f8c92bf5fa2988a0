//! # Catalog Integration Events
//!
//! The closed set of events the product catalog emits, plus the snapshot
//! types embedded in their payloads.
//!
//! Payloads are *complete* snapshots: everything the search sync service
//! needs to rebuild a search document is inside the event, so consumers
//! never read the catalog database. That property is what makes re-indexing
//! after an at-least-once redelivery safe.
//!
//! Decoding is an explicit discriminator lookup ([`CatalogEvent::from_envelope`]),
//! not trait-object downcasting: unknown discriminators decode to `None` so
//! old consumers tolerate new event types.

pub mod events;
pub mod models;

pub use events::{
    CatalogEvent, EventDecodeError, ProductCreatedEvent, ProductDeletedEvent, ProductUpdatedEvent,
    PRODUCT_CREATED, PRODUCT_DELETED, PRODUCT_UPDATED,
};
pub use models::{
    BrandInfo, CategoryInfo, DimensionInfo, DimensionValueInfo, GroupInfo, ImageInfo,
    ProductSnapshot, VariantDimensionValueInfo, VariantInfo,
};
