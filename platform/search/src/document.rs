//! The denormalized search document, one per product.
//!
//! Field names match the index mapping in [`crate::schema`] (snake_case on
//! the wire). The document id in the index is the product id, so indexing
//! the same product twice is an upsert, not a duplicate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSearchDocument {
    pub product_id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,

    pub brand_id: Uuid,
    pub brand_name: String,

    /// Leaf of the category ancestry; `None` for uncategorized products.
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub category_slug: Option<String>,
    /// Ancestry slugs root→leaf joined with `/`; empty when uncategorized.
    pub category_path: String,

    pub group_ids: Vec<Uuid>,
    pub group_names: Vec<String>,

    pub images: Vec<ImageDocument>,
    pub dimensions: Vec<DimensionDocument>,
    pub variants: Vec<VariantDocument>,

    // Rollups: always recomputed from `variants` in the same mapping
    // pass, never carried over from a previous document.
    pub price_min: Option<Decimal>,
    pub in_stock: bool,
    pub variant_count: i32,
    pub primary_variant: Option<PrimaryVariantDocument>,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub suggest: SuggestDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDocument {
    pub url: String,
    pub alt: Option<String>,
    pub sort_order: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionDocument {
    pub dimension_id: String,
    pub name: String,
    pub display_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDocument {
    pub variant_id: Uuid,
    pub sku: String,
    pub barcode: Option<String>,
    pub price: Decimal,
    pub in_stock: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub description: Option<String>,
    pub dimensions: Vec<VariantDimensionDocument>,
    /// dimension_id → value, sorted for deterministic serialization.
    pub dims_flat: BTreeMap<String, String>,
    pub images: Vec<ImageDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDimensionDocument {
    pub dimension_id: String,
    pub value: String,
    /// Human-readable value resolved from the product's dimension
    /// definitions; `None` when the value is not declared there.
    pub display_value: Option<String>,
}

/// Quick-access projection of the variant a product page shows first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryVariantDocument {
    pub variant_id: Uuid,
    pub price: Decimal,
    pub in_stock: bool,
}

/// Completion-suggester input for autocomplete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestDocument {
    pub input: Vec<String>,
}
