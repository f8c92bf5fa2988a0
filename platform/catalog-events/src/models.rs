//! Snapshot types embedded in catalog event payloads.
//!
//! These mirror the catalog's normalized entities but are denormalized into
//! one self-contained tree per product. They are owned by the event payload;
//! the search document types in `platform/search` are derived from them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Full denormalized snapshot of a product at the moment an event occurred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub name: String,
    pub url_slug: String,
    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub brand: BrandInfo,
    /// Category ancestry, root first, leaf last. Empty for uncategorized
    /// products.
    #[serde(default)]
    pub path: Vec<CategoryInfo>,
    #[serde(default)]
    pub groups: Vec<GroupInfo>,
    #[serde(default)]
    pub dimensions: Vec<DimensionInfo>,
    #[serde(default)]
    pub variants: Vec<VariantInfo>,
    #[serde(default)]
    pub images: Vec<ImageInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandInfo {
    pub brand_id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub category_id: Uuid,
    pub name: String,
    pub url_slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupInfo {
    pub group_id: Uuid,
    pub name: String,
}

/// A product-level dimension (e.g. "Color") and the values it can take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionInfo {
    pub dimension_id: String,
    pub name: String,
    pub display_type: String,
    #[serde(default)]
    pub values: Vec<DimensionValueInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionValueInfo {
    pub value: String,
    pub display_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantInfo {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_active: bool,
    pub in_stock: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Which dimension value this variant holds, by raw value; display
    /// values are resolved against [`ProductSnapshot::dimensions`] at
    /// mapping time.
    #[serde(default)]
    pub dimension_values: Vec<VariantDimensionValueInfo>,
    #[serde(default)]
    pub images: Vec<ImageInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantDimensionValueInfo {
    pub dimension_id: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInfo {
    pub image_id: Uuid,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    pub sort_order: i32,
}
