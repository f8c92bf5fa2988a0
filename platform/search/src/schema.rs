//! Index settings and field mappings for the product index.
//!
//! Mapping intent, matching how the documents are queried:
//! - keyword for exact-match fields (ids, skus, slugs) for fast filtering
//! - text + keyword subfield where a full-text field also sorts/aggregates
//! - nested for the variants array, so "price < X AND in_stock" matches
//!   within one variant instead of leaking across variants
//! - scaled_float (factor 100) for prices: two decimal places, compact
//! - `index: false` on display-only fields (image urls, variant
//!   descriptions) to keep the index small
//! - completion field backing autocomplete

use serde_json::{json, Value};

/// Name of the product index. One per deployment.
pub const INDEX_NAME: &str = "productindexdocument";

/// Tunable index-level settings.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    /// Primary shard count. Size shards to 20-50GB each.
    pub number_of_shards: u32,
    /// Replica count; raise for read throughput and availability.
    pub number_of_replicas: u32,
    /// Refresh interval; longer favors indexing throughput over
    /// search-visible latency.
    pub refresh_interval: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            number_of_shards: 3,
            number_of_replicas: 1,
            refresh_interval: "30s".to_string(),
        }
    }
}

fn image_properties() -> Value {
    json!({
        "properties": {
            "url": { "type": "keyword", "index": false },
            "alt": { "type": "text", "index": false },
            "sort_order": { "type": "integer", "index": false }
        }
    })
}

/// Build the create-index request body: settings plus explicit mappings.
pub fn index_body(settings: &IndexSettings) -> Value {
    json!({
        "settings": {
            "number_of_shards": settings.number_of_shards,
            "number_of_replicas": settings.number_of_replicas,
            "refresh_interval": settings.refresh_interval
        },
        "mappings": {
            "properties": {
                "product_id": { "type": "keyword" },
                "slug": { "type": "keyword" },

                "name": {
                    "type": "text",
                    "fields": {
                        "keyword": { "type": "keyword", "ignore_above": 256 }
                    }
                },
                "description": { "type": "text" },

                "brand_id": { "type": "keyword" },
                "brand_name": {
                    "type": "text",
                    "fields": { "keyword": { "type": "keyword" } }
                },

                "category_id": { "type": "keyword" },
                "category_name": {
                    "type": "text",
                    "fields": { "keyword": { "type": "keyword" } }
                },
                "category_slug": { "type": "keyword" },
                "category_path": { "type": "keyword" },

                "group_ids": { "type": "keyword" },
                "group_names": { "type": "keyword" },

                "images": image_properties(),

                "price_min": { "type": "scaled_float", "scaling_factor": 100 },
                "in_stock": { "type": "boolean" },
                "variant_count": { "type": "integer", "index": false },

                "dimensions": {
                    "properties": {
                        "dimension_id": { "type": "keyword" },
                        "name": { "type": "keyword" },
                        "display_type": { "type": "keyword" }
                    }
                },

                "variants": {
                    "type": "nested",
                    "properties": {
                        "variant_id": { "type": "keyword" },
                        "sku": { "type": "keyword" },
                        "barcode": { "type": "keyword" },
                        "price": { "type": "scaled_float", "scaling_factor": 100 },
                        "in_stock": { "type": "boolean" },
                        "is_active": { "type": "boolean" },
                        "created_at": { "type": "date", "index": false },
                        "updated_at": { "type": "date" },
                        "description": { "type": "text", "index": false },
                        "dimensions": {
                            "type": "nested",
                            "properties": {
                                "dimension_id": { "type": "keyword" },
                                "value": { "type": "keyword" },
                                "display_value": { "type": "keyword", "index": false }
                            }
                        },
                        "dims_flat": { "type": "flattened" },
                        "images": image_properties()
                    }
                },

                "primary_variant": {
                    "properties": {
                        "variant_id": { "type": "keyword" },
                        "price": { "type": "scaled_float", "scaling_factor": 100 },
                        "in_stock": { "type": "boolean" }
                    }
                },

                "is_active": { "type": "boolean" },
                "created_at": { "type": "date", "index": false },
                "updated_at": { "type": "date" },

                "suggest": { "type": "completion" }
            }
        }
    })
}
