//! Pure event → document transform.
//!
//! No I/O, no clock, no randomness: mapping the same event twice yields
//! byte-for-byte identical documents, which is the basis for safe
//! re-indexing after an at-least-once redelivery.
//!
//! Every field copy is explicit (no convention-based reflection) so the
//! projection stays auditable field by field.

use std::collections::{BTreeMap, HashMap};

use catalog_events::{
    ProductCreatedEvent, ProductSnapshot, ProductUpdatedEvent, VariantInfo,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::document::{
    DimensionDocument, ImageDocument, PrimaryVariantDocument, ProductSearchDocument,
    SuggestDocument, VariantDimensionDocument, VariantDocument,
};

/// Map a creation event to its search document.
pub fn map_product_created(event: &ProductCreatedEvent) -> ProductSearchDocument {
    map_snapshot(event.product_id, &event.product)
}

/// Map an update event. Same transform as a create: the document is fully
/// replaced either way.
pub fn map_product_updated(event: &ProductUpdatedEvent) -> ProductSearchDocument {
    map_snapshot(event.product_id, &event.product)
}

fn map_snapshot(product_id: Uuid, product: &ProductSnapshot) -> ProductSearchDocument {
    // Category identity comes from the leaf (last) ancestry entry; the
    // path is every slug root→leaf.
    let leaf = product.path.last();
    let category_path = product
        .path
        .iter()
        .map(|c| c.url_slug.as_str())
        .collect::<Vec<_>>()
        .join("/");

    // dimension_id → (value → display_value), used to resolve the
    // human-readable form of each variant's dimension values.
    let display_values: HashMap<&str, HashMap<&str, &str>> = product
        .dimensions
        .iter()
        .map(|d| {
            let values = d
                .values
                .iter()
                .map(|v| (v.value.as_str(), v.display_value.as_str()))
                .collect();
            (d.dimension_id.as_str(), values)
        })
        .collect();

    let variants: Vec<VariantDocument> = product
        .variants
        .iter()
        .map(|v| map_variant(v, &display_values))
        .collect();

    ProductSearchDocument {
        product_id,
        slug: product.url_slug.clone(),
        name: product.name.clone(),
        description: product.description.clone(),

        brand_id: product.brand.brand_id,
        brand_name: product.brand.name.clone(),

        category_id: leaf.map(|c| c.category_id),
        category_name: leaf.map(|c| c.name.clone()),
        category_slug: leaf.map(|c| c.url_slug.clone()),
        category_path,

        group_ids: product.groups.iter().map(|g| g.group_id).collect(),
        group_names: product.groups.iter().map(|g| g.name.clone()).collect(),

        images: product.images.iter().map(map_image).collect(),
        dimensions: product
            .dimensions
            .iter()
            .map(|d| DimensionDocument {
                dimension_id: d.dimension_id.clone(),
                name: d.name.clone(),
                display_type: d.display_type.clone(),
            })
            .collect(),

        price_min: price_min(&product.variants),
        in_stock: product.variants.iter().any(|v| v.in_stock),
        variant_count: product.variants.len() as i32,
        primary_variant: select_primary_variant(&product.variants),

        variants,

        is_active: product.is_active,
        created_at: product.created_at,
        updated_at: product.updated_at,

        suggest: SuggestDocument {
            input: vec![product.name.clone(), product.brand.name.clone()],
        },
    }
}

fn map_variant(
    variant: &VariantInfo,
    display_values: &HashMap<&str, HashMap<&str, &str>>,
) -> VariantDocument {
    let dimensions: Vec<VariantDimensionDocument> = variant
        .dimension_values
        .iter()
        .map(|dv| VariantDimensionDocument {
            dimension_id: dv.dimension_id.clone(),
            value: dv.value.clone(),
            display_value: display_values
                .get(dv.dimension_id.as_str())
                .and_then(|values| values.get(dv.value.as_str()))
                .map(|s| (*s).to_string()),
        })
        .collect();

    let dims_flat: BTreeMap<String, String> = variant
        .dimension_values
        .iter()
        .map(|dv| (dv.dimension_id.clone(), dv.value.clone()))
        .collect();

    VariantDocument {
        variant_id: variant.id,
        sku: variant.sku.clone(),
        barcode: variant.barcode.clone(),
        price: variant.price,
        in_stock: variant.in_stock,
        is_active: variant.is_active,
        created_at: variant.created_at,
        updated_at: variant.updated_at,
        description: variant.description.clone(),
        dimensions,
        dims_flat,
        images: variant.images.iter().map(map_image).collect(),
    }
}

fn map_image(image: &catalog_events::ImageInfo) -> ImageDocument {
    ImageDocument {
        url: image.image_url.clone(),
        alt: image.alt_text.clone(),
        sort_order: image.sort_order,
    }
}

/// Lowest price across *all* variants, regardless of stock or active flags.
fn price_min(variants: &[VariantInfo]) -> Option<Decimal> {
    variants.iter().map(|v| v.price).min()
}

/// Pick the variant a product page should lead with.
///
/// Among active variants, prefer in-stock ones; tie-break by lowest price.
/// When nothing is in stock (or nothing is active) fall back to the
/// lowest-priced variant. Only an empty variant list yields `None`.
/// `min_by` keeps the first of equal-priced variants, so selection is
/// stable across identical events.
fn select_primary_variant(variants: &[VariantInfo]) -> Option<PrimaryVariantDocument> {
    if variants.is_empty() {
        return None;
    }

    let active: Vec<&VariantInfo> = variants.iter().filter(|v| v.is_active).collect();
    let pool: Vec<&VariantInfo> = if active.is_empty() {
        variants.iter().collect()
    } else {
        active
    };

    let in_stock: Vec<&VariantInfo> = pool.iter().filter(|v| v.in_stock).copied().collect();
    let candidates = if in_stock.is_empty() { pool } else { in_stock };

    candidates
        .into_iter()
        .min_by(|a, b| a.price.cmp(&b.price))
        .map(|v| PrimaryVariantDocument {
            variant_id: v.id,
            price: v.price,
            in_stock: v.in_stock,
        })
}
