//! Product variant domain model.
//!
//! # Responsibility
//! - Define the ranked child row of a product.
//! - Provide the pure build/merge steps used by the variant store.
//!
//! # Invariants
//! - `variant_rank` is zero-based and never negative.
//! - `sku`, when set, is unique among live variants.

use super::product::{Product, ProductId};
use super::{ensure_title, Metadata, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable variant identifier.
pub type VariantId = Uuid;

/// Stored variant row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: VariantId,
    /// Owning product; set only from a product that existed at write time.
    pub product_id: Option<ProductId>,
    pub title: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    /// Display/processing order within the owning product.
    pub variant_rank: i64,
    pub metadata: Option<Metadata>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
    /// Loaded only when the `product` relation is requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<Box<Product>>,
}

impl ProductVariant {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Input for variant creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProductVariant {
    /// Overwritten by the variant service with the resolved product.
    pub product_id: Option<ProductId>,
    pub title: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    /// Overwritten by the variant service; defaults to 0 at store level.
    pub variant_rank: Option<i64>,
    pub metadata: Option<Metadata>,
}

impl CreateProductVariant {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }
}

/// Partial variant update matched to a stored row by `id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProductVariant {
    pub id: VariantId,
    pub product_id: Option<ProductId>,
    pub title: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub variant_rank: Option<i64>,
    pub metadata: Option<Metadata>,
}

impl UpdateProductVariant {
    pub fn new(id: VariantId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

/// Builds a new variant row. `product_id` must already be resolved.
pub fn build_variant(
    data: CreateProductVariant,
    product_id: Option<ProductId>,
    now: i64,
) -> Result<ProductVariant, ValidationError> {
    ensure_title("variant", &data.title)?;
    let variant_rank = data.variant_rank.unwrap_or(0);
    if variant_rank < 0 {
        return Err(ValidationError::NegativeRank(variant_rank));
    }

    Ok(ProductVariant {
        id: Uuid::new_v4(),
        product_id,
        title: data.title.trim().to_string(),
        sku: data.sku,
        barcode: data.barcode,
        variant_rank,
        metadata: data.metadata,
        created_at: now,
        updated_at: now,
        deleted_at: None,
        product: None,
    })
}

/// Merges update input into a stored variant, field by field.
///
/// `update.product_id` must already be resolved; `None` keeps the stored owner.
pub fn merge_variant(
    variant: &mut ProductVariant,
    update: UpdateProductVariant,
    now: i64,
) -> Result<(), ValidationError> {
    if let Some(title) = update.title {
        ensure_title("variant", &title)?;
        variant.title = title.trim().to_string();
    }
    if let Some(rank) = update.variant_rank {
        if rank < 0 {
            return Err(ValidationError::NegativeRank(rank));
        }
        variant.variant_rank = rank;
    }
    if let Some(product_id) = update.product_id {
        variant.product_id = Some(product_id);
    }
    if let Some(sku) = update.sku {
        variant.sku = Some(sku);
    }
    if let Some(barcode) = update.barcode {
        variant.barcode = Some(barcode);
    }
    if let Some(metadata) = update.metadata {
        variant.metadata = Some(metadata);
    }
    variant.product = None;
    variant.updated_at = now;
    Ok(())
}
