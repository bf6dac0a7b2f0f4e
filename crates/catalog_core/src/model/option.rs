//! Product option domain model.

use super::product::{Product, ProductId};
use super::{ensure_title, Metadata, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable option identifier.
pub type OptionId = Uuid;

/// Stored option row (for example "Size" or "Color").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductOption {
    pub id: OptionId,
    /// Nullable owner; set only if the product existed at write time.
    pub product_id: Option<ProductId>,
    pub title: String,
    pub metadata: Option<Metadata>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
    /// Loaded only when the `product` relation is requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<Box<Product>>,
}

impl ProductOption {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Input for option creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProductOption {
    pub product_id: Option<ProductId>,
    pub title: String,
    pub metadata: Option<Metadata>,
}

impl CreateProductOption {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn for_product(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }
}

/// Partial option update matched to a stored row by `id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProductOption {
    pub id: OptionId,
    pub product_id: Option<ProductId>,
    pub title: Option<String>,
    pub metadata: Option<Metadata>,
}

impl UpdateProductOption {
    pub fn new(id: OptionId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

pub fn build_option(
    data: CreateProductOption,
    product_id: Option<ProductId>,
    now: i64,
) -> Result<ProductOption, ValidationError> {
    ensure_title("option", &data.title)?;
    Ok(ProductOption {
        id: Uuid::new_v4(),
        product_id,
        title: data.title.trim().to_string(),
        metadata: data.metadata,
        created_at: now,
        updated_at: now,
        deleted_at: None,
        product: None,
    })
}

pub fn merge_option(
    option: &mut ProductOption,
    update: UpdateProductOption,
    now: i64,
) -> Result<(), ValidationError> {
    if let Some(title) = update.title {
        ensure_title("option", &title)?;
        option.title = title.trim().to_string();
    }
    if let Some(product_id) = update.product_id {
        option.product_id = Some(product_id);
    }
    if let Some(metadata) = update.metadata {
        option.metadata = Some(metadata);
    }
    option.product = None;
    option.updated_at = now;
    Ok(())
}
