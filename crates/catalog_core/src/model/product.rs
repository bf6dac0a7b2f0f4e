//! Product domain model.
//!
//! # Responsibility
//! - Define the parent row owning variants and options.
//! - Derive URL handles from titles when none is supplied.
//!
//! # Invariants
//! - `handle` is unique among live products.
//! - `variants` are ordered by `variant_rank ASC` when loaded.

use super::option::ProductOption;
use super::variant::ProductVariant;
use super::{ensure_title, Metadata, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable product identifier.
pub type ProductId = Uuid;

static HANDLE_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("valid handle separator regex"));

/// Stored product row with optionally loaded child collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    /// URL-safe unique slug.
    pub handle: String,
    pub description: Option<String>,
    pub metadata: Option<Metadata>,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
    /// Soft-delete marker. `None` means live.
    pub deleted_at: Option<i64>,
    /// Loaded only when the `variants` relation is requested.
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
    /// Loaded only when the `options` relation is requested.
    #[serde(default)]
    pub options: Vec<ProductOption>,
}

impl Product {
    /// Returns whether this product is live (not soft-deleted).
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Input for product creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub title: String,
    /// Derived from `title` when absent.
    pub handle: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<Metadata>,
}

impl CreateProduct {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial product update; `None` fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub id: ProductId,
    pub title: Option<String>,
    pub handle: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<Metadata>,
}

impl UpdateProduct {
    pub fn new(id: ProductId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

/// Builds a new product row from create input.
///
/// Pure: no storage access. Relations start empty.
pub fn build_product(data: CreateProduct, now: i64) -> Result<Product, ValidationError> {
    ensure_title("product", &data.title)?;
    let id = Uuid::new_v4();
    let handle = match data.handle {
        Some(handle) => normalize_handle(&handle)?,
        // Titles made only of separators still get a unique handle.
        None => normalize_handle(&data.title)
            .unwrap_or_else(|_| format!("product-{}", id.simple())),
    };

    Ok(Product {
        id,
        title: data.title.trim().to_string(),
        handle,
        description: data.description,
        metadata: data.metadata,
        created_at: now,
        updated_at: now,
        deleted_at: None,
        variants: Vec::new(),
        options: Vec::new(),
    })
}

/// Merges update input into a stored product.
pub fn merge_product(
    product: &mut Product,
    update: UpdateProduct,
    now: i64,
) -> Result<(), ValidationError> {
    if let Some(title) = update.title {
        ensure_title("product", &title)?;
        product.title = title.trim().to_string();
    }
    if let Some(handle) = update.handle {
        product.handle = normalize_handle(&handle)?;
    }
    if let Some(description) = update.description {
        product.description = Some(description);
    }
    if let Some(metadata) = update.metadata {
        product.metadata = Some(metadata);
    }
    product.updated_at = now;
    Ok(())
}

/// Lowercases and kebab-cases free text into a handle.
///
/// Letters and digits of any script are kept: `"Winter Jacket (2024)"` becomes
/// `"winter-jacket-2024"` and `"Café Crème"` becomes `"café-crème"`.
pub fn normalize_handle(value: &str) -> Result<String, ValidationError> {
    let lowered = value.trim().to_lowercase();
    let handle = HANDLE_SEPARATOR_RE
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string();
    if handle.is_empty() {
        return Err(ValidationError::BlankHandle);
    }
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::{build_product, merge_product, normalize_handle, CreateProduct, UpdateProduct};
    use crate::model::ValidationError;

    #[test]
    fn normalize_handle_kebab_cases_free_text() {
        assert_eq!(
            normalize_handle("  Winter Jacket (2024) ").unwrap(),
            "winter-jacket-2024"
        );
        assert_eq!(normalize_handle("already-a-handle").unwrap(), "already-a-handle");
    }

    #[test]
    fn normalize_handle_keeps_non_ascii_letters() {
        assert_eq!(normalize_handle("Café").unwrap(), "café");
        assert_eq!(normalize_handle("商品 セット").unwrap(), "商品-セット");
    }

    #[test]
    fn build_product_falls_back_to_id_handle_for_symbol_only_title() {
        let product = build_product(CreateProduct::new("***"), 0).unwrap();
        assert_eq!(product.handle, format!("product-{}", product.id.simple()));

        let mut explicit = CreateProduct::new("***");
        explicit.handle = Some("---".to_string());
        assert_eq!(
            build_product(explicit, 0).unwrap_err(),
            ValidationError::BlankHandle
        );
    }

    #[test]
    fn normalize_handle_rejects_symbol_only_input() {
        assert_eq!(normalize_handle("***"), Err(ValidationError::BlankHandle));
    }

    #[test]
    fn build_product_derives_handle_from_title() {
        let product = build_product(CreateProduct::new("Blue Shirt"), 42).unwrap();
        assert_eq!(product.handle, "blue-shirt");
        assert_eq!(product.created_at, 42);
        assert_eq!(product.updated_at, 42);
        assert!(product.is_active());
        assert!(product.variants.is_empty());
    }

    #[test]
    fn build_product_rejects_blank_title() {
        let err = build_product(CreateProduct::new("   "), 0).unwrap_err();
        assert_eq!(err, ValidationError::BlankTitle { entity: "product" });
    }

    #[test]
    fn merge_product_keeps_unset_fields() {
        let mut product = build_product(CreateProduct::new("Mug"), 1).unwrap();
        let mut update = UpdateProduct::new(product.id);
        update.description = Some("ceramic".to_string());
        merge_product(&mut product, update, 5).unwrap();

        assert_eq!(product.title, "Mug");
        assert_eq!(product.handle, "mug");
        assert_eq!(product.description.as_deref(), Some("ceramic"));
        assert_eq!(product.updated_at, 5);
        assert_eq!(product.created_at, 1);
    }
}
