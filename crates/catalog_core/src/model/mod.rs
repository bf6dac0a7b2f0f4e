//! Catalog domain model: products and their ordered child collections.
//!
//! # Responsibility
//! - Define stored row shapes and the create/update input shapes for them.
//! - Keep field-by-field merge rules next to the types they mutate.
//!
//! # Invariants
//! - Every row is identified by a stable UUID that is never reused.
//! - `deleted_at` is the single source of truth for soft-delete state.
//! - `variant_rank` is zero-based and unique among all of a product's stored variants.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod option;
pub mod product;
pub mod variant;

/// Free-form JSON attributes attached to any catalog row.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Input rejected before any storage access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Title is empty after trimming.
    BlankTitle { entity: &'static str },
    /// Explicit handle is empty after normalization.
    BlankHandle,
    /// Rank values are zero-based.
    NegativeRank(i64),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle { entity } => write!(f, "{entity} title must not be blank"),
            Self::BlankHandle => write!(f, "product handle must not be blank"),
            Self::NegativeRank(rank) => write!(f, "variant rank must be >= 0, got {rank}"),
        }
    }
}

impl Error for ValidationError {}

pub(crate) fn ensure_title(entity: &'static str, title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::BlankTitle { entity });
    }
    Ok(())
}
