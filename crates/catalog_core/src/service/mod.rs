//! Catalog use-case services.
//!
//! # Responsibility
//! - Orchestrate store calls into catalog use-cases (parent resolution,
//!   rank assignment, cascading lifecycle).
//! - Run every write in exactly one transaction, reusing the caller's.
//!
//! # Invariants
//! - A service never opens a nested transaction while an ambient one exists.
//! - Parent resolution by id is strict: a missing product is `NotFound`.

use crate::config::RepositoryConfig;
use crate::db::{Database, TransactionContext};
use crate::model::product::{Product, ProductId};
use crate::repo::option_repo::SqliteOptionRepository;
use crate::repo::product_repo::SqliteProductRepository;
use crate::repo::query::{build_query, Condition, FindConfig, Filterable};
use crate::repo::variant_repo::SqliteVariantRepository;
use crate::repo::{EntityStore, RepoError, RepoResult};
use log::{info, warn};
use std::time::Instant;
use uuid::Uuid;

pub mod option_service;
pub mod product_service;
pub mod variant_service;

pub use option_service::ProductOptionService;
pub use product_service::ProductService;
pub use variant_service::ProductVariantService;

/// Parent product supplied either by id or as an already loaded entity.
#[derive(Debug, Clone, Copy)]
pub enum ParentRef<'a> {
    /// Resolved through the product service; missing ids fail with `NotFound`.
    Id(ProductId),
    /// Used as-is, including its loaded `variants` for rank computation.
    Loaded(&'a Product),
}

impl From<ProductId> for ParentRef<'_> {
    fn from(value: ProductId) -> Self {
        Self::Id(value)
    }
}

impl<'a> From<&'a Product> for ParentRef<'a> {
    fn from(value: &'a Product) -> Self {
        Self::Loaded(value)
    }
}

/// SQLite-backed service set sharing one database handle.
pub struct CatalogServices<'db> {
    pub products: ProductService<SqliteProductRepository<'db>>,
    pub variants: ProductVariantService<SqliteVariantRepository<'db>, SqliteProductRepository<'db>>,
    pub options: ProductOptionService<SqliteOptionRepository<'db>, SqliteProductRepository<'db>>,
}

impl<'db> CatalogServices<'db> {
    pub fn sqlite(db: &'db Database, config: &RepositoryConfig) -> Self {
        let product_store = || SqliteProductRepository::new(db, config.clone());
        Self {
            products: ProductService::new(product_store()),
            variants: ProductVariantService::new(
                SqliteVariantRepository::new(db, config.clone()),
                ProductService::new(product_store()),
            ),
            options: ProductOptionService::new(
                SqliteOptionRepository::new(db, config.clone()),
                ProductService::new(product_store()),
            ),
        }
    }
}

struct IdFilter(Uuid);

impl Filterable for IdFilter {
    fn conditions(&self) -> Vec<Condition> {
        vec![Condition::ids_in("id", &[self.0])]
    }
}

/// Fetches one live row by id, honoring requested relations.
pub(crate) fn retrieve_entity<T, S: EntityStore<T>>(
    store: &S,
    id: Uuid,
    config: &FindConfig,
    ctx: Option<&mut TransactionContext<'_>>,
) -> RepoResult<T> {
    let mut options = build_query(store.schema(), &IdFilter(id), config, store.config())?;
    options.limit = None;
    options.offset = 0;
    store
        .find(&options, ctx)?
        .into_iter()
        .next()
        .ok_or(RepoError::NotFound {
            entity: store.schema().name,
            id,
        })
}

pub(crate) fn list_entities<T, S: EntityStore<T>, F: Filterable>(
    store: &S,
    filters: &F,
    config: &FindConfig,
    ctx: Option<&mut TransactionContext<'_>>,
) -> RepoResult<Vec<T>> {
    let options = build_query(store.schema(), filters, config, store.config())?;
    store.find(&options, ctx)
}

pub(crate) fn list_and_count_entities<T, S: EntityStore<T>, F: Filterable>(
    store: &S,
    filters: &F,
    config: &FindConfig,
    ctx: Option<&mut TransactionContext<'_>>,
) -> RepoResult<(Vec<T>, u64)> {
    let options = build_query(store.schema(), filters, config, store.config())?;
    store.find_and_count(&options, ctx)
}

/// Emits one `event=<name> module=service` line for a finished write.
pub(crate) fn log_write<T>(
    event: &str,
    requested: usize,
    started_at: Instant,
    result: &RepoResult<T>,
) {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(_) => info!(
            "event={event} module=service status=ok count={requested} duration_ms={duration_ms}"
        ),
        Err(err) => warn!(
            "event={event} module=service status=error count={requested} duration_ms={duration_ms} error_kind={:?}",
            err.kind()
        ),
    }
}
