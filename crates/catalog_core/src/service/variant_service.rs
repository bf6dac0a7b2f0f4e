//! Product variant use-case service.
//!
//! # Responsibility
//! - Resolve the parent product for variant writes.
//! - Assign `variant_rank` to created variants.
//!
//! # Invariants
//! - A create batch of N variants on a product with C stored variants gets
//!   ranks `C..C+N` in input order. Soft-deleted variants count towards C so
//!   a later restore cannot duplicate a rank.
//! - Update never recomputes rank.
//! - The parent lookup, rank count and staging share one transaction.

use super::{
    list_and_count_entities, list_entities, log_write, retrieve_entity, ParentRef, ProductService,
};
use crate::db::{with_transaction, TransactionContext};
use crate::model::product::ProductId;
use crate::model::variant::{
    CreateProductVariant, ProductVariant, UpdateProductVariant, VariantId,
};
use crate::repo::query::{Condition, FindConfig, FindOptions};
use crate::repo::variant_repo::VariantFilters;
use crate::repo::{ProductStore, RepoResult, RestoredRelations, VariantStore};
use std::time::Instant;

/// Variant service facade over a variant store and the product service.
pub struct ProductVariantService<V: VariantStore, P: ProductStore> {
    store: V,
    products: ProductService<P>,
}

impl<V: VariantStore, P: ProductStore> ProductVariantService<V, P> {
    pub fn new(store: V, products: ProductService<P>) -> Self {
        Self { store, products }
    }

    pub fn store(&self) -> &V {
        &self.store
    }

    /// Loads one live variant; fails with `NotFound` when absent.
    pub fn retrieve(
        &self,
        id: VariantId,
        config: &FindConfig,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<ProductVariant> {
        retrieve_entity(&self.store, id, config, ctx)
    }

    pub fn list(
        &self,
        filters: &VariantFilters,
        config: &FindConfig,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Vec<ProductVariant>> {
        list_entities(&self.store, filters, config, ctx)
    }

    pub fn list_and_count(
        &self,
        filters: &VariantFilters,
        config: &FindConfig,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<(Vec<ProductVariant>, u64)> {
        list_and_count_entities(&self.store, filters, config, ctx)
    }

    /// Creates variants under `parent`, appending them after its current
    /// variants.
    pub fn create(
        &self,
        parent: ParentRef<'_>,
        data: Vec<CreateProductVariant>,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Vec<ProductVariant>> {
        let started_at = Instant::now();
        let requested = data.len();
        let result = with_transaction(self.store.database(), ctx, |tx| {
            let (product_id, current) = self.resolve_parent(parent, tx)?;
            let data = assign_variant_ranks(data, product_id, current);
            self.store.create(data, Some(tx))
        });
        log_write("variant_create", requested, started_at, &result);
        result
    }

    /// Updates variants, attaching every item to `parent`.
    pub fn update(
        &self,
        parent: ParentRef<'_>,
        mut data: Vec<UpdateProductVariant>,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Vec<ProductVariant>> {
        let started_at = Instant::now();
        let requested = data.len();
        let result = with_transaction(self.store.database(), ctx, |tx| {
            let (product_id, _) = self.resolve_parent(parent, tx)?;
            for item in &mut data {
                item.product_id = Some(product_id);
            }
            self.store.update(data, Some(tx))
        });
        log_write("variant_update", requested, started_at, &result);
        result
    }

    pub fn delete(
        &self,
        ids: &[VariantId],
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<()> {
        let started_at = Instant::now();
        let result = self.store.delete(ids, ctx);
        log_write("variant_delete", ids.len(), started_at, &result);
        result
    }

    pub fn soft_delete(
        &self,
        ids: &[VariantId],
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<()> {
        let started_at = Instant::now();
        let result = self.store.soft_delete(ids, ctx);
        log_write("variant_soft_delete", ids.len(), started_at, &result);
        result
    }

    pub fn restore(
        &self,
        ids: &[VariantId],
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<(Vec<ProductVariant>, RestoredRelations)> {
        let started_at = Instant::now();
        let result = self.store.restore(ids, ctx);
        log_write("variant_restore", ids.len(), started_at, &result);
        result
    }

    /// Returns the parent id and the first free rank under it.
    fn resolve_parent(
        &self,
        parent: ParentRef<'_>,
        tx: &mut TransactionContext<'_>,
    ) -> RepoResult<(ProductId, usize)> {
        match parent {
            ParentRef::Loaded(product) => Ok((product.id, product.variants.len())),
            ParentRef::Id(id) => {
                let product = self
                    .products
                    .retrieve(id, &FindConfig::default(), Some(&mut *tx))?;
                let stored = self.store.find(
                    &FindOptions {
                        conditions: vec![Condition::ids_in("product_id", &[product.id])],
                        ..FindOptions::default()
                    }
                    .with_deleted(),
                    Some(tx),
                )?;
                Ok((product.id, next_variant_rank(&stored)))
            }
        }
    }
}

/// Counts every stored variant, live or soft-deleted, and never returns a
/// rank already taken when earlier hard deletes left gaps.
pub fn next_variant_rank(stored: &[ProductVariant]) -> usize {
    let after_highest = stored
        .iter()
        .map(|variant| variant.variant_rank.max(0) as usize + 1)
        .max()
        .unwrap_or(0);
    stored.len().max(after_highest)
}

/// Sets owner and `variant_rank = start, start + 1, ...` in input order.
pub fn assign_variant_ranks(
    data: Vec<CreateProductVariant>,
    product_id: ProductId,
    start: usize,
) -> Vec<CreateProductVariant> {
    data.into_iter()
        .enumerate()
        .map(|(offset, mut item)| {
            item.product_id = Some(product_id);
            item.variant_rank = Some((start + offset) as i64);
            item
        })
        .collect()
}
