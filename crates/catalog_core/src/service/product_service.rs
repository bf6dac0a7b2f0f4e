//! Product use-case service.
//!
//! # Responsibility
//! - Provide product retrieve/list/create/update APIs.
//! - Own the cascading soft delete/restore of product children.

use super::{list_and_count_entities, list_entities, log_write, retrieve_entity};
use crate::db::{with_transaction, TransactionContext};
use crate::model::product::{CreateProduct, Product, ProductId, UpdateProduct};
use crate::repo::product_repo::ProductFilters;
use crate::repo::query::FindConfig;
use crate::repo::{ProductStore, RepoResult, RestoredRelations};
use std::time::Instant;

/// Product service facade over a product store.
pub struct ProductService<P: ProductStore> {
    store: P,
}

impl<P: ProductStore> ProductService<P> {
    pub fn new(store: P) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    /// Loads one live product; fails with `NotFound` when absent.
    pub fn retrieve(
        &self,
        id: ProductId,
        config: &FindConfig,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Product> {
        retrieve_entity(&self.store, id, config, ctx)
    }

    pub fn list(
        &self,
        filters: &ProductFilters,
        config: &FindConfig,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Vec<Product>> {
        list_entities(&self.store, filters, config, ctx)
    }

    pub fn list_and_count(
        &self,
        filters: &ProductFilters,
        config: &FindConfig,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<(Vec<Product>, u64)> {
        list_and_count_entities(&self.store, filters, config, ctx)
    }

    pub fn create(
        &self,
        data: Vec<CreateProduct>,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Vec<Product>> {
        let started_at = Instant::now();
        let requested = data.len();
        let result = with_transaction(self.store.database(), ctx, |tx| {
            self.store.create(data, Some(tx))
        });
        log_write("product_create", requested, started_at, &result);
        result
    }

    pub fn update(
        &self,
        data: Vec<UpdateProduct>,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Vec<Product>> {
        let started_at = Instant::now();
        let requested = data.len();
        let result = with_transaction(self.store.database(), ctx, |tx| {
            self.store.update(data, Some(tx))
        });
        log_write("product_update", requested, started_at, &result);
        result
    }

    /// Permanently removes products; their children go with them.
    pub fn delete(
        &self,
        ids: &[ProductId],
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<()> {
        let started_at = Instant::now();
        let result = self.store.delete(ids, ctx);
        log_write("product_delete", ids.len(), started_at, &result);
        result
    }

    pub fn soft_delete(
        &self,
        ids: &[ProductId],
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<()> {
        let started_at = Instant::now();
        let result = self.store.soft_delete(ids, ctx);
        log_write("product_soft_delete", ids.len(), started_at, &result);
        result
    }

    /// Restores products and the children removed by their soft delete.
    pub fn restore(
        &self,
        ids: &[ProductId],
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<(Vec<Product>, RestoredRelations)> {
        let started_at = Instant::now();
        let result = self.store.restore(ids, ctx);
        log_write("product_restore", ids.len(), started_at, &result);
        result
    }
}
