//! Product option use-case service.

use super::{
    list_and_count_entities, list_entities, log_write, retrieve_entity, ParentRef, ProductService,
};
use crate::db::{with_transaction, TransactionContext};
use crate::model::option::{CreateProductOption, OptionId, ProductOption, UpdateProductOption};
use crate::repo::option_repo::OptionFilters;
use crate::repo::query::FindConfig;
use crate::repo::{OptionStore, ProductStore, RepoResult, RestoredRelations};
use std::time::Instant;

/// Option service facade; parent resolution by id is strict.
pub struct ProductOptionService<O: OptionStore, P: ProductStore> {
    store: O,
    products: ProductService<P>,
}

impl<O: OptionStore, P: ProductStore> ProductOptionService<O, P> {
    pub fn new(store: O, products: ProductService<P>) -> Self {
        Self { store, products }
    }

    pub fn store(&self) -> &O {
        &self.store
    }

    pub fn retrieve(
        &self,
        id: OptionId,
        config: &FindConfig,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<ProductOption> {
        retrieve_entity(&self.store, id, config, ctx)
    }

    pub fn list(
        &self,
        filters: &OptionFilters,
        config: &FindConfig,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Vec<ProductOption>> {
        list_entities(&self.store, filters, config, ctx)
    }

    pub fn list_and_count(
        &self,
        filters: &OptionFilters,
        config: &FindConfig,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<(Vec<ProductOption>, u64)> {
        list_and_count_entities(&self.store, filters, config, ctx)
    }

    /// Creates options owned by `parent`.
    pub fn create(
        &self,
        parent: ParentRef<'_>,
        mut data: Vec<CreateProductOption>,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Vec<ProductOption>> {
        let started_at = Instant::now();
        let requested = data.len();
        let result = with_transaction(self.store.database(), ctx, |tx| {
            let product_id = match parent {
                ParentRef::Loaded(product) => product.id,
                ParentRef::Id(id) => {
                    self.products
                        .retrieve(id, &FindConfig::default(), Some(&mut *tx))?
                        .id
                }
            };
            for item in &mut data {
                item.product_id = Some(product_id);
            }
            self.store.create(data, Some(tx))
        });
        log_write("option_create", requested, started_at, &result);
        result
    }

    /// Merges updates by id; any unknown id fails the whole batch.
    pub fn update(
        &self,
        data: Vec<UpdateProductOption>,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Vec<ProductOption>> {
        let started_at = Instant::now();
        let requested = data.len();
        let result = self.store.update(data, ctx);
        log_write("option_update", requested, started_at, &result);
        result
    }

    pub fn delete(
        &self,
        ids: &[OptionId],
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<()> {
        let started_at = Instant::now();
        let result = self.store.delete(ids, ctx);
        log_write("option_delete", ids.len(), started_at, &result);
        result
    }

    pub fn soft_delete(
        &self,
        ids: &[OptionId],
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<()> {
        let started_at = Instant::now();
        let result = self.store.soft_delete(ids, ctx);
        log_write("option_soft_delete", ids.len(), started_at, &result);
        result
    }

    pub fn restore(
        &self,
        ids: &[OptionId],
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<(Vec<ProductOption>, RestoredRelations)> {
        let started_at = Instant::now();
        let result = self.store.restore(ids, ctx);
        log_write("option_restore", ids.len(), started_at, &result);
        result
    }
}
