//! Product variant store.
//!
//! # Responsibility
//! - Persist ranked variant rows and resolve their product references.
//! - Load the `product` relation in a second select-in pass.
//!
//! # Invariants
//! - Product references are resolved for the whole batch in one query.
//! - Child listing is deterministic: `variant_rank ASC, id ASC`.

use super::product_repo::load_products_by_ids;
use super::query::{
    placeholders, push_ids_filter, push_text_filter, Condition, EntitySchema, Filterable,
    FindOptions, SortDirection,
};
use super::{
    delete_rows, ensure_all_found, id_values, live_product_ids, metadata_to_db, parse_metadata,
    parse_optional_uuid, parse_uuid, query_count, referenced_product_ids,
    resolve_product_reference, restore_rows, soft_delete_rows, EntityStore, RepoResult,
    RestoredRelations,
};
use crate::config::{ReferencePolicy, RepositoryConfig};
use crate::db::{
    now_epoch_ms, with_session, with_transaction, Database, PersistRow, TransactionContext,
};
use crate::model::product::ProductId;
use crate::model::variant::{
    build_variant, merge_variant, CreateProductVariant, ProductVariant, UpdateProductVariant,
    VariantId,
};
use log::debug;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub const VARIANT_SCHEMA: EntitySchema = EntitySchema {
    name: "product_variant",
    table: "product_variants",
    sortable: &[
        "variant_rank",
        "title",
        "sku",
        "product_id",
        "created_at",
        "updated_at",
    ],
    relations: &["product"],
    default_order: &[("variant_rank", SortDirection::Asc)],
};

const VARIANT_COLUMNS: &str = "id, product_id, title, sku, barcode, variant_rank, metadata, \
                               created_at, updated_at, deleted_at";

/// Filters accepted by variant list operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantFilters {
    pub id: Option<Vec<VariantId>>,
    pub product_id: Option<Vec<ProductId>>,
    pub sku: Option<String>,
    pub title: Option<String>,
}

impl Filterable for VariantFilters {
    fn conditions(&self) -> Vec<Condition> {
        let mut conditions = Vec::new();
        push_ids_filter(&mut conditions, "id", self.id.as_ref());
        push_ids_filter(&mut conditions, "product_id", self.product_id.as_ref());
        push_text_filter(&mut conditions, "sku", self.sku.as_ref());
        push_text_filter(&mut conditions, "title", self.title.as_ref());
        conditions
    }
}

/// SQLite-backed variant store.
pub struct SqliteVariantRepository<'db> {
    db: &'db Database,
    config: RepositoryConfig,
}

impl<'db> SqliteVariantRepository<'db> {
    pub fn new(db: &'db Database, config: RepositoryConfig) -> Self {
        Self { db, config }
    }
}

impl EntityStore<ProductVariant> for SqliteVariantRepository<'_> {
    type Create = CreateProductVariant;
    type Update = UpdateProductVariant;

    fn schema(&self) -> &'static EntitySchema {
        &VARIANT_SCHEMA
    }

    fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    fn database(&self) -> &Database {
        self.db
    }

    fn find(
        &self,
        options: &FindOptions,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Vec<ProductVariant>> {
        with_session(self.db, ctx, |conn| load_variants(conn, options))
    }

    fn find_and_count(
        &self,
        options: &FindOptions,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<(Vec<ProductVariant>, u64)> {
        with_session(self.db, ctx, |conn| {
            let variants = load_variants(conn, options)?;
            let count = query_count(conn, options, &VARIANT_SCHEMA)?;
            Ok((variants, count))
        })
    }

    fn create(
        &self,
        data: Vec<CreateProductVariant>,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Vec<ProductVariant>> {
        let policy = self.config.reference_policy;
        with_transaction(self.db, ctx, |tx| {
            let requested = referenced_product_ids(data.iter().map(|item| item.product_id));
            let existing = live_product_ids(tx.session()?, &requested)?;
            let variants = stage_variants(data, &existing, policy, now_epoch_ms())?;

            tx.persist_new(variants.iter().cloned());
            debug!(
                "event=variant_stage module=repo tx_id={} count={}",
                tx.id(),
                variants.len()
            );
            Ok(variants)
        })
    }

    fn update(
        &self,
        data: Vec<UpdateProductVariant>,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Vec<ProductVariant>> {
        let policy = self.config.reference_policy;
        with_transaction(self.db, ctx, |tx| {
            let ids: Vec<VariantId> = data.iter().map(|item| item.id).collect();
            let conn = tx.session()?;
            let mut by_id: HashMap<VariantId, ProductVariant> =
                load_variants(conn, &FindOptions::by_ids(&ids))?
                    .into_iter()
                    .map(|variant| (variant.id, variant))
                    .collect();
            let found: HashSet<VariantId> = by_id.keys().copied().collect();
            ensure_all_found(VARIANT_SCHEMA.name, ids.iter().copied(), &found)?;

            let requested = referenced_product_ids(data.iter().map(|item| item.product_id));
            let existing = live_product_ids(conn, &requested)?;

            let now = now_epoch_ms();
            let mut order = Vec::with_capacity(data.len());
            for mut item in data {
                item.product_id = resolve_product_reference(
                    VARIANT_SCHEMA.name,
                    item.product_id,
                    &existing,
                    policy,
                )?;
                let id = item.id;
                if let Some(variant) = by_id.get_mut(&id) {
                    merge_variant(variant, item, now)?;
                }
                if !order.contains(&id) {
                    order.push(id);
                }
            }

            let updated: Vec<ProductVariant> =
                order.iter().filter_map(|id| by_id.remove(id)).collect();
            tx.persist_changed(updated.iter().cloned());
            Ok(updated)
        })
    }

    fn delete(&self, ids: &[Uuid], ctx: Option<&mut TransactionContext<'_>>) -> RepoResult<()> {
        with_transaction(self.db, ctx, |tx| {
            let removed = delete_rows(tx.session()?, VARIANT_SCHEMA.table, ids)?;
            debug!(
                "event=variant_delete module=repo tx_id={} requested={} removed={removed}",
                tx.id(),
                ids.len()
            );
            Ok(())
        })
    }

    fn soft_delete(
        &self,
        ids: &[Uuid],
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<()> {
        with_transaction(self.db, ctx, |tx| {
            soft_delete_rows(tx.session()?, VARIANT_SCHEMA.table, ids, now_epoch_ms())?;
            Ok(())
        })
    }

    fn restore(
        &self,
        ids: &[Uuid],
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<(Vec<ProductVariant>, RestoredRelations)> {
        with_transaction(self.db, ctx, |tx| {
            let conn = tx.session()?;
            let revived = restore_rows(conn, VARIANT_SCHEMA.table, ids)?;
            let variants = load_variants(conn, &FindOptions::by_ids(&revived))?;
            Ok((variants, RestoredRelations::new()))
        })
    }
}

/// Builds variant rows for a batch against pre-resolved product ids.
///
/// Pure: performs no storage access. Fails the whole batch on the first
/// invalid item, so nothing is staged for a partially valid batch.
pub fn stage_variants(
    data: Vec<CreateProductVariant>,
    existing_products: &HashSet<ProductId>,
    policy: ReferencePolicy,
    now: i64,
) -> RepoResult<Vec<ProductVariant>> {
    data.into_iter()
        .map(|item| -> RepoResult<ProductVariant> {
            let product_id = resolve_product_reference(
                VARIANT_SCHEMA.name,
                item.product_id,
                existing_products,
                policy,
            )?;
            Ok(build_variant(item, product_id, now)?)
        })
        .collect()
}

impl PersistRow for ProductVariant {
    fn table(&self) -> &'static str {
        VARIANT_SCHEMA.table
    }

    fn row_id(&self) -> Uuid {
        self.id
    }

    fn insert_into(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO product_variants (
                id,
                product_id,
                title,
                sku,
                barcode,
                variant_rank,
                metadata,
                created_at,
                updated_at,
                deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                self.id.to_string(),
                self.product_id.map(|value| value.to_string()),
                self.title.as_str(),
                self.sku.as_deref(),
                self.barcode.as_deref(),
                self.variant_rank,
                metadata_to_db(&self.metadata)?,
                self.created_at,
                self.updated_at,
                self.deleted_at,
            ],
        )?;
        Ok(())
    }

    fn update_in(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "UPDATE product_variants
             SET
                product_id = ?2,
                title = ?3,
                sku = ?4,
                barcode = ?5,
                variant_rank = ?6,
                metadata = ?7,
                updated_at = ?8
             WHERE id = ?1;",
            params![
                self.id.to_string(),
                self.product_id.map(|value| value.to_string()),
                self.title.as_str(),
                self.sku.as_deref(),
                self.barcode.as_deref(),
                self.variant_rank,
                metadata_to_db(&self.metadata)?,
                self.updated_at,
            ],
        )?;
        Ok(())
    }
}

fn load_variants(conn: &Connection, options: &FindOptions) -> RepoResult<Vec<ProductVariant>> {
    let (sql, binds) = options.select_sql(&VARIANT_SCHEMA, VARIANT_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(binds))?;
    let mut variants = Vec::new();
    while let Some(row) = rows.next()? {
        variants.push(parse_variant_row(row)?);
    }

    if options.has_relation("product") && !variants.is_empty() {
        let product_ids = referenced_product_ids(variants.iter().map(|item| item.product_id));
        let products = load_products_by_ids(conn, &product_ids, options.with_deleted)?;
        for variant in &mut variants {
            variant.product = variant
                .product_id
                .and_then(|id| products.get(&id).cloned())
                .map(Box::new);
        }
    }

    Ok(variants)
}

/// Loads variants of several products in one query, grouped by product id.
pub(crate) fn load_variants_for_products(
    conn: &Connection,
    product_ids: &[ProductId],
    with_deleted: bool,
) -> RepoResult<HashMap<ProductId, Vec<ProductVariant>>> {
    let mut grouped: HashMap<ProductId, Vec<ProductVariant>> = HashMap::new();
    if product_ids.is_empty() {
        return Ok(grouped);
    }

    let deleted_filter = if with_deleted {
        ""
    } else {
        " AND deleted_at IS NULL"
    };
    let sql = format!(
        "SELECT {VARIANT_COLUMNS}
         FROM product_variants
         WHERE product_id IN ({}){deleted_filter}
         ORDER BY variant_rank ASC, id ASC;",
        placeholders(product_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(id_values(product_ids)))?;
    while let Some(row) = rows.next()? {
        let variant = parse_variant_row(row)?;
        if let Some(product_id) = variant.product_id {
            grouped.entry(product_id).or_default().push(variant);
        }
    }
    Ok(grouped)
}

fn parse_variant_row(row: &Row<'_>) -> RepoResult<ProductVariant> {
    let id_text: String = row.get("id")?;
    Ok(ProductVariant {
        id: parse_uuid(&id_text, "product_variants.id")?,
        product_id: parse_optional_uuid(row.get("product_id")?, "product_variants.product_id")?,
        title: row.get("title")?,
        sku: row.get("sku")?,
        barcode: row.get("barcode")?,
        variant_rank: row.get("variant_rank")?,
        metadata: parse_metadata(row.get("metadata")?, "product_variants.metadata")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
        product: None,
    })
}

#[cfg(test)]
mod tests {
    use super::stage_variants;
    use crate::config::ReferencePolicy;
    use crate::model::variant::CreateProductVariant;
    use crate::repo::RepoError;
    use std::collections::HashSet;
    use uuid::Uuid;

    #[test]
    fn stage_variants_keeps_input_order_and_ranks() {
        let product_id = Uuid::new_v4();
        let existing = HashSet::from([product_id]);
        let data = (0..3)
            .map(|index| {
                let mut item = CreateProductVariant::new(format!("v{index}"));
                item.product_id = Some(product_id);
                item.variant_rank = Some(10 + index);
                item
            })
            .collect();

        let staged = stage_variants(data, &existing, ReferencePolicy::Drop, 1).unwrap();
        let ranks: Vec<i64> = staged.iter().map(|variant| variant.variant_rank).collect();
        assert_eq!(ranks, vec![10, 11, 12]);
        assert!(staged
            .iter()
            .all(|variant| variant.product_id == Some(product_id)));
    }

    #[test]
    fn stage_variants_fails_whole_batch_on_invalid_item() {
        let data = vec![CreateProductVariant::new("ok"), CreateProductVariant::new("  ")];
        let err = stage_variants(data, &HashSet::new(), ReferencePolicy::Drop, 1).unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
    }
}
