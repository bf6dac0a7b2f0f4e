//! Product store: parent rows plus select-in loading of child collections.
//!
//! # Responsibility
//! - Persist product rows and load `variants`/`options` relations in a second
//!   pass keyed by product ids (never a joined query).
//! - Cascade soft delete/restore to the product's children.
//!
//! # Invariants
//! - A cascading soft delete stamps children with the product's `deleted_at`.
//! - Restoring a product revives exactly the children stamped by that cascade.

use super::query::{
    placeholders, push_ids_filter, push_text_filter, Condition, EntitySchema, Filterable,
    FindOptions, SortDirection,
};
use super::{
    delete_rows, ensure_all_found, id_values, metadata_to_db, parse_metadata, parse_uuid,
    query_count, restore_rows, select_ids, soft_delete_rows, EntityStore, RepoError, RepoResult,
    RestoredRelations,
};
use crate::config::RepositoryConfig;
use crate::db::{
    now_epoch_ms, with_session, with_transaction, Database, PersistRow, TransactionContext,
};
use crate::model::product::{
    build_product, merge_product, CreateProduct, Product, ProductId, UpdateProduct,
};
use crate::repo::option_repo::load_options_for_products;
use crate::repo::variant_repo::load_variants_for_products;
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub const PRODUCT_SCHEMA: EntitySchema = EntitySchema {
    name: "product",
    table: "products",
    sortable: &["title", "handle", "created_at", "updated_at"],
    relations: &["variants", "options"],
    default_order: &[("created_at", SortDirection::Asc)],
};

const PRODUCT_COLUMNS: &str =
    "id, title, handle, description, metadata, created_at, updated_at, deleted_at";

/// Child tables that follow a product's soft-delete lifecycle.
const CASCADE_TABLES: &[(&str, &str)] = &[
    ("variants", "product_variants"),
    ("options", "product_options"),
];

/// Filters accepted by product list operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilters {
    pub id: Option<Vec<ProductId>>,
    pub handle: Option<String>,
    pub title: Option<String>,
}

impl Filterable for ProductFilters {
    fn conditions(&self) -> Vec<Condition> {
        let mut conditions = Vec::new();
        push_ids_filter(&mut conditions, "id", self.id.as_ref());
        push_text_filter(&mut conditions, "handle", self.handle.as_ref());
        push_text_filter(&mut conditions, "title", self.title.as_ref());
        conditions
    }
}

/// SQLite-backed product store.
pub struct SqliteProductRepository<'db> {
    db: &'db Database,
    config: RepositoryConfig,
}

impl<'db> SqliteProductRepository<'db> {
    pub fn new(db: &'db Database, config: RepositoryConfig) -> Self {
        Self { db, config }
    }
}

impl EntityStore<Product> for SqliteProductRepository<'_> {
    type Create = CreateProduct;
    type Update = UpdateProduct;

    fn schema(&self) -> &'static EntitySchema {
        &PRODUCT_SCHEMA
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
    ) -> RepoResult<Vec<Product>> {
        with_session(self.db, ctx, |conn| load_products(conn, options))
    }

    fn find_and_count(
        &self,
        options: &FindOptions,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<(Vec<Product>, u64)> {
        with_session(self.db, ctx, |conn| {
            let products = load_products(conn, options)?;
            let count = query_count(conn, options, &PRODUCT_SCHEMA)?;
            Ok((products, count))
        })
    }

    fn create(
        &self,
        data: Vec<CreateProduct>,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Vec<Product>> {
        let now = now_epoch_ms();
        let products = data
            .into_iter()
            .map(|item| build_product(item, now))
            .collect::<Result<Vec<_>, _>>()?;

        with_transaction(self.db, ctx, |tx| {
            tx.persist_new(products.iter().cloned());
            debug!(
                "event=product_stage module=repo tx_id={} count={}",
                tx.id(),
                products.len()
            );
            Ok::<_, RepoError>(())
        })?;
        Ok(products)
    }

    fn update(
        &self,
        data: Vec<UpdateProduct>,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Vec<Product>> {
        with_transaction(self.db, ctx, |tx| {
            let ids: Vec<ProductId> = data.iter().map(|item| item.id).collect();
            let existing = load_products(tx.session()?, &FindOptions::by_ids(&ids))?;
            let mut by_id: HashMap<ProductId, Product> = existing
                .into_iter()
                .map(|product| (product.id, product))
                .collect();
            let found: HashSet<ProductId> = by_id.keys().copied().collect();
            ensure_all_found(PRODUCT_SCHEMA.name, ids.iter().copied(), &found)?;

            let now = now_epoch_ms();
            let mut order = Vec::with_capacity(data.len());
            for item in data {
                let id = item.id;
                if let Some(product) = by_id.get_mut(&id) {
                    merge_product(product, item, now)?;
                }
                if !order.contains(&id) {
                    order.push(id);
                }
            }

            let updated: Vec<Product> = order
                .iter()
                .filter_map(|id| by_id.remove(id))
                .collect();
            tx.persist_changed(updated.iter().cloned());
            Ok(updated)
        })
    }

    fn delete(&self, ids: &[Uuid], ctx: Option<&mut TransactionContext<'_>>) -> RepoResult<()> {
        with_transaction(self.db, ctx, |tx| {
            let removed = delete_rows(tx.session()?, PRODUCT_SCHEMA.table, ids)?;
            debug!(
                "event=product_delete module=repo tx_id={} requested={} removed={removed}",
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
            let conn = tx.session()?;
            let stamp = now_epoch_ms();
            let stamped = soft_delete_rows(conn, PRODUCT_SCHEMA.table, ids, stamp)?;
            for (_, table) in CASCADE_TABLES {
                let children = live_children(conn, table, &stamped)?;
                soft_delete_rows(conn, table, &children, stamp)?;
            }
            Ok(())
        })
    }

    fn restore(
        &self,
        ids: &[Uuid],
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<(Vec<Product>, RestoredRelations)> {
        with_transaction(self.db, ctx, |tx| {
            let conn = tx.session()?;
            let stamps = deletion_stamps(conn, ids)?;
            let revived = restore_rows(conn, PRODUCT_SCHEMA.table, ids)?;

            let mut relations = RestoredRelations::new();
            for (relation, table) in CASCADE_TABLES {
                let mut restored_children = Vec::new();
                for (product_id, stamp) in &stamps {
                    let children = select_ids(
                        conn,
                        &format!(
                            "SELECT id FROM {table}
                             WHERE product_id = ? AND deleted_at = ?
                             ORDER BY id;"
                        ),
                        vec![Value::Text(product_id.to_string()), Value::Integer(*stamp)],
                    )?;
                    restored_children.extend(restore_rows(conn, table, &children)?);
                }
                relations.insert(relation.to_string(), restored_children);
            }

            let products = load_products(conn, &FindOptions::by_ids(&revived))?;
            Ok((products, relations))
        })
    }
}

impl PersistRow for Product {
    fn table(&self) -> &'static str {
        PRODUCT_SCHEMA.table
    }

    fn row_id(&self) -> Uuid {
        self.id
    }

    fn insert_into(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO products (
                id,
                title,
                handle,
                description,
                metadata,
                created_at,
                updated_at,
                deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                self.id.to_string(),
                self.title.as_str(),
                self.handle.as_str(),
                self.description.as_deref(),
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
            "UPDATE products
             SET
                title = ?2,
                handle = ?3,
                description = ?4,
                metadata = ?5,
                updated_at = ?6
             WHERE id = ?1;",
            params![
                self.id.to_string(),
                self.title.as_str(),
                self.handle.as_str(),
                self.description.as_deref(),
                metadata_to_db(&self.metadata)?,
                self.updated_at,
            ],
        )?;
        Ok(())
    }
}

/// Loads products matching `options`, then their requested relations.
pub(crate) fn load_products(conn: &Connection, options: &FindOptions) -> RepoResult<Vec<Product>> {
    let (sql, binds) = options.select_sql(&PRODUCT_SCHEMA, PRODUCT_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(binds))?;
    let mut products = Vec::new();
    while let Some(row) = rows.next()? {
        products.push(parse_product_row(row)?);
    }

    if products.is_empty() {
        return Ok(products);
    }

    let ids: Vec<ProductId> = products.iter().map(|product| product.id).collect();
    if options.has_relation("variants") {
        let mut grouped = load_variants_for_products(conn, &ids, options.with_deleted)?;
        for product in &mut products {
            product.variants = grouped.remove(&product.id).unwrap_or_default();
        }
    }
    if options.has_relation("options") {
        let mut grouped = load_options_for_products(conn, &ids, options.with_deleted)?;
        for product in &mut products {
            product.options = grouped.remove(&product.id).unwrap_or_default();
        }
    }

    Ok(products)
}

/// Loads bare products (no relations) keyed by id, for child `product` relations.
pub(crate) fn load_products_by_ids(
    conn: &Connection,
    ids: &[ProductId],
    with_deleted: bool,
) -> RepoResult<HashMap<ProductId, Product>> {
    let mut options = FindOptions::by_ids(ids);
    options.with_deleted = with_deleted;
    Ok(load_products(conn, &options)?
        .into_iter()
        .map(|product| (product.id, product))
        .collect())
}

fn live_children(conn: &Connection, table: &str, product_ids: &[ProductId]) -> RepoResult<Vec<Uuid>> {
    if product_ids.is_empty() {
        return Ok(Vec::new());
    }
    select_ids(
        conn,
        &format!(
            "SELECT id FROM {table}
             WHERE deleted_at IS NULL AND product_id IN ({})
             ORDER BY id;",
            placeholders(product_ids.len())
        ),
        id_values(product_ids),
    )
}

fn deletion_stamps(conn: &Connection, ids: &[ProductId]) -> RepoResult<Vec<(ProductId, i64)>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, deleted_at FROM products
         WHERE deleted_at IS NOT NULL AND id IN ({})
         ORDER BY id;",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(id_values(ids)))?;
    let mut stamps = Vec::new();
    while let Some(row) = rows.next()? {
        let id_text: String = row.get(0)?;
        stamps.push((parse_uuid(&id_text, "products.id")?, row.get(1)?));
    }
    Ok(stamps)
}

fn parse_product_row(row: &Row<'_>) -> RepoResult<Product> {
    let id_text: String = row.get("id")?;
    Ok(Product {
        id: parse_uuid(&id_text, "products.id")?,
        title: row.get("title")?,
        handle: row.get("handle")?,
        description: row.get("description")?,
        metadata: parse_metadata(row.get("metadata")?, "products.metadata")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
        variants: Vec::new(),
        options: Vec::new(),
    })
}
