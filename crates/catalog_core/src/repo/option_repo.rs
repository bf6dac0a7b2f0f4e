//! Product option store.
//!
//! # Responsibility
//! - Persist option rows and resolve their product references.
//!
//! # Invariants
//! - An option whose `product_id` matches no live product is kept with the
//!   reference unset under `ReferencePolicy::Drop`.

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
use crate::model::option::{
    build_option, merge_option, CreateProductOption, OptionId, ProductOption, UpdateProductOption,
};
use crate::model::product::ProductId;
use log::debug;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub const OPTION_SCHEMA: EntitySchema = EntitySchema {
    name: "product_option",
    table: "product_options",
    sortable: &["title", "product_id", "created_at", "updated_at"],
    relations: &["product"],
    default_order: &[("created_at", SortDirection::Asc)],
};

const OPTION_COLUMNS: &str =
    "id, product_id, title, metadata, created_at, updated_at, deleted_at";

/// Filters accepted by option list operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionFilters {
    pub id: Option<Vec<OptionId>>,
    pub product_id: Option<Vec<ProductId>>,
    pub title: Option<String>,
}

impl Filterable for OptionFilters {
    fn conditions(&self) -> Vec<Condition> {
        let mut conditions = Vec::new();
        push_ids_filter(&mut conditions, "id", self.id.as_ref());
        push_ids_filter(&mut conditions, "product_id", self.product_id.as_ref());
        push_text_filter(&mut conditions, "title", self.title.as_ref());
        conditions
    }
}

/// SQLite-backed option store.
pub struct SqliteOptionRepository<'db> {
    db: &'db Database,
    config: RepositoryConfig,
}

impl<'db> SqliteOptionRepository<'db> {
    pub fn new(db: &'db Database, config: RepositoryConfig) -> Self {
        Self { db, config }
    }
}

impl EntityStore<ProductOption> for SqliteOptionRepository<'_> {
    type Create = CreateProductOption;
    type Update = UpdateProductOption;

    fn schema(&self) -> &'static EntitySchema {
        &OPTION_SCHEMA
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
    ) -> RepoResult<Vec<ProductOption>> {
        with_session(self.db, ctx, |conn| load_options(conn, options))
    }

    fn find_and_count(
        &self,
        options: &FindOptions,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<(Vec<ProductOption>, u64)> {
        with_session(self.db, ctx, |conn| {
            let rows = load_options(conn, options)?;
            let count = query_count(conn, options, &OPTION_SCHEMA)?;
            Ok((rows, count))
        })
    }

    fn create(
        &self,
        data: Vec<CreateProductOption>,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Vec<ProductOption>> {
        let policy = self.config.reference_policy;
        with_transaction(self.db, ctx, |tx| {
            let requested = referenced_product_ids(data.iter().map(|item| item.product_id));
            let existing = live_product_ids(tx.session()?, &requested)?;
            let rows = stage_options(data, &existing, policy, now_epoch_ms())?;

            tx.persist_new(rows.iter().cloned());
            debug!(
                "event=option_stage module=repo tx_id={} count={}",
                tx.id(),
                rows.len()
            );
            Ok(rows)
        })
    }

    fn update(
        &self,
        data: Vec<UpdateProductOption>,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Vec<ProductOption>> {
        let policy = self.config.reference_policy;
        with_transaction(self.db, ctx, |tx| {
            let ids: Vec<OptionId> = data.iter().map(|item| item.id).collect();
            let conn = tx.session()?;
            let mut by_id: HashMap<OptionId, ProductOption> =
                load_options(conn, &FindOptions::by_ids(&ids))?
                    .into_iter()
                    .map(|row| (row.id, row))
                    .collect();
            let found: HashSet<OptionId> = by_id.keys().copied().collect();
            ensure_all_found(OPTION_SCHEMA.name, ids.iter().copied(), &found)?;

            let requested = referenced_product_ids(data.iter().map(|item| item.product_id));
            let existing = live_product_ids(conn, &requested)?;

            let now = now_epoch_ms();
            let mut order = Vec::with_capacity(data.len());
            for mut item in data {
                item.product_id = resolve_product_reference(
                    OPTION_SCHEMA.name,
                    item.product_id,
                    &existing,
                    policy,
                )?;
                let id = item.id;
                if let Some(row) = by_id.get_mut(&id) {
                    merge_option(row, item, now)?;
                }
                if !order.contains(&id) {
                    order.push(id);
                }
            }

            let updated: Vec<ProductOption> =
                order.iter().filter_map(|id| by_id.remove(id)).collect();
            tx.persist_changed(updated.iter().cloned());
            Ok(updated)
        })
    }

    fn delete(&self, ids: &[Uuid], ctx: Option<&mut TransactionContext<'_>>) -> RepoResult<()> {
        with_transaction(self.db, ctx, |tx| {
            let removed = delete_rows(tx.session()?, OPTION_SCHEMA.table, ids)?;
            debug!(
                "event=option_delete module=repo tx_id={} requested={} removed={removed}",
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
            soft_delete_rows(tx.session()?, OPTION_SCHEMA.table, ids, now_epoch_ms())?;
            Ok(())
        })
    }

    fn restore(
        &self,
        ids: &[Uuid],
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<(Vec<ProductOption>, RestoredRelations)> {
        with_transaction(self.db, ctx, |tx| {
            let conn = tx.session()?;
            let revived = restore_rows(conn, OPTION_SCHEMA.table, ids)?;
            let rows = load_options(conn, &FindOptions::by_ids(&revived))?;
            Ok((rows, RestoredRelations::new()))
        })
    }
}

/// Builds option rows for a batch against pre-resolved product ids.
pub fn stage_options(
    data: Vec<CreateProductOption>,
    existing_products: &HashSet<ProductId>,
    policy: ReferencePolicy,
    now: i64,
) -> RepoResult<Vec<ProductOption>> {
    data.into_iter()
        .map(|item| -> RepoResult<ProductOption> {
            let product_id = resolve_product_reference(
                OPTION_SCHEMA.name,
                item.product_id,
                existing_products,
                policy,
            )?;
            Ok(build_option(item, product_id, now)?)
        })
        .collect()
}

impl PersistRow for ProductOption {
    fn table(&self) -> &'static str {
        OPTION_SCHEMA.table
    }

    fn row_id(&self) -> Uuid {
        self.id
    }

    fn insert_into(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO product_options (
                id,
                product_id,
                title,
                metadata,
                created_at,
                updated_at,
                deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                self.id.to_string(),
                self.product_id.map(|value| value.to_string()),
                self.title.as_str(),
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
            "UPDATE product_options
             SET
                product_id = ?2,
                title = ?3,
                metadata = ?4,
                updated_at = ?5
             WHERE id = ?1;",
            params![
                self.id.to_string(),
                self.product_id.map(|value| value.to_string()),
                self.title.as_str(),
                metadata_to_db(&self.metadata)?,
                self.updated_at,
            ],
        )?;
        Ok(())
    }
}

fn load_options(conn: &Connection, options: &FindOptions) -> RepoResult<Vec<ProductOption>> {
    let (sql, binds) = options.select_sql(&OPTION_SCHEMA, OPTION_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(binds))?;
    let mut loaded = Vec::new();
    while let Some(row) = rows.next()? {
        loaded.push(parse_option_row(row)?);
    }

    if options.has_relation("product") && !loaded.is_empty() {
        let product_ids = referenced_product_ids(loaded.iter().map(|item| item.product_id));
        let products = load_products_by_ids(conn, &product_ids, options.with_deleted)?;
        for option in &mut loaded {
            option.product = option
                .product_id
                .and_then(|id| products.get(&id).cloned())
                .map(Box::new);
        }
    }

    Ok(loaded)
}

/// Loads options of several products in one query, grouped by product id.
pub(crate) fn load_options_for_products(
    conn: &Connection,
    product_ids: &[ProductId],
    with_deleted: bool,
) -> RepoResult<HashMap<ProductId, Vec<ProductOption>>> {
    let mut grouped: HashMap<ProductId, Vec<ProductOption>> = HashMap::new();
    if product_ids.is_empty() {
        return Ok(grouped);
    }

    let deleted_filter = if with_deleted {
        ""
    } else {
        " AND deleted_at IS NULL"
    };
    let sql = format!(
        "SELECT {OPTION_COLUMNS}
         FROM product_options
         WHERE product_id IN ({}){deleted_filter}
         ORDER BY created_at ASC, id ASC;",
        placeholders(product_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(id_values(product_ids)))?;
    while let Some(row) = rows.next()? {
        let option = parse_option_row(row)?;
        if let Some(product_id) = option.product_id {
            grouped.entry(product_id).or_default().push(option);
        }
    }
    Ok(grouped)
}

fn parse_option_row(row: &Row<'_>) -> RepoResult<ProductOption> {
    let id_text: String = row.get("id")?;
    Ok(ProductOption {
        id: parse_uuid(&id_text, "product_options.id")?,
        product_id: parse_optional_uuid(row.get("product_id")?, "product_options.product_id")?,
        title: row.get("title")?,
        metadata: parse_metadata(row.get("metadata")?, "product_options.metadata")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
        product: None,
    })
}

#[cfg(test)]
mod tests {
    use super::{stage_options, OptionFilters};
    use crate::config::ReferencePolicy;
    use crate::model::option::CreateProductOption;
    use crate::repo::query::{Condition, Filterable};
    use crate::repo::RepoError;
    use std::collections::HashSet;
    use uuid::Uuid;

    #[test]
    fn unknown_product_is_dropped_under_default_policy() {
        let known = Uuid::new_v4();
        let existing = HashSet::from([known]);
        let data = vec![
            CreateProductOption::new("Size").for_product(known),
            CreateProductOption::new("Color").for_product(Uuid::new_v4()),
        ];

        let staged = stage_options(data, &existing, ReferencePolicy::Drop, 7).unwrap();
        assert_eq!(staged[0].product_id, Some(known));
        assert_eq!(staged[1].product_id, None);
        assert_eq!(staged[1].created_at, 7);
    }

    #[test]
    fn unknown_product_fails_batch_under_reject_policy() {
        let missing = Uuid::new_v4();
        let data = vec![
            CreateProductOption::new("Size"),
            CreateProductOption::new("Color").for_product(missing),
        ];
        let err = stage_options(data, &HashSet::new(), ReferencePolicy::Reject, 7).unwrap_err();
        assert!(matches!(err, RepoError::InvalidReference { id, .. } if id == missing));
    }

    #[test]
    fn filters_render_only_supplied_fields() {
        let filters = OptionFilters {
            title: Some("Size".to_string()),
            ..OptionFilters::default()
        };
        let conditions = filters.conditions();
        assert_eq!(conditions.len(), 1);
        assert!(matches!(conditions[0], Condition::Eq("title", _)));
    }
}
