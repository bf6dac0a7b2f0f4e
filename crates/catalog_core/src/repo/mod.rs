//! Repository layer: the generic entity store contract and SQLite stores.
//!
//! # Responsibility
//! - Define the `EntityStore<T>` contract shared by every catalog entity.
//! - Isolate SQL details from service orchestration.
//! - Resolve foreign product references in one batched query per call.
//!
//! # Invariants
//! - Batch writes are all-or-nothing: validation and reference resolution
//!   finish for every item before anything is staged.
//! - Repository APIs return semantic errors (`NotFound`, `InvalidReference`)
//!   in addition to storage errors, which pass through unmodified.

use crate::config::{ReferencePolicy, RepositoryConfig};
use crate::db::{Database, DbError, TransactionContext};
use crate::model::option::{CreateProductOption, ProductOption, UpdateProductOption};
use crate::model::product::{CreateProduct, Product, ProductId, UpdateProduct};
use crate::model::variant::{CreateProductVariant, ProductVariant, UpdateProductVariant};
use crate::model::{Metadata, ValidationError};
use log::debug;
use self::query::{placeholders, EntitySchema, FindOptions};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod option_repo;
pub mod product_repo;
pub mod query;
pub mod variant_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Related rows revived by a cascading restore, keyed by relation name.
pub type RestoredRelations = BTreeMap<String, Vec<Uuid>>;

/// Repository error for catalog persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ValidationError),
    Db(DbError),
    /// A required row is absent (or soft-deleted).
    NotFound { entity: &'static str, id: Uuid },
    /// A referenced row is absent under `ReferencePolicy::Reject`.
    InvalidReference { entity: &'static str, id: Uuid },
    InvalidQuery(String),
    InvalidData(String),
}

/// Coarse error classification for callers that only branch on category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidReference,
    InvalidInput,
    Storage,
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidReference { .. } => ErrorKind::InvalidReference,
            Self::Validation(_) | Self::InvalidQuery(_) => ErrorKind::InvalidInput,
            Self::Db(_) | Self::InvalidData(_) => ErrorKind::Storage,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} with id \"{id}\" not found"),
            Self::InvalidReference { entity, id } => {
                write!(f, "referenced {entity} with id \"{id}\" does not exist")
            }
            Self::InvalidQuery(message) => write!(f, "invalid query: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Persistence contract shared by every catalog entity store.
///
/// Every operation takes an optional ambient transaction. Reads without one
/// run on the default session; writes without one run in an implicit
/// transaction scoped to the single call.
pub trait EntityStore<T> {
    type Create;
    type Update;

    fn schema(&self) -> &'static EntitySchema;
    fn config(&self) -> &RepositoryConfig;
    fn database(&self) -> &Database;

    /// Loads rows, then batch-loads requested relations keyed by row ids.
    fn find(
        &self,
        options: &FindOptions,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Vec<T>>;

    /// Same as `find`, plus the unpaginated count of matching rows.
    fn find_and_count(
        &self,
        options: &FindOptions,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<(Vec<T>, u64)>;

    /// Builds and stages new rows; they persist when the transaction commits.
    fn create(
        &self,
        data: Vec<Self::Create>,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Vec<T>>;

    /// Merges updates into existing rows; any unknown id fails the batch.
    fn update(
        &self,
        data: Vec<Self::Update>,
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<Vec<T>>;

    /// Permanently removes rows. Unknown ids are ignored.
    fn delete(&self, ids: &[Uuid], ctx: Option<&mut TransactionContext<'_>>) -> RepoResult<()>;

    fn soft_delete(&self, ids: &[Uuid], ctx: Option<&mut TransactionContext<'_>>)
        -> RepoResult<()>;

    /// Clears the removal marker and returns the revived rows.
    fn restore(
        &self,
        ids: &[Uuid],
        ctx: Option<&mut TransactionContext<'_>>,
    ) -> RepoResult<(Vec<T>, RestoredRelations)>;
}

/// Any store of products with the catalog input shapes.
pub trait ProductStore:
    EntityStore<Product, Create = CreateProduct, Update = UpdateProduct>
{
}

impl<S> ProductStore for S where
    S: EntityStore<Product, Create = CreateProduct, Update = UpdateProduct>
{
}

/// Any store of variants with the catalog input shapes.
pub trait VariantStore:
    EntityStore<ProductVariant, Create = CreateProductVariant, Update = UpdateProductVariant>
{
}

impl<S> VariantStore for S where
    S: EntityStore<ProductVariant, Create = CreateProductVariant, Update = UpdateProductVariant>
{
}

/// Any store of options with the catalog input shapes.
pub trait OptionStore:
    EntityStore<ProductOption, Create = CreateProductOption, Update = UpdateProductOption>
{
}

impl<S> OptionStore for S where
    S: EntityStore<ProductOption, Create = CreateProductOption, Update = UpdateProductOption>
{
}

/// Returns ids of live products among `ids`, in one query.
pub(crate) fn live_product_ids(
    conn: &Connection,
    ids: &[ProductId],
) -> RepoResult<HashSet<ProductId>> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }

    let sql = format!(
        "SELECT id FROM products WHERE deleted_at IS NULL AND id IN ({});",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(ids.iter().map(|id| id.to_string())))?;
    let mut found = HashSet::with_capacity(ids.len());
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        found.insert(parse_uuid(&value, "products.id")?);
    }
    Ok(found)
}

/// Applies the reference policy to one requested product id.
pub(crate) fn resolve_product_reference(
    entity: &'static str,
    requested: Option<ProductId>,
    existing: &HashSet<ProductId>,
    policy: ReferencePolicy,
) -> RepoResult<Option<ProductId>> {
    let Some(product_id) = requested else {
        return Ok(None);
    };
    if existing.contains(&product_id) {
        return Ok(Some(product_id));
    }

    match policy {
        ReferencePolicy::Drop => {
            debug!(
                "event=reference_dropped module=repo entity={entity} product_id={product_id}"
            );
            Ok(None)
        }
        ReferencePolicy::Reject => Err(RepoError::InvalidReference {
            entity: "product",
            id: product_id,
        }),
    }
}

/// Collects product ids referenced by a batch, deduplicated, input order kept.
pub(crate) fn referenced_product_ids(
    requested: impl IntoIterator<Item = Option<ProductId>>,
) -> Vec<ProductId> {
    let mut seen = HashSet::new();
    requested
        .into_iter()
        .flatten()
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Fails with `NotFound` for the first update id missing from `found`.
pub(crate) fn ensure_all_found(
    entity: &'static str,
    requested: impl IntoIterator<Item = Uuid>,
    found: &HashSet<Uuid>,
) -> RepoResult<()> {
    for id in requested {
        if !found.contains(&id) {
            return Err(RepoError::NotFound { entity, id });
        }
    }
    Ok(())
}

pub(crate) fn query_count(
    conn: &Connection,
    options: &FindOptions,
    schema: &EntitySchema,
) -> RepoResult<u64> {
    let (sql, binds) = options.count_sql(schema);
    let count: i64 = conn.query_row(&sql, params_from_iter(binds), |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

pub(crate) fn delete_rows(conn: &Connection, table: &str, ids: &[Uuid]) -> RepoResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "DELETE FROM {table} WHERE id IN ({});",
        placeholders(ids.len())
    );
    Ok(conn.execute(&sql, params_from_iter(id_values(ids)))?)
}

/// Stamps `deleted_at` on live rows among `ids`; returns the stamped ids.
pub(crate) fn soft_delete_rows(
    conn: &Connection,
    table: &str,
    ids: &[Uuid],
    deleted_at: i64,
) -> RepoResult<Vec<Uuid>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let live = select_ids(
        conn,
        &format!(
            "SELECT id FROM {table} WHERE deleted_at IS NULL AND id IN ({}) ORDER BY id;",
            placeholders(ids.len())
        ),
        id_values(ids),
    )?;
    if live.is_empty() {
        return Ok(live);
    }

    let mut binds = vec![Value::Integer(deleted_at)];
    binds.extend(id_values(&live));
    conn.execute(
        &format!(
            "UPDATE {table} SET deleted_at = ? WHERE id IN ({});",
            placeholders(live.len())
        ),
        params_from_iter(binds),
    )?;
    Ok(live)
}

/// Clears `deleted_at` on soft-deleted rows among `ids`; returns revived ids.
pub(crate) fn restore_rows(conn: &Connection, table: &str, ids: &[Uuid]) -> RepoResult<Vec<Uuid>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let removed = select_ids(
        conn,
        &format!(
            "SELECT id FROM {table} WHERE deleted_at IS NOT NULL AND id IN ({}) ORDER BY id;",
            placeholders(ids.len())
        ),
        id_values(ids),
    )?;
    if removed.is_empty() {
        return Ok(removed);
    }

    conn.execute(
        &format!(
            "UPDATE {table} SET deleted_at = NULL WHERE id IN ({});",
            placeholders(removed.len())
        ),
        params_from_iter(id_values(&removed)),
    )?;
    Ok(removed)
}

pub(crate) fn select_ids(
    conn: &Connection,
    sql: &str,
    binds: Vec<Value>,
) -> RepoResult<Vec<Uuid>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(binds))?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ids.push(parse_uuid(&value, "id")?);
    }
    Ok(ids)
}

pub(crate) fn id_values(ids: &[Uuid]) -> Vec<Value> {
    ids.iter().map(|id| Value::Text(id.to_string())).collect()
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn parse_optional_uuid(
    value: Option<String>,
    column: &'static str,
) -> RepoResult<Option<Uuid>> {
    value.map(|value| parse_uuid(&value, column)).transpose()
}

pub(crate) fn parse_metadata(
    value: Option<String>,
    column: &'static str,
) -> RepoResult<Option<Metadata>> {
    value
        .map(|text| {
            serde_json::from_str::<Metadata>(&text).map_err(|err| {
                RepoError::InvalidData(format!("invalid metadata json in {column}: {err}"))
            })
        })
        .transpose()
}

pub(crate) fn metadata_to_db(metadata: &Option<Metadata>) -> rusqlite::Result<Option<String>> {
    metadata
        .as_ref()
        .map(|value| {
            serde_json::to_string(value)
                .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::{
        ensure_all_found, referenced_product_ids, resolve_product_reference, ErrorKind, RepoError,
    };
    use crate::config::ReferencePolicy;
    use std::collections::HashSet;
    use uuid::Uuid;

    #[test]
    fn referenced_ids_are_deduplicated_in_input_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ids = referenced_product_ids([Some(b), None, Some(a), Some(b)]);
        assert_eq!(ids, vec![b, a]);
    }

    #[test]
    fn drop_policy_unsets_unknown_reference() {
        let existing = HashSet::new();
        let resolved = resolve_product_reference(
            "option",
            Some(Uuid::new_v4()),
            &existing,
            ReferencePolicy::Drop,
        )
        .unwrap();
        assert_eq!(resolved, None);
    }

    #[test]
    fn reject_policy_fails_unknown_reference() {
        let missing = Uuid::new_v4();
        let err = resolve_product_reference(
            "option",
            Some(missing),
            &HashSet::new(),
            ReferencePolicy::Reject,
        )
        .unwrap_err();
        assert!(matches!(err, RepoError::InvalidReference { id, .. } if id == missing));
        assert_eq!(err.kind(), ErrorKind::InvalidReference);
    }

    #[test]
    fn ensure_all_found_names_first_missing_id() {
        let present = Uuid::new_v4();
        let missing = Uuid::new_v4();
        let found = HashSet::from([present]);
        let err = ensure_all_found("variant", [present, missing], &found).unwrap_err();
        assert!(matches!(err, RepoError::NotFound { entity: "variant", id } if id == missing));
        assert_eq!(err.to_string(), format!("variant with id \"{missing}\" not found"));
    }
}
