//! Filter/pagination query builder shared by all catalog stores.
//!
//! # Responsibility
//! - Translate caller-facing `FindConfig` plus typed filters into `FindOptions`.
//! - Render `FindOptions` into parameterized SQL for one table.
//!
//! # Invariants
//! - Column names in SQL come only from static per-entity whitelists.
//! - Soft-deleted rows are excluded unless `with_deleted` is set.
//! - Ordering always ends with `id ASC` so pagination is deterministic.

use super::{RepoError, RepoResult};
use crate::config::RepositoryConfig;
use rusqlite::types::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Static description of one stored entity used for query validation.
#[derive(Debug)]
pub struct EntitySchema {
    /// Entity name used in errors and log events.
    pub name: &'static str,
    pub table: &'static str,
    /// Columns accepted in `FindConfig::order`.
    pub sortable: &'static [&'static str],
    /// Relation names accepted in `FindConfig::relations`.
    pub relations: &'static [&'static str],
    /// Order applied when the caller does not specify one.
    pub default_order: &'static [(&'static str, SortDirection)],
}

impl EntitySchema {
    fn sortable_column(&self, field: &str) -> Option<&'static str> {
        self.sortable.iter().copied().find(|column| *column == field)
    }

    fn relation(&self, name: &str) -> Option<&'static str> {
        self.relations.iter().copied().find(|relation| *relation == name)
    }
}

/// Caller-facing selection/pagination options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindConfig {
    pub skip: u32,
    /// Page size; `None` or `0` uses the configured default.
    pub take: Option<u32>,
    pub order: Vec<(String, SortDirection)>,
    pub relations: Vec<String>,
    pub with_deleted: bool,
}

impl FindConfig {
    pub fn with_relations(relations: &[&str]) -> Self {
        Self {
            relations: relations.iter().map(|name| name.to_string()).collect(),
            ..Self::default()
        }
    }
}

/// One SQL predicate over a whitelisted column.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(&'static str, Value),
    In(&'static str, Vec<Value>),
}

impl Condition {
    pub fn ids_in(column: &'static str, ids: &[Uuid]) -> Self {
        Self::In(
            column,
            ids.iter().map(|id| Value::Text(id.to_string())).collect(),
        )
    }
}

/// Typed filters translated into conditions.
pub trait Filterable {
    fn conditions(&self) -> Vec<Condition>;
}

/// Store-facing query shape accepted by `find`/`find_and_count`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub conditions: Vec<Condition>,
    pub order: Vec<(&'static str, SortDirection)>,
    pub limit: Option<u32>,
    pub offset: u32,
    pub relations: Vec<&'static str>,
    pub with_deleted: bool,
}

impl FindOptions {
    /// Unpaginated lookup of rows by primary key.
    pub fn by_ids(ids: &[Uuid]) -> Self {
        Self {
            conditions: vec![Condition::ids_in("id", ids)],
            ..Self::default()
        }
    }

    pub fn with_deleted(mut self) -> Self {
        self.with_deleted = true;
        self
    }

    pub fn has_relation(&self, relation: &str) -> bool {
        self.relations.iter().any(|current| *current == relation)
    }

    /// Renders `SELECT <columns> FROM <table> WHERE ... ORDER BY ... LIMIT ...`.
    pub fn select_sql(&self, schema: &EntitySchema, columns: &str) -> (String, Vec<Value>) {
        let (where_sql, mut binds) = self.where_sql();
        let mut sql = format!("SELECT {columns} FROM {}{where_sql}", schema.table);

        let order: &[(&'static str, SortDirection)] = if self.order.is_empty() {
            schema.default_order
        } else {
            &self.order
        };
        let mut clauses: Vec<String> = order
            .iter()
            .map(|(column, direction)| format!("{column} {}", direction.as_sql()))
            .collect();
        if !order.iter().any(|(column, _)| *column == "id") {
            clauses.push("id ASC".to_string());
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&clauses.join(", "));

        match self.limit {
            Some(limit) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                binds.push(Value::Integer(i64::from(limit)));
                binds.push(Value::Integer(i64::from(self.offset)));
            }
            None if self.offset > 0 => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                binds.push(Value::Integer(i64::from(self.offset)));
            }
            None => {}
        }

        (sql, binds)
    }

    /// Renders a count over the same filters, ignoring pagination.
    pub fn count_sql(&self, schema: &EntitySchema) -> (String, Vec<Value>) {
        let (where_sql, binds) = self.where_sql();
        (
            format!("SELECT COUNT(*) FROM {}{where_sql}", schema.table),
            binds,
        )
    }

    fn where_sql(&self) -> (String, Vec<Value>) {
        let mut predicates = Vec::new();
        let mut binds = Vec::new();

        if !self.with_deleted {
            predicates.push("deleted_at IS NULL".to_string());
        }

        for condition in &self.conditions {
            match condition {
                Condition::Eq(column, value) => {
                    predicates.push(format!("{column} = ?"));
                    binds.push(value.clone());
                }
                Condition::In(_, values) if values.is_empty() => {
                    predicates.push("0 = 1".to_string());
                }
                Condition::In(column, values) => {
                    predicates.push(format!("{column} IN ({})", placeholders(values.len())));
                    binds.extend(values.iter().cloned());
                }
            }
        }

        if predicates.is_empty() {
            return (String::new(), binds);
        }
        (format!(" WHERE {}", predicates.join(" AND ")), binds)
    }
}

/// Builds store query options from typed filters and caller config.
///
/// Rejects unknown sort fields and relation names instead of ignoring them.
pub fn build_query<F: Filterable>(
    schema: &EntitySchema,
    filters: &F,
    config: &FindConfig,
    repo_config: &RepositoryConfig,
) -> RepoResult<FindOptions> {
    let mut order = Vec::with_capacity(config.order.len());
    for (field, direction) in &config.order {
        let column = schema.sortable_column(field).ok_or_else(|| {
            RepoError::InvalidQuery(format!(
                "cannot order {} by unknown field `{field}`",
                schema.name
            ))
        })?;
        order.push((column, *direction));
    }

    let mut relations = Vec::with_capacity(config.relations.len());
    for name in &config.relations {
        let relation = schema.relation(name).ok_or_else(|| {
            RepoError::InvalidQuery(format!("unknown {} relation `{name}`", schema.name))
        })?;
        if !relations.contains(&relation) {
            relations.push(relation);
        }
    }

    Ok(FindOptions {
        conditions: filters.conditions(),
        order,
        limit: Some(repo_config.page_size(config.take)),
        offset: config.skip,
        relations,
        with_deleted: config.with_deleted,
    })
}

/// `?, ?, ?` for `count` bind slots.
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

pub(crate) fn push_ids_filter(
    conditions: &mut Vec<Condition>,
    column: &'static str,
    ids: Option<&Vec<Uuid>>,
) {
    if let Some(ids) = ids {
        conditions.push(Condition::ids_in(column, ids));
    }
}

pub(crate) fn push_text_filter(
    conditions: &mut Vec<Condition>,
    column: &'static str,
    value: Option<&String>,
) {
    if let Some(value) = value {
        conditions.push(Condition::Eq(column, Value::Text(value.clone())));
    }
}

#[cfg(test)]
mod tests {
    use super::{
        build_query, placeholders, Condition, EntitySchema, FindConfig, FindOptions, Filterable,
        SortDirection,
    };
    use crate::config::RepositoryConfig;
    use crate::repo::RepoError;
    use rusqlite::types::Value;

    const WIDGETS: EntitySchema = EntitySchema {
        name: "widget",
        table: "widgets",
        sortable: &["title", "created_at"],
        relations: &["parts"],
        default_order: &[("created_at", SortDirection::Asc)],
    };

    struct TitleFilter(Option<String>);

    impl Filterable for TitleFilter {
        fn conditions(&self) -> Vec<Condition> {
            self.0
                .iter()
                .map(|title| Condition::Eq("title", Value::Text(title.clone())))
                .collect()
        }
    }

    #[test]
    fn placeholders_join_with_commas() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(1), "?");
    }

    #[test]
    fn build_query_rejects_unknown_sort_field() {
        let config = FindConfig {
            order: vec![("price".to_string(), SortDirection::Desc)],
            ..FindConfig::default()
        };
        let err = build_query(
            &WIDGETS,
            &TitleFilter(None),
            &config,
            &RepositoryConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RepoError::InvalidQuery(message) if message.contains("price")));
    }

    #[test]
    fn build_query_rejects_unknown_relation() {
        let config = FindConfig::with_relations(&["owners"]);
        let err = build_query(
            &WIDGETS,
            &TitleFilter(None),
            &config,
            &RepositoryConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RepoError::InvalidQuery(_)));
    }

    #[test]
    fn build_query_applies_page_size_and_filters() {
        let config = FindConfig {
            skip: 5,
            take: Some(1_000),
            relations: vec!["parts".to_string(), "parts".to_string()],
            ..FindConfig::default()
        };
        let options = build_query(
            &WIDGETS,
            &TitleFilter(Some("bolt".to_string())),
            &config,
            &RepositoryConfig::default(),
        )
        .unwrap();

        assert_eq!(options.limit, Some(100));
        assert_eq!(options.offset, 5);
        assert_eq!(options.relations, vec!["parts"]);
        assert_eq!(options.conditions.len(), 1);
    }

    #[test]
    fn select_sql_excludes_deleted_and_orders_deterministically() {
        let options = FindOptions {
            conditions: vec![Condition::Eq("title", Value::Text("bolt".to_string()))],
            limit: Some(10),
            ..FindOptions::default()
        };
        let (sql, binds) = options.select_sql(&WIDGETS, "id, title");

        assert_eq!(
            sql,
            "SELECT id, title FROM widgets WHERE deleted_at IS NULL AND title = ? \
             ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?"
        );
        assert_eq!(binds.len(), 3);
    }

    #[test]
    fn empty_id_set_matches_nothing() {
        let options = FindOptions::by_ids(&[]).with_deleted();
        let (sql, binds) = options.count_sql(&WIDGETS);
        assert_eq!(sql, "SELECT COUNT(*) FROM widgets WHERE 0 = 1");
        assert!(binds.is_empty());
    }
}
