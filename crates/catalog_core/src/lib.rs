//! Transactional data access for products and their options and variants.
//! Stores own SQL; services own parent resolution, ranking and transactions.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{
    ConfigError, CoreConfig, DatabaseConfig, LoggingConfig, ReferencePolicy, RepositoryConfig,
};
pub use db::{with_session, with_transaction, Database, DbError, DbResult, TransactionContext};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::option::{CreateProductOption, OptionId, ProductOption, UpdateProductOption};
pub use model::product::{CreateProduct, Product, ProductId, UpdateProduct};
pub use model::variant::{CreateProductVariant, ProductVariant, UpdateProductVariant, VariantId};
pub use model::{Metadata, ValidationError};
pub use repo::option_repo::{OptionFilters, SqliteOptionRepository};
pub use repo::product_repo::{ProductFilters, SqliteProductRepository};
pub use repo::query::{FindConfig, FindOptions, SortDirection};
pub use repo::variant_repo::{SqliteVariantRepository, VariantFilters};
pub use repo::{EntityStore, ErrorKind, RepoError, RepoResult, RestoredRelations};
pub use service::{
    CatalogServices, ParentRef, ProductOptionService, ProductService, ProductVariantService,
};
