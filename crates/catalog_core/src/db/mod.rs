//! SQLite storage bootstrap, session ownership and transaction plumbing.
//!
//! # Responsibility
//! - Open and configure the shared SQLite connection for catalog stores.
//! - Apply schema migrations in deterministic order.
//! - Resolve the active session for each call (ambient transaction or default).
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Stores never read/write catalog data before migrations succeed.
//! - A `Database` is opened once at startup and closed explicitly at shutdown.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;
pub mod transaction;

pub use open::Database;
pub use transaction::{with_session, with_transaction, PersistRow, TransactionContext};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Current wall clock as epoch milliseconds.
///
/// Row timestamps are computed in Rust (not SQL defaults) so staged rows carry
/// the same values that will be persisted.
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
