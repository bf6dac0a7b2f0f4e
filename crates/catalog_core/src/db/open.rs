//! Connection bootstrap and the owned `Database` session handle.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by catalog stores.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use crate::config::DatabaseConfig;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Explicitly owned storage session shared by every catalog store.
///
/// Stores borrow the `Database` for their whole lifetime; transactions borrow
/// it for the duration of one unit of work.
pub struct Database {
    conn: Connection,
    mode: &'static str,
}

impl Database {
    /// Opens a file-backed database and applies pending migrations.
    pub fn open(path: impl AsRef<Path>, config: &DatabaseConfig) -> DbResult<Self> {
        let conn = open_connection("file", config, || Connection::open(path))?;
        Ok(Self { conn, mode: "file" })
    }

    /// Opens a private in-memory database and applies all migrations.
    pub fn open_in_memory() -> DbResult<Self> {
        Self::open_in_memory_with(&DatabaseConfig::default())
    }

    /// Opens an in-memory database using explicit connection settings.
    pub fn open_in_memory_with(config: &DatabaseConfig) -> DbResult<Self> {
        let conn = open_connection("memory", config, Connection::open_in_memory)?;
        Ok(Self {
            conn,
            mode: "memory",
        })
    }

    /// Default session used when no ambient transaction is supplied.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Closes the underlying connection, surfacing any close-time error.
    ///
    /// # Side effects
    /// - Emits `db_close` logging event.
    pub fn close(self) -> DbResult<()> {
        let mode = self.mode;
        match self.conn.close() {
            Ok(()) => {
                info!("event=db_close module=db status=ok mode={mode}");
                Ok(())
            }
            Err((_conn, err)) => {
                error!(
                    "event=db_close module=db status=error mode={mode} error_code=db_close_failed error={err}"
                );
                Err(err.into())
            }
        }
    }
}

fn open_connection(
    mode: &'static str,
    config: &DatabaseConfig,
    opener: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = match opener() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, config) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, config: &DatabaseConfig) -> Result<(), DbError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    apply_migrations(conn)?;
    Ok(())
}
