//! Unit-of-work handle and session resolution helpers.
//!
//! # Responsibility
//! - Own one SQLite transaction plus the rows staged against it.
//! - Resolve "ambient transaction if supplied, else implicit scope" for writes.
//! - Resolve "ambient session if supplied, else default connection" for reads.
//!
//! # Invariants
//! - Staged rows reach SQLite only on `flush`, `session` or `commit`.
//! - Reads through an ambient context always observe its staged rows.
//! - Dropping an uncommitted context rolls the transaction back.

use super::{Database, DbError, DbResult};
use log::{debug, info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::time::Instant;
use uuid::Uuid;

/// Row shape that can be written by a transaction flush.
///
/// Implemented by each store for its own entity so SQL stays inside the
/// repository boundary.
pub trait PersistRow {
    /// Target table name, used for diagnostics only.
    fn table(&self) -> &'static str;
    /// Stable primary key of the staged row.
    fn row_id(&self) -> Uuid;
    fn insert_into(&self, conn: &Connection) -> rusqlite::Result<()>;
    fn update_in(&self, conn: &Connection) -> rusqlite::Result<()>;
}

enum StagedWrite {
    Insert(Box<dyn PersistRow>),
    Update(Box<dyn PersistRow>),
}

/// Active unit of work shared by every call issued with the same context.
pub struct TransactionContext<'db> {
    tx: Transaction<'db>,
    id: Uuid,
    started_at: Instant,
    staged: Vec<StagedWrite>,
    flushed_writes: usize,
}

impl<'db> TransactionContext<'db> {
    /// Starts an immediate transaction on the database's shared connection.
    ///
    /// Fails when another transaction is already open on the same `Database`.
    pub fn begin(db: &'db Database) -> DbResult<Self> {
        let tx = Transaction::new_unchecked(db.connection(), TransactionBehavior::Immediate)?;
        let id = Uuid::new_v4();
        debug!("event=tx_begin module=db status=ok tx_id={id}");
        Ok(Self {
            tx,
            id,
            started_at: Instant::now(),
            staged: Vec::new(),
            flushed_writes: 0,
        })
    }

    /// Identifier used to correlate log lines of one unit of work.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of rows staged but not yet written.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Number of staged rows already written inside this transaction.
    pub fn flushed_writes(&self) -> usize {
        self.flushed_writes
    }

    /// Marks new rows for insertion at the next flush.
    pub fn persist_new<R>(&mut self, rows: impl IntoIterator<Item = R>)
    where
        R: PersistRow + 'static,
    {
        self.staged.extend(
            rows.into_iter()
                .map(|row| StagedWrite::Insert(Box::new(row))),
        );
    }

    /// Marks merged rows for update at the next flush.
    pub fn persist_changed<R>(&mut self, rows: impl IntoIterator<Item = R>)
    where
        R: PersistRow + 'static,
    {
        self.staged.extend(
            rows.into_iter()
                .map(|row| StagedWrite::Update(Box::new(row))),
        );
    }

    /// Writes every staged row in staging order.
    pub fn flush(&mut self) -> DbResult<()> {
        if self.staged.is_empty() {
            return Ok(());
        }

        let pending = std::mem::take(&mut self.staged);
        let count = pending.len();
        for write in pending {
            let (op, row, result) = match &write {
                StagedWrite::Insert(row) => ("insert", row, row.insert_into(&self.tx)),
                StagedWrite::Update(row) => ("update", row, row.update_in(&self.tx)),
            };
            if let Err(err) = result {
                warn!(
                    "event=tx_flush module=db status=error tx_id={} op={} table={} row_id={} error={}",
                    self.id,
                    op,
                    row.table(),
                    row.row_id(),
                    err
                );
                return Err(err.into());
            }
        }

        self.flushed_writes += count;
        debug!(
            "event=tx_flush module=db status=ok tx_id={} writes={count}",
            self.id
        );
        Ok(())
    }

    /// Flushes staged rows and returns the transactional session.
    pub fn session(&mut self) -> DbResult<&Connection> {
        self.flush()?;
        let conn: &Connection = &self.tx;
        Ok(conn)
    }

    /// Flushes staged rows and commits the transaction.
    pub fn commit(mut self) -> DbResult<()> {
        self.flush()?;
        let Self {
            tx,
            id,
            started_at,
            flushed_writes,
            ..
        } = self;
        tx.commit()?;
        info!(
            "event=tx_commit module=db status=ok tx_id={id} writes={flushed_writes} duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Discards staged rows and rolls the transaction back.
    pub fn rollback(self) -> DbResult<()> {
        let Self {
            tx,
            id,
            started_at,
            staged,
            ..
        } = self;
        tx.rollback()?;
        info!(
            "event=tx_rollback module=db status=ok tx_id={id} discarded={} duration_ms={}",
            staged.len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }
}

/// Runs a write inside the ambient transaction, or inside an implicit one
/// scoped to this call when the caller supplied none.
///
/// Never opens a second transaction while an ambient one is present.
pub fn with_transaction<T, E>(
    db: &Database,
    ambient: Option<&mut TransactionContext<'_>>,
    operation: impl FnOnce(&mut TransactionContext<'_>) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<DbError>,
{
    if let Some(tx) = ambient {
        return operation(tx);
    }

    let mut tx = TransactionContext::begin(db)?;
    match operation(&mut tx) {
        Ok(output) => {
            tx.commit()?;
            Ok(output)
        }
        Err(err) => {
            let tx_id = tx.id();
            if let Err(rollback_err) = tx.rollback() {
                warn!(
                    "event=tx_rollback module=db status=error tx_id={tx_id} error={rollback_err}"
                );
            }
            Err(err)
        }
    }
}

/// Runs a read against the ambient session if present, else the default
/// connection. No transaction is started for reads.
pub fn with_session<T, E>(
    db: &Database,
    ambient: Option<&mut TransactionContext<'_>>,
    read: impl FnOnce(&Connection) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<DbError>,
{
    match ambient {
        Some(tx) => {
            let conn = tx.session()?;
            read(conn)
        }
        None => read(db.connection()),
    }
}

#[cfg(test)]
mod tests {
    use super::{with_transaction, PersistRow, TransactionContext};
    use crate::db::{Database, DbError};
    use rusqlite::{params, Connection};
    use uuid::Uuid;

    #[derive(Clone)]
    struct ProbeRow {
        id: Uuid,
        handle: &'static str,
    }

    impl PersistRow for ProbeRow {
        fn table(&self) -> &'static str {
            "products"
        }

        fn row_id(&self) -> Uuid {
            self.id
        }

        fn insert_into(&self, conn: &Connection) -> rusqlite::Result<()> {
            conn.execute(
                "INSERT INTO products (id, title, handle, created_at, updated_at)
                 VALUES (?1, 'probe', ?2, 0, 0);",
                params![self.id.to_string(), self.handle],
            )?;
            Ok(())
        }

        fn update_in(&self, conn: &Connection) -> rusqlite::Result<()> {
            conn.execute(
                "UPDATE products SET handle = ?2 WHERE id = ?1;",
                params![self.id.to_string(), self.handle],
            )?;
            Ok(())
        }
    }

    fn count_products(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM products;", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn staged_rows_are_written_only_on_flush() {
        let db = Database::open_in_memory().unwrap();
        let mut tx = TransactionContext::begin(&db).unwrap();
        tx.persist_new([ProbeRow {
            id: Uuid::new_v4(),
            handle: "probe",
        }]);

        assert_eq!(tx.staged_len(), 1);
        assert_eq!(count_products(db.connection()), 0);

        let conn = tx.session().unwrap();
        assert_eq!(count_products(conn), 1);
        assert_eq!(tx.staged_len(), 0);
        assert_eq!(tx.flushed_writes(), 1);
    }

    #[test]
    fn dropped_context_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        {
            let mut tx = TransactionContext::begin(&db).unwrap();
            tx.persist_new([ProbeRow {
                id: Uuid::new_v4(),
                handle: "dropped",
            }]);
            tx.flush().unwrap();
        }
        assert_eq!(count_products(db.connection()), 0);
    }

    #[test]
    fn implicit_scope_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<(), DbError> = with_transaction(&db, None, |tx| {
            tx.persist_new([ProbeRow {
                id: Uuid::new_v4(),
                handle: "rolled-back",
            }]);
            tx.flush()?;
            Err(DbError::UnsupportedSchemaVersion {
                db_version: 0,
                latest_supported: 0,
            })
        });

        assert!(result.is_err());
        assert_eq!(count_products(db.connection()), 0);
    }

    #[test]
    fn second_begin_on_same_database_fails() {
        let db = Database::open_in_memory().unwrap();
        let _outer = TransactionContext::begin(&db).unwrap();
        assert!(TransactionContext::begin(&db).is_err());
    }
}
