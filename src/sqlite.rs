//! SQLite backend built on `rusqlite`.
//!
//! SQLite has no `COPY`: the bulk load runs one cached prepared statement over
//! the whole batch inside the merge transaction, which is the in-process
//! equivalent of a single round trip.
//!
//! Cancellation is sticky: once the flag passed to
//! [`SqliteTarget::watch_cancel`] is set, every later statement on the
//! connection fails with `SQLITE_INTERRUPT`, long statements are stopped by a
//! progress handler, and the bulk load checks the flag between rows.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rusqlite::{Connection, Transaction, TransactionBehavior, ffi, params};

use crate::row::Row;
use crate::schema::{Schema, is_identifier, numbered_question};
use crate::store::{StagingTransaction, UpsertTarget};

/// Virtual machine steps between two polls of the cancel flag.
const PROGRESS_OPS: i32 = 1_000;

/// SQL text prepared once per target.
#[derive(Debug)]
struct Statements {
    upsert: String,
    staging_insert: String,
    merge: String,
    truncate: String,
}

impl Statements {
    fn new(schema: &Schema) -> Self {
        Self {
            upsert: schema.upsert_sql(numbered_question),
            staging_insert: schema.staging_insert_sql(numbered_question),
            merge: schema.merge_sql(),
            truncate: format!("DELETE FROM {}", schema.staging()),
        }
    }
}

/// Strips an optional `sqlite://` scheme from a connection string.
fn sqlite_path(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .unwrap_or(database_url)
}

fn interrupted() -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        ffi::Error::new(ffi::SQLITE_INTERRUPT),
        Some("cancelled".to_string()),
    )
}

fn check_cancel(cancel: Option<&AtomicBool>) -> rusqlite::Result<()> {
    match cancel {
        Some(flag) if flag.load(Ordering::SeqCst) => Err(interrupted()),
        _ => Ok(()),
    }
}

/// Rejects table names that would not be safe to splice into SQL.
fn checked_table(table: &str) -> rusqlite::Result<&str> {
    if is_identifier(table) {
        Ok(table)
    } else {
        Err(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_MISUSE),
            Some(format!("`{table}` is not a valid table name")),
        ))
    }
}

/// An SQLite database holding the target and staging tables.
#[derive(Debug)]
pub struct SqliteTarget {
    conn: Connection,
    schema: Schema,
    sql: Statements,
    cancel: Option<Arc<AtomicBool>>,
}

impl SqliteTarget {
    /// Opens the database named by `database_url`: a path, a `file:` URI,
    /// `:memory:`, or any of those behind a `sqlite://` prefix.
    ///
    /// # Errors
    ///
    /// Returns the `rusqlite` error if the database cannot be opened or
    /// configured.
    pub fn open(database_url: &str, schema: Schema) -> rusqlite::Result<Self> {
        Self::from_connection(Connection::open(sqlite_path(database_url))?, schema)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns the `rusqlite` error if the database cannot be opened.
    pub fn open_in_memory(schema: Schema) -> rusqlite::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, schema)
    }

    /// Wraps an existing connection.
    ///
    /// # Errors
    ///
    /// Returns the `rusqlite` error if the connection cannot be configured.
    pub fn from_connection(conn: Connection, schema: Schema) -> rusqlite::Result<Self> {
        // In-memory databases silently keep their "memory" journal.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self {
            sql: Statements::new(&schema),
            conn,
            schema,
            cancel: None,
        })
    }

    /// Makes `cancel` abort work on this connection once it is set.
    ///
    /// Statements that are running or started afterwards fail with
    /// `SQLITE_INTERRUPT`, so an open merge transaction is rolled back rather
    /// than committed.
    ///
    /// # Errors
    ///
    /// Returns the `rusqlite` error if the progress handler cannot be installed.
    pub fn watch_cancel(&mut self, cancel: Arc<AtomicBool>) -> rusqlite::Result<()> {
        let flag = Arc::clone(&cancel);
        self.conn
            .progress_handler(PROGRESS_OPS, Some(move || flag.load(Ordering::SeqCst)))?;
        self.cancel = Some(cancel);
        Ok(())
    }

    /// The underlying connection.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Every row of `table`, ordered by `id`.
    ///
    /// # Errors
    ///
    /// Returns the `rusqlite` error if `table` is not a plain identifier or
    /// the query fails.
    pub fn load_rows(&self, table: &str) -> rusqlite::Result<Vec<Row>> {
        let table = checked_table(table)?;
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT id, value FROM {table} ORDER BY id"))?;
        stmt.query_map([], |r| {
            Ok(Row {
                id: r.get(0)?,
                value: r.get::<_, Option<String>>(1)?.unwrap_or_default(),
            })
        })?
        .collect()
    }
}

impl UpsertTarget for SqliteTarget {
    type Error = rusqlite::Error;
    type Staging<'a> = SqliteStaging<'a>;

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn execute(&mut self, sql: &str) -> rusqlite::Result<()> {
        self.conn.execute_batch(sql)
    }

    fn upsert_row(&mut self, row: &Row) -> rusqlite::Result<()> {
        check_cancel(self.cancel.as_deref())?;
        self.conn
            .prepare_cached(&self.sql.upsert)?
            .execute(params![row.id, row.value])?;
        Ok(())
    }

    fn table_exists(&mut self, table: &str) -> rusqlite::Result<bool> {
        self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [table],
            |r| r.get(0),
        )
    }

    fn count_rows(&mut self, table: &str) -> rusqlite::Result<u64> {
        let table = checked_table(table)?;
        let count: i64 = self
            .conn
            .query_row(&Schema::count_sql(table), [], |r| r.get(0))?;
        Ok(count.unsigned_abs())
    }

    fn begin_staged(&mut self) -> rusqlite::Result<SqliteStaging<'_>> {
        // Immediate: take the write lock up front so no other writer can
        // touch the staging table while the batch sits in it.
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(SqliteStaging {
            tx,
            sql: &self.sql,
            cancel: self.cancel.as_deref(),
        })
    }
}

/// An open staged-merge transaction on an [`SqliteTarget`].
///
/// Dropping it without calling [`StagingTransaction::commit`] rolls back.
pub struct SqliteStaging<'c> {
    tx: Transaction<'c>,
    sql: &'c Statements,
    cancel: Option<&'c AtomicBool>,
}

impl StagingTransaction for SqliteStaging<'_> {
    type Error = rusqlite::Error;

    fn bulk_load(&mut self, rows: &[Row]) -> rusqlite::Result<u64> {
        let mut stmt = self.tx.prepare_cached(&self.sql.staging_insert)?;
        let mut loaded = 0u64;
        for row in rows {
            check_cancel(self.cancel)?;
            stmt.execute(params![row.id, row.value])?;
            loaded += 1;
        }
        Ok(loaded)
    }

    fn merge_into_target(&mut self) -> rusqlite::Result<u64> {
        let inserted = self.tx.execute(&self.sql.merge, [])?;
        Ok(inserted as u64)
    }

    fn truncate_staging(&mut self) -> rusqlite::Result<()> {
        self.tx.execute(&self.sql.truncate, [])?;
        Ok(())
    }

    fn commit(self) -> rusqlite::Result<()> {
        check_cancel(self.cancel)?;
        self.tx.commit()
    }
}
