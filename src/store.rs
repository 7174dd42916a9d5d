//! Submodule defining the storage seam the ingestion strategies run against.
//!
//! A backend implements [`UpsertTarget`] for autocommit operations and hands
//! out a [`StagingTransaction`] for the staged-merge protocol. Strategies only
//! see these two traits, never raw connections.

use crate::row::Row;
use crate::schema::Schema;

/// A database holding a target table and a staging table.
pub trait UpsertTarget {
    /// Backend error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Transaction-scoped handle used by the staged merge.
    type Staging<'a>: StagingTransaction<Error = Self::Error>
    where
        Self: 'a;

    /// Tables this target operates on.
    fn schema(&self) -> &Schema;

    /// Executes a single statement that returns no rows, outside any
    /// explicit transaction.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the statement fails.
    fn execute(&mut self, sql: &str) -> Result<(), Self::Error>;

    /// Inserts `row` into the target table, leaving an existing row with the
    /// same `id` untouched. Each call is its own unit of work.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the statement fails.
    fn upsert_row(&mut self, row: &Row) -> Result<(), Self::Error>;

    /// Returns whether `table` exists.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the catalog lookup fails.
    fn table_exists(&mut self, table: &str) -> Result<bool, Self::Error>;

    /// Returns the number of rows in `table`.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the query fails.
    fn count_rows(&mut self, table: &str) -> Result<u64, Self::Error>;

    /// Opens a transaction for the staged merge.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the transaction cannot be started.
    fn begin_staged(&mut self) -> Result<Self::Staging<'_>, Self::Error>;
}

/// The operations of one staged-merge transaction.
///
/// Nothing done through this handle is visible outside the transaction until
/// [`commit`](Self::commit) succeeds. Dropping the handle without committing
/// rolls every operation back.
pub trait StagingTransaction {
    /// Backend error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Loads all `rows` into the staging table, returning the number loaded.
    ///
    /// # Errors
    ///
    /// Returns the backend error if any row cannot be loaded, including a
    /// duplicate `id` inside the batch.
    fn bulk_load(&mut self, rows: &[Row]) -> Result<u64, Self::Error>;

    /// Inserts every staging row into the target table, skipping identifiers
    /// already present there. Returns the number of rows inserted.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the statement fails.
    fn merge_into_target(&mut self) -> Result<u64, Self::Error>;

    /// Removes every row from the staging table.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the statement fails.
    fn truncate_staging(&mut self) -> Result<(), Self::Error>;

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the commit fails; the transaction is then
    /// rolled back.
    fn commit(self) -> Result<(), Self::Error>;
}
