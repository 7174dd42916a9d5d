//! The two ingestion strategies under comparison.

use core::fmt;

use tracing::{debug, warn};

use crate::errors::{BackendError, Error, MergeStage};
use crate::row::Row;
use crate::store::{StagingTransaction, UpsertTarget};

/// Which ingestion strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strategy {
    /// One autocommitted upsert per row.
    DirectUpsert,
    /// Bulk load into staging, merge and truncate in one transaction.
    StagedMerge,
}

impl Strategy {
    /// Both strategies, in reporting order.
    pub const ALL: [Self; 2] = [Self::DirectUpsert, Self::StagedMerge];

    /// Short label used for benchmark ids and CSV columns.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::DirectUpsert => "direct_upsert",
            Self::StagedMerge => "staged_merge",
        }
    }

    /// Runs this strategy over `rows`.
    ///
    /// # Errors
    ///
    /// Propagates the error of [`direct_upsert`] or [`staged_merge`].
    pub fn run<T: UpsertTarget>(self, target: &mut T, rows: &[Row]) -> Result<(), Error> {
        match self {
            Self::DirectUpsert => direct_upsert(target, rows),
            Self::StagedMerge => staged_merge(target, rows).map(drop),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Upserts `rows` one at a time, in order, stopping at the first failure.
///
/// Each upsert commits on its own: rows before the failing one stay in the
/// target table.
///
/// # Errors
///
/// Returns [`Error::DirectUpsert`] carrying the id of the first failing row.
pub fn direct_upsert<T: UpsertTarget>(target: &mut T, rows: &[Row]) -> Result<(), Error> {
    for row in rows {
        target
            .upsert_row(row)
            .map_err(|e| Error::direct_upsert(row.id, e))?;
    }
    debug!(rows = rows.len(), "direct upsert done");
    Ok(())
}

/// Counts reported by a successful [`staged_merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeSummary {
    /// Rows loaded into the staging table.
    pub loaded: u64,
    /// Rows newly inserted into the target table; the rest conflicted.
    pub inserted: u64,
}

/// Loads `rows` into the staging table, merges them into the target table
/// skipping existing ids, and empties the staging table, all in one
/// transaction.
///
/// On any failure the transaction handle is dropped before returning, which
/// rolls back the load and any partial merge or truncate.
///
/// # Errors
///
/// Returns [`Error::StagedMerge`] naming the step that failed.
pub fn staged_merge<T: UpsertTarget>(target: &mut T, rows: &[Row]) -> Result<MergeSummary, Error> {
    let mut tx = target
        .begin_staged()
        .map_err(|e| Error::staged_merge(MergeStage::Begin, e))?;

    let loaded = tx.bulk_load(rows).map_err(|e| rolled_back(MergeStage::BulkLoad, e))?;
    debug!(loaded, "staging loaded");

    let inserted = tx
        .merge_into_target()
        .map_err(|e| rolled_back(MergeStage::Merge, e))?;
    debug!(inserted, skipped = loaded.saturating_sub(inserted), "staging merged");

    tx.truncate_staging()
        .map_err(|e| rolled_back(MergeStage::Truncate, e))?;
    tx.commit()
        .map_err(|e| rolled_back(MergeStage::Commit, e))?;

    Ok(MergeSummary { loaded, inserted })
}

fn rolled_back(stage: MergeStage, source: impl Into<BackendError>) -> Error {
    let err = Error::staged_merge(stage, source);
    warn!(%stage, error = %err, "staged merge failed, rolling back");
    err
}
