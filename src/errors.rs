//! Submodule defining the errors used across the crate.

use core::fmt;

/// Boxed backend error, so that every storage engine can share [`Error`].
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The step of the staged-merge protocol that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeStage {
    /// Opening the transaction.
    Begin,
    /// Loading the batch into the staging table.
    BulkLoad,
    /// Moving staging rows into the target table.
    Merge,
    /// Emptying the staging table.
    Truncate,
    /// Committing the transaction.
    Commit,
}

impl fmt::Display for MergeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Begin => "begin",
            Self::BulkLoad => "bulk load",
            Self::Merge => "merge",
            Self::Truncate => "truncate",
            Self::Commit => "commit",
        })
    }
}

/// Coarse failure classification used when reporting benchmark outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Configuration was missing or malformed.
    Config,
    /// Schema reset or verification failed.
    Setup,
    /// A per-row upsert failed.
    DirectUpsert,
    /// The staged bulk-load-and-merge transaction failed.
    StagedMerge,
    /// The run was interrupted.
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Config => "config",
            Self::Setup => "setup",
            Self::DirectUpsert => "direct upsert",
            Self::StagedMerge => "staged merge",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Errors that can occur while preparing or running an ingestion benchmark.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration key is missing or holds an invalid value.
    #[error("invalid configuration for `{key}`: {reason}")]
    Config {
        /// The environment key that was inspected.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// The requested number of rows does not fit the `i32` identifier domain.
    #[error("row count {0} exceeds the identifier range")]
    RowCount(usize),
    /// A table name is not a plain SQL identifier.
    #[error("`{0}` is not a valid table name")]
    InvalidIdentifier(String),
    /// A schema statement failed.
    #[error("schema statement `{statement}` failed: {source}")]
    Setup {
        /// The statement that failed.
        statement: String,
        /// The backend error.
        #[source]
        source: BackendError,
    },
    /// The database state did not match what the benchmark requires.
    #[error("verification failed: {0}")]
    Verification(String),
    /// A per-row upsert failed; earlier rows in the same call stay committed.
    #[error("upsert of row {id} failed: {source}")]
    DirectUpsert {
        /// Identifier of the first row that failed.
        id: i32,
        /// The backend error.
        #[source]
        source: BackendError,
    },
    /// The staged merge failed and its transaction was rolled back.
    #[error("staged merge failed during {stage}: {source}")]
    StagedMerge {
        /// The protocol step that failed.
        stage: MergeStage,
        /// The backend error.
        #[source]
        source: BackendError,
    },
    /// The run was interrupted before completion.
    #[error("benchmark cancelled")]
    Cancelled,
    /// Writing benchmark results failed.
    #[error("cannot write results: {0}")]
    Output(#[from] csv::Error),
}

impl Error {
    /// Wraps a backend error raised by a schema statement.
    pub fn setup(statement: impl Into<String>, source: impl Into<BackendError>) -> Self {
        Self::Setup {
            statement: statement.into(),
            source: source.into(),
        }
    }

    /// Wraps a backend error raised while upserting row `id`.
    pub fn direct_upsert(id: i32, source: impl Into<BackendError>) -> Self {
        Self::DirectUpsert {
            id,
            source: source.into(),
        }
    }

    /// Wraps a backend error raised during `stage` of a staged merge.
    pub fn staged_merge(stage: MergeStage, source: impl Into<BackendError>) -> Self {
        Self::StagedMerge {
            stage,
            source: source.into(),
        }
    }

    /// The coarse classification of this error.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Config { .. } | Self::RowCount(_) | Self::InvalidIdentifier(_) => {
                FailureKind::Config
            }
            Self::Setup { .. } | Self::Verification(_) | Self::Output(_) => FailureKind::Setup,
            Self::DirectUpsert { .. } => FailureKind::DirectUpsert,
            Self::StagedMerge { .. } => FailureKind::StagedMerge,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_merge_message_names_stage() {
        let err = Error::staged_merge(MergeStage::Truncate, "disk full");
        assert_eq!(
            err.to_string(),
            "staged merge failed during truncate: disk full"
        );
        assert_eq!(err.kind(), FailureKind::StagedMerge);
    }

    #[test]
    fn test_direct_upsert_is_distinct_from_staged_merge() {
        let direct = Error::direct_upsert(7, "constraint");
        let staged = Error::staged_merge(MergeStage::Merge, "constraint");
        assert_ne!(direct.kind(), staged.kind());
        assert!(direct.to_string().contains("row 7"));
    }

    #[test]
    fn test_config_kinds() {
        assert_eq!(Error::RowCount(usize::MAX).kind(), FailureKind::Config);
        assert_eq!(
            Error::InvalidIdentifier("a b".into()).kind(),
            FailureKind::Config
        );
        assert_eq!(Error::Cancelled.kind(), FailureKind::Cancelled);
    }
}
