#![doc = include_str!("../README.md")]
#![deny(clippy::mod_module_files)]

pub mod config;
pub mod driver;
pub mod errors;
pub mod row;
pub mod schema;
pub mod sqlite;
pub mod store;
pub mod strategy;

pub use config::BenchConfig;
pub use driver::{Driver, RunReport, StrategyOutcome, StrategyReport};
pub use errors::{BackendError, Error, FailureKind, MergeStage};
pub use row::{Row, RowSource, generate_rows};
pub use schema::{Schema, initialize};
pub use sqlite::SqliteTarget;
pub use store::{StagingTransaction, UpsertTarget};
pub use strategy::{MergeSummary, Strategy, direct_upsert, staged_merge};
