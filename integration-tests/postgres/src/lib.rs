//! PostgreSQL backend for the staged-upsert benchmark.
//!
//! Runs the same two strategies as the SQLite backend over the native
//! protocol: per-row upserts through a prepared statement, and a staged merge
//! that bulk-loads with binary `COPY .. FROM STDIN`, merges with a single
//! `INSERT .. SELECT .. ON CONFLICT DO NOTHING` and empties the staging table
//! with `TRUNCATE`, all inside one transaction.
//!
//! Also provides testcontainers helpers to start a throwaway server.

use std::pin::pin;
use std::time::Duration;

use staged_upsert::schema::{is_identifier, numbered_dollar};
use staged_upsert::{Error, MergeStage, MergeSummary, Row, Schema};
use testcontainers::{
    ContainerAsync, GenericImage, ImageExt,
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
};
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::Type;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

/// Default PostgreSQL port inside the container.
pub const POSTGRES_PORT: u16 = 5432;

/// PostgreSQL versions to test against.
pub const PG_VERSIONS: &[&str] = &["14", "15", "16", "17"];

/// Start a PostgreSQL container.
///
/// # Arguments
///
/// * `version` - PostgreSQL version tag (e.g., "16")
///
/// # Returns
///
/// A running container and the host port mapped to PostgreSQL.
pub async fn start_postgres(version: &str) -> (ContainerAsync<GenericImage>, u16) {
    let tag = format!("{version}-alpine");
    let image = GenericImage::new("postgres", &tag)
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_USER", "test")
        .with_env_var("POSTGRES_PASSWORD", "test")
        .with_env_var("POSTGRES_DB", "testdb");

    let container = image
        .start()
        .await
        .expect("Failed to start PostgreSQL container");
    let host_port = container
        .get_host_port_ipv4(POSTGRES_PORT.tcp())
        .await
        .expect("Failed to get host port");

    (container, host_port)
}

/// Connection string for a container started by [`start_postgres`].
pub fn container_url(host_port: u16) -> String {
    format!("host=127.0.0.1 port={host_port} user=test password=test dbname=testdb")
}

/// Connect to PostgreSQL, retrying while the server finishes starting up.
///
/// The official image logs "ready to accept connections" once during its
/// init phase and restarts afterwards, so the first attempts may be refused.
pub async fn connect(database_url: &str) -> Result<Client, tokio_postgres::Error> {
    let mut attempts = 0;
    loop {
        match tokio_postgres::connect(database_url, NoTls).await {
            Ok((client, connection)) => {
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        eprintln!("PostgreSQL connection error: {e}");
                    }
                });
                return Ok(client);
            }
            Err(e) if attempts < 20 => {
                attempts += 1;
                debug!(attempts, error = %e, "PostgreSQL not ready yet");
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// A PostgreSQL database holding the target and staging tables.
pub struct PgTarget {
    client: Client,
    schema: Schema,
}

impl PgTarget {
    /// Wraps a connected client.
    pub fn new(client: Client, schema: Schema) -> Self {
        Self { client, schema }
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Tables this target operates on.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Drops and recreates both tables, checking every statement, then
    /// verifies both exist and are empty.
    pub async fn initialize(&mut self) -> Result<(), Error> {
        for statement in self.schema.reset_statements() {
            self.client
                .batch_execute(&statement)
                .await
                .map_err(|e| Error::setup(&statement, e))?;
        }
        for table in [self.schema.target(), self.schema.staging()] {
            let exists = self
                .table_exists(table)
                .await
                .map_err(|e| Error::setup(format!("table_exists({table})"), e))?;
            Schema::check_exists(table, exists)?;
            Schema::check_empty(table, self.count_rows(table).await?)?;
        }
        Ok(())
    }

    /// Upserts `rows` one statement at a time, stopping at the first failure.
    /// Rows before the failing one stay committed.
    pub async fn direct_upsert(&mut self, rows: &[Row]) -> Result<(), Error> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        let statement = self
            .client
            .prepare(&self.schema.upsert_sql(numbered_dollar))
            .await
            .map_err(|e| Error::direct_upsert(first.id, e))?;
        for row in rows {
            self.client
                .execute(&statement, &[&row.id, &row.value])
                .await
                .map_err(|e| Error::direct_upsert(row.id, e))?;
        }
        Ok(())
    }

    /// Bulk-loads `rows` into the staging table with binary `COPY`, merges them
    /// into the target skipping existing ids, and truncates the staging
    /// table, in one transaction.
    ///
    /// If any step fails the transaction is dropped unexecuted, which rolls
    /// it back. Cancelling the returned future has the same effect.
    pub async fn staged_merge(&mut self, rows: &[Row]) -> Result<MergeSummary, Error> {
        let copy_sql = format!(
            "COPY {} (id, value) FROM STDIN (FORMAT binary)",
            self.schema.staging()
        );
        let merge_sql = self.schema.merge_sql();
        let truncate_sql = format!("TRUNCATE {}", self.schema.staging());

        let tx = self
            .client
            .transaction()
            .await
            .map_err(|e| Error::staged_merge(MergeStage::Begin, e))?;

        let sink = tx
            .copy_in(copy_sql.as_str())
            .await
            .map_err(|e| rolled_back(MergeStage::BulkLoad, e))?;
        let mut writer = pin!(BinaryCopyInWriter::new(sink, &[Type::INT4, Type::TEXT]));
        for row in rows {
            writer
                .as_mut()
                .write(&[&row.id, &row.value])
                .await
                .map_err(|e| rolled_back(MergeStage::BulkLoad, e))?;
        }
        let loaded = writer
            .as_mut()
            .finish()
            .await
            .map_err(|e| rolled_back(MergeStage::BulkLoad, e))?;
        debug!(loaded, "staging loaded");

        let inserted = tx
            .execute(merge_sql.as_str(), &[])
            .await
            .map_err(|e| rolled_back(MergeStage::Merge, e))?;
        debug!(inserted, "staging merged");

        tx.batch_execute(&truncate_sql)
            .await
            .map_err(|e| rolled_back(MergeStage::Truncate, e))?;
        tx.commit()
            .await
            .map_err(|e| rolled_back(MergeStage::Commit, e))?;

        Ok(MergeSummary { loaded, inserted })
    }

    /// Executes `sql`, which may hold several statements.
    pub async fn execute(&self, sql: &str) -> Result<(), tokio_postgres::Error> {
        self.client.batch_execute(sql).await
    }

    /// Returns whether `table` exists in the current schema.
    pub async fn table_exists(&self, table: &str) -> Result<bool, tokio_postgres::Error> {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1)",
                &[&table],
            )
            .await?;
        Ok(row.get(0))
    }

    /// Returns the number of rows in `table`.
    pub async fn count_rows(&self, table: &str) -> Result<u64, Error> {
        let sql = Schema::count_sql(checked_table(table)?);
        let row = self
            .client
            .query_one(sql.as_str(), &[])
            .await
            .map_err(|e| Error::setup(&sql, e))?;
        Ok(row.get::<_, i64>(0).unsigned_abs())
    }

    /// Every row of `table`, ordered by `id`.
    pub async fn load_rows(&self, table: &str) -> Result<Vec<Row>, Error> {
        let sql = format!("SELECT id, value FROM {} ORDER BY id", checked_table(table)?);
        let rows = self
            .client
            .query(sql.as_str(), &[])
            .await
            .map_err(|e| Error::setup(&sql, e))?;
        Ok(rows
            .iter()
            .map(|r| Row {
                id: r.get(0),
                value: r.get::<_, Option<String>>(1).unwrap_or_default(),
            })
            .collect())
    }
}

fn checked_table(table: &str) -> Result<&str, Error> {
    if is_identifier(table) {
        Ok(table)
    } else {
        Err(Error::InvalidIdentifier(table.to_string()))
    }
}

fn rolled_back(stage: MergeStage, source: tokio_postgres::Error) -> Error {
    let err = Error::staged_merge(stage, source);
    warn!(%stage, error = %err, "staged merge failed, rolling back");
    err
}
