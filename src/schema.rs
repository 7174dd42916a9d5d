//! Submodule defining the target/staging table pair and the schema initializer.
//!
//! Both tables share the same shape: an `INTEGER PRIMARY KEY` column `id` and a
//! nullable `TEXT` column `value`. The statements produced here use syntax that
//! both SQLite and PostgreSQL accept, so every backend builds its queries from
//! the same [`Schema`].

use tracing::info;

use crate::errors::Error;
use crate::store::UpsertTarget;

/// Default name of the durable target table.
pub const DEFAULT_TARGET_TABLE: &str = "benchmark_test";
/// Default name of the transient staging table.
pub const DEFAULT_STAGING_TABLE: &str = "benchmark_staging";

/// Names of the target and staging tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    target: String,
    staging: String,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET_TABLE.to_string(),
            staging: DEFAULT_STAGING_TABLE.to_string(),
        }
    }
}

/// Returns whether `name` is a plain, unquoted SQL identifier.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

impl Schema {
    /// Creates a schema for the given table names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if a name is not a plain SQL
    /// identifier, or if both names are equal.
    pub fn new(target: &str, staging: &str) -> Result<Self, Error> {
        for name in [target, staging] {
            if !is_identifier(name) {
                return Err(Error::InvalidIdentifier(name.to_string()));
            }
        }
        if target.eq_ignore_ascii_case(staging) {
            return Err(Error::InvalidIdentifier(staging.to_string()));
        }
        Ok(Self {
            target: target.to_string(),
            staging: staging.to_string(),
        })
    }

    /// Name of the target table.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Name of the staging table.
    #[must_use]
    pub fn staging(&self) -> &str {
        &self.staging
    }

    /// Statements that drop and recreate both tables, in execution order.
    #[must_use]
    pub fn reset_statements(&self) -> Vec<String> {
        let mut statements = Vec::with_capacity(4);
        for table in [&self.target, &self.staging] {
            statements.push(format!("DROP TABLE IF EXISTS {table}"));
        }
        for table in [&self.target, &self.staging] {
            statements.push(format!(
                "CREATE TABLE {table} (id INTEGER PRIMARY KEY, value TEXT)"
            ));
        }
        statements
    }

    /// Parameterized per-row upsert into the target table.
    ///
    /// `placeholders` renders the n-th (1-based) bind parameter, since SQLite
    /// and PostgreSQL spell them differently.
    #[must_use]
    pub fn upsert_sql(&self, placeholders: fn(usize) -> String) -> String {
        format!(
            "INSERT INTO {} (id, value) VALUES ({}, {}) ON CONFLICT (id) DO NOTHING",
            self.target,
            placeholders(1),
            placeholders(2),
        )
    }

    /// Parameterized single-row insert into the staging table.
    #[must_use]
    pub fn staging_insert_sql(&self, placeholders: fn(usize) -> String) -> String {
        format!(
            "INSERT INTO {} (id, value) VALUES ({}, {})",
            self.staging,
            placeholders(1),
            placeholders(2),
        )
    }

    /// Set-based merge of every staging row into the target table.
    ///
    /// Rows whose `id` already exists in the target are skipped. The
    /// `WHERE true` disambiguates the upsert clause from a join constraint
    /// in SQLite's grammar.
    #[must_use]
    pub fn merge_sql(&self) -> String {
        format!(
            "INSERT INTO {target} (id, value) SELECT id, value FROM {staging} WHERE true \
             ON CONFLICT (id) DO NOTHING",
            target = self.target,
            staging = self.staging,
        )
    }

    /// Row count query for `table`.
    #[must_use]
    pub fn count_sql(table: &str) -> String {
        format!("SELECT COUNT(*) FROM {table}")
    }

    /// Fails unless `table` was found after a reset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Verification`] when `exists` is false.
    pub fn check_exists(table: &str, exists: bool) -> Result<(), Error> {
        if exists {
            Ok(())
        } else {
            Err(Error::Verification(format!("table `{table}` does not exist")))
        }
    }

    /// Fails unless `table` holds no rows after a reset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Verification`] when `rows` is not zero.
    pub fn check_empty(table: &str, rows: u64) -> Result<(), Error> {
        if rows == 0 {
            Ok(())
        } else {
            Err(Error::Verification(format!(
                "table `{table}` holds {rows} rows after reset"
            )))
        }
    }
}

/// `?1`, `?2`, ... placeholders.
#[must_use]
pub fn numbered_question(n: usize) -> String {
    format!("?{n}")
}

/// `$1`, `$2`, ... placeholders.
#[must_use]
pub fn numbered_dollar(n: usize) -> String {
    format!("${n}")
}

/// Drops and recreates both tables, then checks they exist and are empty.
///
/// Every statement is checked: a failure to drop or create is reported with
/// the offending statement rather than ignored.
///
/// # Errors
///
/// Returns [`Error::Setup`] when a statement fails, or
/// [`Error::Verification`] when a table is missing or non-empty afterwards.
pub fn initialize<T: UpsertTarget>(target: &mut T) -> Result<(), Error> {
    let schema = target.schema().clone();
    for statement in schema.reset_statements() {
        target
            .execute(&statement)
            .map_err(|e| Error::setup(&statement, e))?;
    }
    verify_empty(target, &schema)?;
    info!(
        target_table = schema.target(),
        staging_table = schema.staging(),
        "schema reset"
    );
    Ok(())
}

/// Checks that both tables exist and hold zero rows.
///
/// # Errors
///
/// Returns [`Error::Verification`] when a table is missing or non-empty, or
/// [`Error::Setup`] if the check itself fails.
pub fn verify_empty<T: UpsertTarget>(target: &mut T, schema: &Schema) -> Result<(), Error> {
    for table in [schema.target(), schema.staging()] {
        let exists = target
            .table_exists(table)
            .map_err(|e| Error::setup(format!("table_exists({table})"), e))?;
        Schema::check_exists(table, exists)?;
        let rows = target
            .count_rows(table)
            .map_err(|e| Error::setup(Schema::count_sql(table), e))?;
        Schema::check_empty(table, rows)?;
    }
    Ok(())
}
