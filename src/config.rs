//! Benchmark configuration, loaded once at startup and passed by reference.

use std::path::PathBuf;

use crate::errors::Error;

/// Environment key holding the database connection string.
pub const DATABASE_URL: &str = "DATABASE_URL";
/// Environment key holding a comma-separated list of row counts.
pub const ROW_COUNTS: &str = "BENCH_ROW_COUNTS";
/// Environment key holding the number of timed iterations per strategy.
pub const ITERATIONS: &str = "BENCH_ITERATIONS";
/// Environment key holding the number of untimed warmup iterations.
pub const WARMUP: &str = "BENCH_WARMUP";
/// Environment key holding the directory results are written to.
pub const OUTPUT_DIR: &str = "BENCH_OUTPUT_DIR";
/// Pseudo-key reported when the `.env` file cannot be loaded.
pub const DOTENV: &str = ".env";

/// Row count used when none is configured.
pub const DEFAULT_ROW_COUNT: usize = 1_000_000;
/// Timed iterations used when none is configured.
pub const DEFAULT_ITERATIONS: u32 = 10;

/// Settings consumed by the benchmark driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    /// Connection string of the database under test.
    pub database_url: String,
    /// Row set sizes to benchmark, in order.
    pub row_counts: Vec<usize>,
    /// Timed iterations per strategy and row count.
    pub iterations: u32,
    /// Untimed iterations run before timing starts.
    pub warmup: u32,
    /// Directory `data.csv` is written to; empty means the current directory.
    pub output_dir: PathBuf,
}

impl BenchConfig {
    /// Creates a configuration with the default row count and iterations.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            row_counts: vec![DEFAULT_ROW_COUNT],
            iterations: DEFAULT_ITERATIONS,
            warmup: 0,
            output_dir: PathBuf::new(),
        }
    }

    /// Loads `.env` if present, then reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a `.env` file exists but cannot be read
    /// or parsed, if `DATABASE_URL` is missing, or if a numeric setting is
    /// malformed.
    pub fn from_env() -> Result<Self, Error> {
        check_dotenv(dotenvy::dotenv())?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `DATABASE_URL` is missing or a numeric
    /// setting is malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let database_url = lookup(DATABASE_URL)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| Error::Config {
                key: DATABASE_URL,
                reason: "not set".to_string(),
            })?;

        let mut config = Self::new(database_url);
        if let Some(raw) = lookup(ROW_COUNTS) {
            config.row_counts = parse_row_counts(&raw)?;
        }
        if let Some(raw) = lookup(ITERATIONS) {
            config.iterations = parse_number(ITERATIONS, &raw)?;
            if config.iterations == 0 {
                return Err(Error::Config {
                    key: ITERATIONS,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if let Some(raw) = lookup(WARMUP) {
            config.warmup = parse_number(WARMUP, &raw)?;
        }
        if let Some(raw) = lookup(OUTPUT_DIR) {
            config.output_dir = PathBuf::from(raw.trim());
        }
        Ok(config)
    }
}

/// A missing `.env` file is fine, the variables may come from the shell.
/// Anything else is reported.
fn check_dotenv<T>(loaded: Result<T, dotenvy::Error>) -> Result<(), Error> {
    match loaded {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(Error::Config {
            key: DOTENV,
            reason: e.to_string(),
        }),
    }
}

fn parse_number<N: core::str::FromStr>(key: &'static str, raw: &str) -> Result<N, Error>
where
    N::Err: core::fmt::Display,
{
    raw.trim().parse().map_err(|e| Error::Config {
        key,
        reason: format!("`{raw}`: {e}"),
    })
}

fn parse_row_counts(raw: &str) -> Result<Vec<usize>, Error> {
    let counts = raw
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            let count: usize = parse_number(ROW_COUNTS, part)?;
            if i32::try_from(count).is_err() {
                return Err(Error::RowCount(count));
            }
            Ok(count)
        })
        .collect::<Result<Vec<_>, _>>()?;
    if counts.is_empty() {
        return Err(Error::Config {
            key: ROW_COUNTS,
            reason: "no row counts given".to_string(),
        });
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_missing_database_url() {
        let err = BenchConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::Config { key: DATABASE_URL, .. }));
        let err = BenchConfig::from_lookup(lookup(&[(DATABASE_URL, "  ")])).unwrap_err();
        assert!(matches!(err, Error::Config { key: DATABASE_URL, .. }));
    }

    #[test]
    fn test_defaults() {
        let config = BenchConfig::from_lookup(lookup(&[(DATABASE_URL, "bench.db")])).unwrap();
        assert_eq!(config, BenchConfig::new("bench.db"));
        assert_eq!(config.row_counts, vec![DEFAULT_ROW_COUNT]);
        assert_eq!(config.iterations, DEFAULT_ITERATIONS);
        assert_eq!(config.warmup, 0);
        assert_eq!(config.output_dir, PathBuf::new());
    }

    #[test]
    fn test_overrides() {
        let config = BenchConfig::from_lookup(lookup(&[
            (DATABASE_URL, ":memory:"),
            (ROW_COUNTS, "1000, 10000,,100000"),
            (ITERATIONS, "3"),
            (WARMUP, "1"),
            (OUTPUT_DIR, "results/run1 "),
        ]))
        .unwrap();
        assert_eq!(config.row_counts, vec![1000, 10000, 100000]);
        assert_eq!(config.iterations, 3);
        assert_eq!(config.warmup, 1);
        assert_eq!(config.output_dir, PathBuf::from("results/run1"));
    }

    #[test]
    fn test_missing_dotenv_is_fine() {
        let path = std::env::temp_dir().join("staged-upsert-no-such-dir").join(".env");
        assert!(check_dotenv(dotenvy::from_path(&path)).is_ok());
    }

    #[test]
    fn test_malformed_dotenv_is_reported() {
        let dir = std::env::temp_dir().join(format!("staged-upsert-dotenv-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(".env");
        std::fs::write(&path, "=no key on this line\n").unwrap();

        let err = check_dotenv(dotenvy::from_path(&path)).unwrap_err();
        assert!(matches!(err, Error::Config { key: DOTENV, .. }), "{err:?}");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_rejects_bad_numbers() {
        let err = BenchConfig::from_lookup(lookup(&[(DATABASE_URL, "x"), (ITERATIONS, "ten")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config { key: ITERATIONS, .. }));

        let err = BenchConfig::from_lookup(lookup(&[(DATABASE_URL, "x"), (ITERATIONS, "0")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config { key: ITERATIONS, .. }));

        let err = BenchConfig::from_lookup(lookup(&[(DATABASE_URL, "x"), (ROW_COUNTS, ",")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config { key: ROW_COUNTS, .. }));

        let err = BenchConfig::from_lookup(lookup(&[
            (DATABASE_URL, "x"),
            (ROW_COUNTS, "4294967296"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::RowCount(4294967296)));
    }
}
