//! Standalone runner: benchmarks both ingestion strategies against the SQLite
//! database named by `DATABASE_URL` and writes `data.csv`.
//!
//! Settings come from the environment (or a `.env` file):
//!
//! - `DATABASE_URL`: database path, `file:` URI or `:memory:` (required)
//! - `BENCH_ROW_COUNTS`: comma-separated row counts (default `1000000`)
//! - `BENCH_ITERATIONS`: timed iterations per strategy (default 10)
//! - `BENCH_WARMUP`: untimed iterations per strategy (default 0)
//! - `BENCH_OUTPUT_DIR`: where `data.csv` goes (default current directory)
//!
//! Ctrl-C cancels the run: the statement in flight fails, an open merge
//! transaction rolls back and the runner exits with an error.
//!
//! Usage:
//!   `DATABASE_URL=bench.db cargo run --release`

use std::fs::File;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use staged_upsert::{BenchConfig, Driver, Error, Schema, SqliteTarget, StrategyOutcome};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn run() -> Result<bool, Error> {
    let config = BenchConfig::from_env()?;
    let mut target = SqliteTarget::open(&config.database_url, Schema::default())
        .map_err(|e| Error::setup(format!("open {}", config.database_url), e))?;

    let driver = Driver::new(&config);
    target
        .watch_cancel(driver.cancel_flag())
        .map_err(|e| Error::setup("install progress handler", e))?;
    let cancel = driver.cancel_flag();
    if let Err(e) = ctrlc::set_handler(move || cancel.store(true, Ordering::SeqCst)) {
        error!("cannot install Ctrl-C handler: {e}");
    }

    info!(
        row_counts = ?config.row_counts,
        iterations = config.iterations,
        warmup = config.warmup,
        "starting benchmark"
    );
    let report = driver.run(&mut target)?;

    for outcome in &report.outcomes {
        match outcome {
            StrategyOutcome::Completed(r) => info!(
                "{:>14} {:>9} rows: mean {:>10.2} ms  median {:>10.2} ms  min {:>10.2} ms  max {:>10.2} ms  {:>12.0} rows/s",
                r.strategy.label(),
                r.row_count,
                r.mean().as_secs_f64() * 1e3,
                r.median().as_secs_f64() * 1e3,
                r.min().as_secs_f64() * 1e3,
                r.max().as_secs_f64() * 1e3,
                r.rows_per_sec(),
            ),
            StrategyOutcome::Failed {
                strategy,
                row_count,
                kind,
                message,
            } => error!("{strategy:>14} {row_count:>9} rows: FAILED ({kind}): {message}"),
            StrategyOutcome::Skipped {
                strategy,
                row_count,
            } => info!("{strategy:>14} {row_count:>9} rows: skipped after earlier failure"),
        }
    }

    let csv_path = config.output_dir.join("data.csv");
    let file = File::create(&csv_path)
        .map_err(|e| Error::Output(csv::Error::from(e)))?;
    report.write_csv(file)?;
    info!("results written to {}", csv_path.display());

    Ok(!report.has_failures())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
