//! Repeated, timed invocation of both strategies on a shared row set.
//!
//! For every configured row count the driver resets the schema once,
//! generates the rows once, and then runs each strategy `warmup` times
//! untimed followed by `iterations` timed runs. Only the strategy body is
//! inside the timed region. A failing iteration ends that strategy for the
//! rest of the run: its outcome is recorded as [`StrategyOutcome::Failed`]
//! and every later row count records it as [`StrategyOutcome::Skipped`].

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info};

use crate::config::BenchConfig;
use crate::errors::{Error, FailureKind};
use crate::row::{Row, generate_rows};
use crate::schema;
use crate::store::UpsertTarget;
use crate::strategy::Strategy;

/// Timings of one strategy over one row count.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyReport {
    /// The strategy that was timed.
    pub strategy: Strategy,
    /// Rows ingested per iteration.
    pub row_count: usize,
    /// Wall-clock time of every timed iteration.
    pub samples: Vec<Duration>,
}

impl StrategyReport {
    /// Sum of all samples.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.samples.iter().sum()
    }

    /// Mean iteration time, or zero without samples.
    #[must_use]
    pub fn mean(&self) -> Duration {
        match u32::try_from(self.samples.len()) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.total() / n,
        }
    }

    /// Median iteration time, or zero without samples.
    #[must_use]
    pub fn median(&self) -> Duration {
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        match sorted.len() {
            0 => Duration::ZERO,
            n if n % 2 == 1 => sorted[n / 2],
            n => (sorted[n / 2 - 1] + sorted[n / 2]) / 2,
        }
    }

    /// Fastest iteration.
    #[must_use]
    pub fn min(&self) -> Duration {
        self.samples.iter().copied().min().unwrap_or_default()
    }

    /// Slowest iteration.
    #[must_use]
    pub fn max(&self) -> Duration {
        self.samples.iter().copied().max().unwrap_or_default()
    }

    /// Mean nanoseconds per operation, one operation being a full batch.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ns_per_op(&self) -> f64 {
        self.mean().as_nanos() as f64
    }

    /// Rows ingested per second, based on the mean.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rows_per_sec(&self) -> f64 {
        let secs = self.mean().as_secs_f64();
        if secs > 0.0 {
            self.row_count as f64 / secs
        } else {
            0.0
        }
    }
}

/// How one strategy fared over one row count.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    /// Every iteration succeeded.
    Completed(StrategyReport),
    /// An iteration failed; no timings are reported.
    Failed {
        /// The strategy that failed.
        strategy: Strategy,
        /// Rows per iteration.
        row_count: usize,
        /// Failure classification.
        kind: FailureKind,
        /// Rendered error.
        message: String,
    },
    /// Not run because the strategy failed at an earlier row count.
    Skipped {
        /// The strategy that was skipped.
        strategy: Strategy,
        /// Rows per iteration.
        row_count: usize,
    },
}

impl StrategyOutcome {
    /// The strategy this outcome belongs to.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Completed(report) => report.strategy,
            Self::Failed { strategy, .. } | Self::Skipped { strategy, .. } => *strategy,
        }
    }

    /// Rows per iteration.
    #[must_use]
    pub fn row_count(&self) -> usize {
        match self {
            Self::Completed(report) => report.row_count,
            Self::Failed { row_count, .. } | Self::Skipped { row_count, .. } => *row_count,
        }
    }

    /// The timings, if the strategy completed.
    #[must_use]
    pub fn report(&self) -> Option<&StrategyReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Failed { .. } | Self::Skipped { .. } => None,
        }
    }
}

/// One line of the comparison CSV, in nanoseconds per operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CsvRecord {
    /// Rows per operation.
    pub row_count: usize,
    /// Mean ns per direct-upsert batch, empty if it failed.
    pub direct_upsert_op: Option<f64>,
    /// Mean ns per staged-merge batch, empty if it failed.
    pub staging_copy_op: Option<f64>,
}

/// All outcomes of a driver run, in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// One entry per `(row_count, strategy)` pair.
    pub outcomes: Vec<StrategyOutcome>,
}

impl RunReport {
    /// Outcome for `strategy` at `row_count`.
    #[must_use]
    pub fn find(&self, row_count: usize, strategy: Strategy) -> Option<&StrategyOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.row_count() == row_count && o.strategy() == strategy)
    }

    /// Whether any strategy failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o, StrategyOutcome::Failed { .. }))
    }

    /// One CSV record per distinct row count, in first-seen order.
    #[must_use]
    pub fn csv_records(&self) -> Vec<CsvRecord> {
        let mut counts: Vec<usize> = Vec::new();
        for outcome in &self.outcomes {
            if !counts.contains(&outcome.row_count()) {
                counts.push(outcome.row_count());
            }
        }
        counts
            .into_iter()
            .map(|row_count| {
                let op = |strategy| {
                    self.find(row_count, strategy)
                        .and_then(StrategyOutcome::report)
                        .map(StrategyReport::ns_per_op)
                };
                CsvRecord {
                    row_count,
                    direct_upsert_op: op(Strategy::DirectUpsert),
                    staging_copy_op: op(Strategy::StagedMerge),
                }
            })
            .collect()
    }

    /// Writes [`csv_records`](Self::csv_records) with a header line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Output`] if writing fails.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), Error> {
        let mut out = csv::Writer::from_writer(writer);
        for record in self.csv_records() {
            out.serialize(record)?;
        }
        out.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}

/// Runs both strategies as configured by a [`BenchConfig`].
#[derive(Debug)]
pub struct Driver<'c> {
    config: &'c BenchConfig,
    cancel: Arc<AtomicBool>,
}

impl<'c> Driver<'c> {
    /// Creates a driver for `config`.
    #[must_use]
    pub fn new(config: &'c BenchConfig) -> Self {
        Self {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that, once set, stops the run before the next iteration.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn check_cancelled(&self) -> Result<(), Error> {
        if self.cancel.load(Ordering::SeqCst) {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Runs every strategy for every configured row count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Setup`] or [`Error::Verification`] if the schema
    /// cannot be reset, [`Error::RowCount`] for an out-of-range row count,
    /// and [`Error::Cancelled`] once the cancel flag is set. Strategy
    /// failures are reported in the returned [`RunReport`] instead.
    pub fn run<T: UpsertTarget>(&self, target: &mut T) -> Result<RunReport, Error> {
        let mut report = RunReport::default();
        let mut failed: Vec<Strategy> = Vec::new();
        for &row_count in &self.config.row_counts {
            self.check_cancelled()?;
            if failed.len() == Strategy::ALL.len() {
                for strategy in Strategy::ALL {
                    report.outcomes.push(StrategyOutcome::Skipped { strategy, row_count });
                }
                continue;
            }
            schema::initialize(target)?;
            let rows = generate_rows(row_count)?;

            for strategy in Strategy::ALL {
                if failed.contains(&strategy) {
                    report.outcomes.push(StrategyOutcome::Skipped { strategy, row_count });
                    continue;
                }
                let outcome = match self.run_strategy(target, strategy, &rows) {
                    Ok(timings) => {
                        info!(
                            %strategy,
                            row_count,
                            iterations = timings.samples.len(),
                            mean_ms = timings.mean().as_secs_f64() * 1e3,
                            rows_per_sec = timings.rows_per_sec(),
                            "strategy finished"
                        );
                        StrategyOutcome::Completed(timings)
                    }
                    Err(_) if self.cancel.load(Ordering::SeqCst) => return Err(Error::Cancelled),
                    Err(Error::Cancelled) => return Err(Error::Cancelled),
                    Err(err) => {
                        error!(%strategy, row_count, kind = %err.kind(), error = %err, "strategy aborted");
                        failed.push(strategy);
                        StrategyOutcome::Failed {
                            strategy,
                            row_count,
                            kind: err.kind(),
                            message: err.to_string(),
                        }
                    }
                };
                report.outcomes.push(outcome);
            }
        }
        Ok(report)
    }

    /// Runs `strategy` over `rows` with the configured warmup and timed
    /// iterations, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first strategy error, or [`Error::Cancelled`].
    pub fn run_strategy<T: UpsertTarget>(
        &self,
        target: &mut T,
        strategy: Strategy,
        rows: &[Row],
    ) -> Result<StrategyReport, Error> {
        for _ in 0..self.config.warmup {
            self.check_cancelled()?;
            strategy.run(target, rows)?;
        }

        let mut samples = Vec::with_capacity(self.config.iterations as usize);
        for _ in 0..self.config.iterations {
            self.check_cancelled()?;
            let start = Instant::now();
            strategy.run(target, rows)?;
            samples.push(start.elapsed());
        }

        Ok(StrategyReport {
            strategy,
            row_count: rows.len(),
            samples,
        })
    }
}
