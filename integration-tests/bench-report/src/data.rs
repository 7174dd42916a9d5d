//! Data loading module: reads Criterion benchmark results from disk.
//!
//! Walks `target/criterion/*/*/new/` directories, parses `benchmark.json` for
//! metadata and `estimates.json` for timing data, and keeps the
//! `upsert/<backend>/<n>` groups written by the SQLite and PostgreSQL benches.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// The two strategies in display order, as Criterion function ids.
pub const STRATEGIES: &[&str] = &["direct_upsert", "staged_merge"];

/// Backends in display order, as they appear in group ids.
pub const BACKENDS: &[&str] = &["sqlite", "postgres"];

// ---------------------------------------------------------------------------
// Raw Criterion JSON shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CriterionBenchmark {
    group_id: String,
    function_id: String,
}

#[derive(Deserialize)]
struct ConfidenceInterval {
    lower_bound: f64,
    upper_bound: f64,
}

#[derive(Deserialize)]
struct Estimate {
    confidence_interval: ConfidenceInterval,
    point_estimate: f64,
}

#[derive(Deserialize)]
struct Estimates {
    mean: Option<Estimate>,
    median: Option<Estimate>,
}

// ---------------------------------------------------------------------------
// Parsed benchmark result
// ---------------------------------------------------------------------------

/// A single benchmark measurement (in nanoseconds per strategy call).
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    /// Criterion `group_id`, e.g. `"upsert/sqlite/10000"`.
    pub group_id: String,
    /// Criterion `function_id`, e.g. `"staged_merge"`.
    pub function_id: String,
    /// Mean execution time in nanoseconds.
    pub mean_ns: f64,
    /// Median execution time in nanoseconds.
    pub median_ns: f64,
    /// 95% CI lower bound of the mean (ns).
    pub mean_lower_ns: f64,
    /// 95% CI upper bound of the mean (ns).
    pub mean_upper_ns: f64,
}

impl BenchmarkResult {
    /// Median in milliseconds.
    pub fn median_ms(&self) -> f64 {
        self.median_ns / 1_000_000.0
    }

    /// Backend and row count parsed from the group id, if this is an upsert
    /// benchmark.
    pub fn dimensions(&self) -> Option<(&str, usize)> {
        parse_group(&self.group_id)
    }
}

/// Parse an `"upsert/<backend>/<n>"` group id.
fn parse_group(group_id: &str) -> Option<(&str, usize)> {
    let parts: Vec<&str> = group_id.split('/').collect();
    match parts.as_slice() {
        ["upsert", backend, count] if !backend.is_empty() => Some((*backend, count.parse().ok()?)),
        _ => None,
    }
}

/// Read one `<function>/new/` directory, skipping anything incomplete.
fn load_new_dir(new_dir: &Path) -> Option<BenchmarkResult> {
    let bench_bytes = std::fs::read_to_string(new_dir.join("benchmark.json")).ok()?;
    let est_bytes = std::fs::read_to_string(new_dir.join("estimates.json")).ok()?;
    let bench: CriterionBenchmark = serde_json::from_str(&bench_bytes).ok()?;
    let est: Estimates = serde_json::from_str(&est_bytes).ok()?;
    let mean = est.mean?;
    let median = est.median?;

    Some(BenchmarkResult {
        group_id: bench.group_id,
        function_id: bench.function_id,
        mean_ns: mean.point_estimate,
        median_ns: median.point_estimate,
        mean_lower_ns: mean.confidence_interval.lower_bound,
        mean_upper_ns: mean.confidence_interval.upper_bound,
    })
}

// ---------------------------------------------------------------------------
// Result collection
// ---------------------------------------------------------------------------

/// All loaded benchmark results with query helpers.
pub struct ResultSet {
    pub results: Vec<BenchmarkResult>,
}

impl ResultSet {
    /// Load all Criterion results from the given directory.
    ///
    /// Walks every `<criterion_dir>/<group>/<function>/new/` looking for
    /// `benchmark.json` and `estimates.json`.
    pub fn load(criterion_dir: &Path) -> Self {
        let mut results = Vec::new();

        let Ok(groups) = std::fs::read_dir(criterion_dir) else {
            eprintln!(
                "warning: cannot read criterion directory: {}",
                criterion_dir.display()
            );
            return Self { results };
        };

        for group_entry in groups.flatten() {
            let group_path = group_entry.path();
            if !group_path.is_dir() {
                continue;
            }
            let Ok(functions) = std::fs::read_dir(&group_path) else {
                continue;
            };
            for func_entry in functions.flatten() {
                let new_dir = func_entry.path().join("new");
                if let Some(result) = load_new_dir(&new_dir) {
                    results.push(result);
                }
            }
        }

        eprintln!("Loaded {} benchmark results", results.len());
        Self { results }
    }

    // -----------------------------------------------------------------------
    // Query helpers
    // -----------------------------------------------------------------------

    /// Return only the upsert benchmarks, with their backend and row count.
    pub fn upsert_results(&self) -> Vec<(&BenchmarkResult, &str, usize)> {
        self.results
            .iter()
            .filter_map(|r| r.dimensions().map(|(b, n)| (r, b, n)))
            .collect()
    }

    /// Backends with at least one result, in [`BACKENDS`] order; unknown
    /// backends follow alphabetically.
    pub fn backends(&self) -> Vec<String> {
        let mut found: Vec<String> = self
            .upsert_results()
            .into_iter()
            .map(|(_, b, _)| b.to_string())
            .collect();
        found.sort_by_key(|b| {
            let rank = BACKENDS.iter().position(|k| k == b).unwrap_or(BACKENDS.len());
            (rank, b.clone())
        });
        found.dedup();
        found
    }

    /// Distinct row counts measured on `backend`, ascending.
    pub fn row_counts(&self, backend: &str) -> Vec<usize> {
        let mut counts: Vec<usize> = self
            .upsert_results()
            .into_iter()
            .filter(|(_, b, _)| *b == backend)
            .map(|(_, _, n)| n)
            .collect();
        counts.sort_unstable();
        counts.dedup();
        counts
    }

    /// Look up the result of `strategy` on `backend` at `row_count`.
    pub fn find(&self, backend: &str, row_count: usize, strategy: &str) -> Option<&BenchmarkResult> {
        self.upsert_results().into_iter().find_map(|(r, b, n)| {
            (b == backend && n == row_count && r.function_id == strategy).then_some(r)
        })
    }
}

// ---------------------------------------------------------------------------
// CSV export
// ---------------------------------------------------------------------------

/// One line of `data.csv`: median nanoseconds per strategy call.
#[derive(Debug, Serialize)]
struct CsvRow {
    row_count: usize,
    direct_upsert_op: Option<f64>,
    staging_copy_op: Option<f64>,
}

/// Write the results of `backend` with one line per row count, in the same
/// layout as the runner binary's `data.csv`.
pub fn write_csv(results: &ResultSet, backend: &str, output: &Path) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(output)?;
    for row_count in results.row_counts(backend) {
        let median = |strategy| {
            results
                .find(backend, row_count, strategy)
                .map(|r| r.median_ns)
        };
        writer.serialize(CsvRow {
            row_count,
            direct_upsert_op: median("direct_upsert"),
            staging_copy_op: median("staged_merge"),
        })?;
    }
    writer.flush()?;
    eprintln!("    Saved: {}", output.display());
    Ok(())
}
