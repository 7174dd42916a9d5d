//! Markdown report generation for upsert-benchmark results.
//!
//! Produces `report.md` with one timing table per backend, the staged merge
//! speedup over direct upserts, and a reference to the comparison chart.

use std::fmt::Write;
use std::path::Path;

use crate::data::{ResultSet, STRATEGIES};
use crate::plots::{backend_label, strategy_label};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Format milliseconds as a human-readable string.
fn fmt_ms(ms: f64) -> String {
    if ms >= 1_000.0 {
        format!("{:.2} s", ms / 1_000.0)
    } else if ms >= 1.0 {
        format!("{:.2} ms", ms)
    } else {
        format!("{:.1} µs", ms * 1_000.0)
    }
}

/// Compute speedup: `baseline / target`.
fn speedup(baseline: f64, target: f64) -> f64 {
    if target > 0.0 {
        baseline / target
    } else {
        f64::NAN
    }
}

// ---------------------------------------------------------------------------
// Report sections
// ---------------------------------------------------------------------------

fn write_header(out: &mut String) {
    writeln!(out, "# Upsert Benchmark Report\n").unwrap();
    writeln!(out, "## Methodology\n").unwrap();
    writeln!(
        out,
        "This report compares two ways of ingesting a batch of rows into a table \
         with a primary key, skipping rows whose id already exists:\n"
    )
    .unwrap();
    writeln!(out, "| Strategy | Description |").unwrap();
    writeln!(out, "|----------|-------------|").unwrap();
    writeln!(
        out,
        "| **Direct upsert** | One autocommitted `INSERT .. ON CONFLICT (id) DO NOTHING` per row |"
    )
    .unwrap();
    writeln!(
        out,
        "| **Staged merge** | Bulk load into a staging table, `INSERT .. SELECT` merge and truncate, in one transaction |"
    )
    .unwrap();
    writeln!(out).unwrap();
    writeln!(
        out,
        "All times are Criterion.rs medians for one call ingesting the whole batch.\n"
    )
    .unwrap();
}

fn write_summary_table(out: &mut String, results: &ResultSet, backend: &str) {
    writeln!(out, "## {}\n", backend_label(backend)).unwrap();
    write!(out, "| Rows |").unwrap();
    for &strategy in STRATEGIES {
        write!(out, " {} |", strategy_label(strategy)).unwrap();
    }
    writeln!(out, " Speedup |").unwrap();
    write!(out, "|-----:|").unwrap();
    for _ in STRATEGIES {
        write!(out, "------:|").unwrap();
    }
    writeln!(out, "--------:|").unwrap();

    for row_count in results.row_counts(backend) {
        write!(out, "| {row_count} |").unwrap();
        for &strategy in STRATEGIES {
            match results.find(backend, row_count, strategy) {
                Some(r) => write!(out, " {} |", fmt_ms(r.median_ms())).unwrap(),
                None => write!(out, " — |").unwrap(),
            }
        }
        let direct = results.find(backend, row_count, "direct_upsert");
        let staged = results.find(backend, row_count, "staged_merge");
        match (direct, staged) {
            (Some(d), Some(s)) => {
                writeln!(out, " {:.1}× |", speedup(d.median_ns, s.median_ns)).unwrap();
            }
            _ => writeln!(out, " — |").unwrap(),
        }
    }
    writeln!(out).unwrap();
}

fn write_chart_section(out: &mut String, backends: &[String]) {
    writeln!(out, "## Time per Operation\n").unwrap();
    writeln!(out, "![Time per operation vs number of rows](comparison.svg)\n").unwrap();
    writeln!(out, "Raw numbers (nanoseconds per call):\n").unwrap();
    for backend in backends {
        writeln!(
            out,
            "- {}: [data_{backend}.csv](data_{backend}.csv)",
            backend_label(backend)
        )
        .unwrap();
    }
    writeln!(out).unwrap();
}

/// Write `report.md` into `output_dir`.
pub fn generate_report(
    results: &ResultSet,
    output_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut out = String::new();
    let backends = results.backends();
    write_header(&mut out);
    for backend in &backends {
        write_summary_table(&mut out, results, backend);
    }
    write_chart_section(&mut out, &backends);

    let path = output_dir.join("report.md");
    std::fs::write(&path, out)?;
    eprintln!("    Saved: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::create_test_results;

    #[test]
    fn test_fmt_ms() {
        assert_eq!(fmt_ms(2_500.0), "2.50 s");
        assert_eq!(fmt_ms(12.345), "12.35 ms");
        assert_eq!(fmt_ms(0.5), "500.0 µs");
    }

    #[test]
    fn test_speedup() {
        assert!((speedup(8.0, 2.0) - 4.0).abs() < f64::EPSILON);
        assert!(speedup(8.0, 0.0).is_nan());
    }

    #[test]
    fn test_write_header() {
        let mut out = String::new();
        write_header(&mut out);
        assert!(out.contains("# Upsert Benchmark Report"));
        assert!(out.contains("Methodology"));
    }

    #[test]
    fn test_write_summary_table() {
        let rs = create_test_results();
        let mut out = String::new();
        write_summary_table(&mut out, &rs, "sqlite");
        assert!(out.contains("## SQLite"));
        assert!(out.contains("| Rows | Direct upsert | Staged merge | Speedup |"));
        assert!(out.contains("| 1000 | 8.00 ms | 2.00 ms | 4.0× |"));
        assert!(out.contains("| 10000 | 80.00 ms | 10.00 ms | 8.0× |"));
    }

    #[test]
    fn test_missing_strategy_has_no_speedup() {
        let mut rs = create_test_results();
        rs.results.retain(|r| r.function_id != "staged_merge");
        let mut out = String::new();
        write_summary_table(&mut out, &rs, "sqlite");
        assert!(out.contains("| 1000 | 8.00 ms | — | — |"));

        let mut out = String::new();
        write_summary_table(&mut out, &create_test_results(), "postgres");
        assert!(out.contains("## PostgreSQL"));
        assert!(out.contains("| 1000 | — | 1.00 ms | — |"));
    }

    #[test]
    fn test_generate_report() {
        let rs = create_test_results();
        let temp_dir = std::env::temp_dir().join(format!("upsert-report-md-{}", std::process::id()));
        std::fs::create_dir_all(&temp_dir).ok();

        generate_report(&rs, &temp_dir).unwrap();
        let content = std::fs::read_to_string(temp_dir.join("report.md")).unwrap();
        assert!(content.contains("# Upsert Benchmark Report"));
        assert!(content.contains("comparison.svg"));
        assert!(content.contains("## SQLite"));
        assert!(content.contains("## PostgreSQL"));
        assert!(content.contains("data_postgres.csv"));

        std::fs::remove_dir_all(&temp_dir).ok();
    }
}
