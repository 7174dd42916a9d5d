//! Upsert-benchmark report generator.
//!
//! Reads the Criterion results of the SQLite and PostgreSQL upsert benches
//! from `target/criterion/`, and writes one `data_<backend>.csv` per backend,
//! a `comparison.svg` chart and a Markdown summary report.
//!
//! Run: `cargo run -p upsert-bench-report [-- <criterion_dir> <output_dir>]`

mod data;
mod markdown;
mod plots;

use std::path::PathBuf;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let criterion_dir = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        // Default: workspace root's target/criterion
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target/criterion")
    };

    let output_dir = if args.len() > 2 {
        PathBuf::from(&args[2])
    } else {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("plots")
    };

    let criterion_dir = criterion_dir.canonicalize().unwrap_or_else(|e| {
        eprintln!(
            "error: cannot resolve criterion directory '{}': {e}",
            criterion_dir.display()
        );
        std::process::exit(1);
    });

    eprintln!("Reading from: {}", criterion_dir.display());
    eprintln!("Output to:    {}", output_dir.display());

    let results = data::ResultSet::load(&criterion_dir);
    let backends = results.backends();
    if backends.is_empty() {
        eprintln!(
            "error: no upsert benchmark results found in {}",
            criterion_dir.display()
        );
        std::process::exit(1);
    }
    eprintln!(
        "Found {} upsert benchmarks for {}",
        results.upsert_results().len(),
        backends.join(", "),
    );

    if let Err(e) = std::fs::create_dir_all(&output_dir) {
        eprintln!("error creating {}: {e}", output_dir.display());
        std::process::exit(1);
    }

    for backend in &backends {
        let file = format!("data_{backend}.csv");
        if let Err(e) = data::write_csv(&results, backend, &output_dir.join(&file)) {
            eprintln!("error writing {file}: {e}");
            std::process::exit(1);
        }
    }

    if let Err(e) = plots::comparison_chart(&results, &output_dir.join("comparison.svg")) {
        eprintln!("error generating chart: {e}");
        std::process::exit(1);
    }

    if let Err(e) = markdown::generate_report(&results, &output_dir) {
        eprintln!("error generating report: {e}");
        std::process::exit(1);
    }

    eprintln!(
        "\nDone! Report at: {}",
        output_dir.join("report.md").display()
    );
}
