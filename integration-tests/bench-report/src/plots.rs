//! SVG chart generation for upsert-benchmark results.
//!
//! Produces a single line chart: time per strategy call in milliseconds
//! against the number of rows ingested, one line per backend and strategy,
//! using the `plotters` crate with the SVG backend.

use plotters::prelude::*;
use std::path::Path;

use crate::data::{ResultSet, STRATEGIES};

// ---------------------------------------------------------------------------
// Palette
// ---------------------------------------------------------------------------

const COLOR_DIRECT: RGBColor = RGBColor(231, 76, 60); //  red
const COLOR_STAGED: RGBColor = RGBColor(52, 152, 219); //  blue
const COLOR_PG_DIRECT: RGBColor = RGBColor(230, 160, 0); //  amber
const COLOR_PG_STAGED: RGBColor = RGBColor(46, 204, 113); //  emerald

fn series_color(backend: &str, strategy: &str) -> RGBColor {
    match (backend, strategy) {
        ("sqlite", "direct_upsert") => COLOR_DIRECT,
        ("sqlite", "staged_merge") => COLOR_STAGED,
        ("postgres", "direct_upsert") => COLOR_PG_DIRECT,
        ("postgres", "staged_merge") => COLOR_PG_STAGED,
        _ => RGBColor(128, 128, 128),
    }
}

/// Display name of a backend.
pub fn backend_label(backend: &str) -> &str {
    match backend {
        "sqlite" => "SQLite",
        "postgres" => "PostgreSQL",
        other => other,
    }
}

/// Legend and table name of a strategy.
pub fn strategy_label(strategy: &str) -> &str {
    match strategy {
        "direct_upsert" => "Direct upsert",
        "staged_merge" => "Staged merge",
        _ => "unknown",
    }
}

fn y_fmt(y: &f64) -> String {
    let v = *y;
    if v >= 1_000.0 {
        format!("{:.1} s", v / 1_000.0)
    } else if v >= 1.0 {
        format!("{:.0} ms", v)
    } else {
        format!("{:.2} ms", v)
    }
}

/// One plotted line: backend, strategy and `(rows, median_ms, lower_ms, upper_ms)` points.
type Series = (String, &'static str, Vec<(f64, f64, f64, f64)>);

/// Collect the points of every backend and strategy with results.
fn collect_series(results: &ResultSet) -> Vec<Series> {
    let mut series = Vec::new();
    for backend in results.backends() {
        let row_counts = results.row_counts(&backend);
        for &strategy in STRATEGIES {
            let points: Vec<_> = row_counts
                .iter()
                .filter_map(|&n| {
                    results.find(&backend, n, strategy).map(|r| {
                        (
                            n as f64,
                            r.median_ms(),
                            r.mean_lower_ns / 1_000_000.0,
                            r.mean_upper_ns / 1_000_000.0,
                        )
                    })
                })
                .collect();
            if !points.is_empty() {
                series.push((backend.clone(), strategy, points));
            }
        }
    }
    series
}

/// Draw the strategy comparison chart into `output`.
///
/// X-axis: number of rows (log scale). Y-axis: median time per call (ms),
/// with error bars from the confidence interval of the mean.
pub fn comparison_chart(
    results: &ResultSet,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let series = collect_series(results);
    if series.is_empty() {
        return Ok(());
    }

    let all_points = || series.iter().flat_map(|(_, _, pts)| pts.iter());
    let x_min = all_points().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let x_max = all_points().map(|p| p.0).fold(0.0f64, f64::max);
    let y_max = all_points().map(|p| p.3).fold(0.0f64, f64::max);
    // Pad the log-scale x range so single-point series stay drawable.
    let x_range = (x_min / 1.5)..(x_max * 1.5);

    let root = SVGBackend::new(output, (900, 540)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Time per operation vs number of rows", ("sans-serif", 18))
        .margin(14)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(x_range.log_scale(), 0f64..y_max * 1.15)?;

    chart
        .configure_mesh()
        .x_desc("Number of rows")
        .y_desc("Time per operation (ms)")
        .y_label_formatter(&y_fmt)
        .x_label_formatter(&|x| format!("{}", *x as usize))
        .draw()?;

    for (backend, strategy, points) in &series {
        let color = series_color(backend, strategy);
        let label = format!("{} · {}", backend_label(backend), strategy_label(strategy));

        // Error bars.
        for &(x, _y, lo, hi) in points {
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(x, lo), (x, hi)],
                color.mix(0.5).stroke_width(1),
            )))?;
        }

        // Line + dots.
        let xy: Vec<(f64, f64)> = points.iter().map(|&(x, y, _, _)| (x, y)).collect();
        chart
            .draw_series(LineSeries::new(xy.clone(), color.stroke_width(2)))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        chart.draw_series(xy.iter().map(|&(x, y)| Circle::new((x, y), 3, color.filled())))?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .margin(12)
        .background_style(WHITE.mix(0.9))
        .border_style(BLACK.mix(0.3))
        .label_font(("sans-serif", 13))
        .draw()?;

    root.present()?;
    eprintln!("    Saved: {}", output.display());
    Ok(())
}
