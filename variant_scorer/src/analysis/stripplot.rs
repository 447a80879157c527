use std::path::Path;

use plotters::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::statistics::{Data, Median};
use tracing::{debug, info};

use crate::models::{plot_err, AnalysisError, AnalysisResult, FunctionalClass};

const JITTER: f64 = 0.3;

/// Row order on the y axis, top to bottom as drawn.
const CLASS_ORDER: [&str; 2] = [FunctionalClass::FUNC_INT, FunctionalClass::LOF];

fn class_colour(class: &str) -> RGBColor {
    match class {
        FunctionalClass::LOF => RGBColor(214, 39, 40),
        _ => RGBColor(119, 119, 119),
    }
}

/// First class in `CLASS_ORDER` is drawn at the top.
fn flip(row: usize) -> usize {
    CLASS_ORDER.len() - 1 - row
}

// Expand a bit so points aren't on the border
fn expand_range(min_val: f64, max_val: f64, pct: f64) -> (f64, f64) {
    if (max_val - min_val).abs() < 1e-9 {
        return (min_val - 1.0, max_val + 1.0);
    }
    let pad = (max_val - min_val) * pct;
    (min_val - pad, max_val + pad)
}

/// Horizontal strip plot of delta scores per functional class with a median
/// bar on each strip.
///
/// Classes other than `FUNC/INT` and `LOF` are left out. Jitter is seeded so
/// the same input always renders the same image.
pub fn plot_delta_stripplot(
    deltas: &[f64],
    classes: &[FunctionalClass],
    output_path: &Path,
    seed: u64,
) -> AnalysisResult<()> {
    if deltas.len() != classes.len() {
        return Err(AnalysisError::Plot(format!(
            "{} deltas for {} class labels",
            deltas.len(),
            classes.len()
        )));
    }

    // (row, delta) for the classes we draw
    let rows: Vec<(usize, f64)> = deltas
        .iter()
        .zip(classes)
        .filter_map(|(&d, c)| CLASS_ORDER.iter().position(|&o| o == c.as_str()).map(|row| (row, d)))
        .collect();
    if rows.len() < deltas.len() {
        debug!("Skipping {} variants outside FUNC/INT and LOF", deltas.len() - rows.len());
    }
    if rows.is_empty() {
        return Err(AnalysisError::Plot("no FUNC/INT or LOF variants to plot".into()));
    }

    let d_min = rows.iter().map(|(_, d)| *d).fold(f64::INFINITY, f64::min);
    let d_max = rows.iter().map(|(_, d)| *d).fold(f64::NEG_INFINITY, f64::max);
    let (x_lo, x_hi) = expand_range(d_min, d_max, 0.05);
    let n_rows = CLASS_ORDER.len();

    let root = BitMapBackend::new(output_path, (800, 400)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .x_label_area_size(45)
        .y_label_area_size(90)
        .build_cartesian_2d(x_lo..x_hi, -0.5..(n_rows as f64 - 0.5))
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .y_labels(2 * n_rows + 1)
        .y_label_formatter(&|val: &f64| {
            let idx = val.round();
            if (val - idx).abs() < 1e-6 && idx >= 0.0 && (idx as usize) < n_rows {
                CLASS_ORDER[flip(idx as usize)].to_string()
            } else {
                String::new()
            }
        })
        .x_desc("evo2_delta_score")
        .y_desc("class")
        .axis_desc_style(("sans-serif", 16))
        .label_style(("sans-serif", 14))
        .draw()
        .map_err(plot_err)?;

    let mut rng = StdRng::seed_from_u64(seed);
    chart
        .draw_series(rows.iter().map(|&(row, d)| {
            let y = flip(row) as f64 + rng.gen_range(-JITTER..JITTER);
            Circle::new((d, y), 2, class_colour(CLASS_ORDER[row]).filled())
        }))
        .map_err(plot_err)?;

    // median bars
    for (row, class) in CLASS_ORDER.iter().enumerate() {
        let values: Vec<f64> = rows.iter().filter(|(r, _)| *r == row).map(|(_, d)| *d).collect();
        if values.is_empty() {
            continue;
        }
        let median = Data::new(values).median();
        let y = flip(row) as f64;
        debug!("{} median delta = {:.5}", class, median);
        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(median, y - 0.4), (median, y + 0.4)],
                BLACK.stroke_width(2),
            )))
            .map_err(plot_err)?;
    }

    root.present().map_err(plot_err)?;
    info!("Saved delta strip plot to {}", output_path.display());
    Ok(())
}
