use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::DataFrame;
use serde::Serialize;
use statrs::statistics::{Data, Median, Statistics};
use tracing::{info, warn};

use crate::analysis::roc::{plot_roc_curve, RocResult};
use crate::helper_functions::dataframe_to_csv;
use crate::models::{AnalysisError, AnalysisResult, ScoredVariant};

pub const DELTA_COL: &str = "evo2_delta_score";

/// Delta-score distribution for one functional class.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClassSummary {
    pub class: String,
    pub count: usize,
    pub mean_delta: f64,
    pub median_delta: f64,
}

pub fn class_summaries(scored: &[ScoredVariant]) -> Vec<ClassSummary> {
    let mut by_class: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for v in scored {
        by_class
            .entry(v.record.class.as_str().to_string())
            .or_default()
            .push(v.evo2_delta_score);
    }

    by_class
        .into_iter()
        .map(|(class, deltas)| ClassSummary {
            class,
            count: deltas.len(),
            mean_delta: deltas.iter().mean(),
            median_delta: Data::new(deltas).median(),
        })
        .collect()
}

/// Result of a run that produced at least one finite delta score.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub model_name: String,
    pub window_size: usize,
    /// Input rows with `evo2_delta_score` appended, non-finite rows removed.
    pub variants: DataFrame,
    pub scored: Vec<ScoredVariant>,
    /// `None` when only one class survived filtering.
    pub auroc: Option<f64>,
    pub roc: RocResult,
    pub total_variants: usize,
    pub skipped_variants: usize,
    pub reference_mismatches: usize,
    pub discarded_non_finite: usize,
    pub reference_windows: usize,
    pub class_summaries: Vec<ClassSummary>,
    pub plot_png: Option<Vec<u8>>,
    pub embed_plot: bool,
}

impl AnalysisReport {
    pub fn valid_variants(&self) -> usize {
        self.scored.len()
    }

    /// Strip plot as URL-safe base64, if it was rendered and embedding is on.
    pub fn plot_base64(&self) -> Option<String> {
        if !self.embed_plot {
            return None;
        }
        self.plot_png.as_deref().map(base64_url::encode)
    }
}

/// Outcome of a run: either scores, or a clean "nothing left" report.
#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    Scored(Box<AnalysisReport>),
    Empty { reason: String, discarded: usize },
}

#[derive(Serialize)]
struct Summary<'a> {
    status: &'static str,
    model: &'a str,
    window_size: usize,
    auroc: Option<f64>,
    total_variants: usize,
    valid_variants: usize,
    skipped_variants: usize,
    reference_mismatches: usize,
    discarded_non_finite: usize,
    reference_windows: usize,
    class_summaries: &'a [ClassSummary],
    #[serde(skip_serializing_if = "Option::is_none")]
    plot: Option<String>,
    variants: &'a [ScoredVariant],
}

#[derive(Serialize)]
struct EmptySummary<'a> {
    status: &'static str,
    reason: &'a str,
    discarded: usize,
}

/// Files produced by [`write_report`].
#[derive(Debug, Default)]
pub struct ReportFiles {
    pub variants_csv: PathBuf,
    pub summary_json: PathBuf,
    pub stripplot_png: Option<PathBuf>,
    pub roc_png: Option<PathBuf>,
}

fn ensure_dir(dir: &Path) -> AnalysisResult<()> {
    fs::create_dir_all(dir).map_err(|e| AnalysisError::io(dir, e))
}

/// Persist a finished run under `output_dir`.
///
/// Only called once the whole run succeeded, so a failed run never leaves
/// partial results behind.
pub fn write_report(report: &AnalysisReport, output_dir: &Path) -> AnalysisResult<ReportFiles> {
    ensure_dir(output_dir)?;

    let mut files = ReportFiles {
        variants_csv: output_dir.join("variants_scored.csv"),
        summary_json: output_dir.join("summary.json"),
        ..Default::default()
    };

    let mut variants = report.variants.clone();
    dataframe_to_csv(&mut variants, &files.variants_csv)?;

    if let Some(png) = &report.plot_png {
        let path = output_dir.join("delta_stripplot.png");
        fs::write(&path, png).map_err(|e| AnalysisError::io(&path, e))?;
        files.stripplot_png = Some(path);
    }

    if report.auroc.is_some() {
        let path = output_dir.join("roc_curve.png");
        match plot_roc_curve(&path, &report.roc, &report.model_name) {
            Ok(()) => files.roc_png = Some(path),
            Err(e) => warn!("Skipping ROC figure: {}", e),
        }
    }

    let summary = Summary {
        status: "scored",
        model: &report.model_name,
        window_size: report.window_size,
        auroc: report.auroc,
        total_variants: report.total_variants,
        valid_variants: report.valid_variants(),
        skipped_variants: report.skipped_variants,
        reference_mismatches: report.reference_mismatches,
        discarded_non_finite: report.discarded_non_finite,
        reference_windows: report.reference_windows,
        class_summaries: &report.class_summaries,
        plot: report.plot_base64(),
        variants: &report.scored,
    };
    let json = serde_json::to_string_pretty(&summary)?;
    fs::write(&files.summary_json, json).map_err(|e| AnalysisError::io(&files.summary_json, e))?;

    info!("Results written to {}", output_dir.display());
    Ok(files)
}

/// Record an empty outcome so it is distinguishable from a crash.
pub fn write_empty_summary(reason: &str, discarded: usize, output_dir: &Path) -> AnalysisResult<PathBuf> {
    ensure_dir(output_dir)?;
    let path = output_dir.join("summary.json");
    let json = serde_json::to_string_pretty(&EmptySummary {
        status: "empty",
        reason,
        discarded,
    })?;
    fs::write(&path, json).map_err(|e| AnalysisError::io(&path, e))?;
    Ok(path)
}
