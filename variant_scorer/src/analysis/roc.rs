use std::path::Path;

use plotters::prelude::*;
use tracing::{info, warn};

use crate::models::{plot_err, AnalysisResult};

/// Holds FPR/TPR pairs, thresholds, and the final AUC for one ROC curve.
#[derive(Debug, Clone)]
pub struct RocResult {
    pub fprs: Vec<f64>,
    pub tprs: Vec<f64>,
    pub thresholds: Vec<f64>,
    pub auc: f64,
}

/// Rank-based AUROC: the probability that a random positive scores above a
/// random negative, ties counting one half.
///
/// Returns `None` when either class is empty or the inputs do not align.
pub fn auroc(scores: &[f64], labels: &[bool]) -> Option<f64> {
    if scores.len() != labels.len() {
        warn!("AUROC undefined: {} scores for {} labels", scores.len(), labels.len());
        return None;
    }

    let n_pos = labels.iter().filter(|&&l| l).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        warn!("AUROC undefined: {} positives, {} negatives", n_pos, n_neg);
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // average 1-based rank over each run of tied scores
    let mut pos_rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            if labels[k] {
                pos_rank_sum += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    let u = pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0;
    Some(u / (n_pos * n_neg))
}

/// Compute ROC curve points (FPR/TPR) and AUC for a set of predicted `scores` and boolean `labels`.
///
/// Scores are swept from high to low; tied scores move the curve in one
/// diagonal step so the trapezoidal area agrees with [`auroc`].
pub fn roc_curve(scores: &[f64], labels: &[bool]) -> RocResult {
    let mut pairs: Vec<(f64, bool)> = scores.iter().copied().zip(labels.iter().copied()).collect();
    pairs.sort_by(|(s1, _), (s2, _)| s2.total_cmp(s1));

    let total_pos = labels.iter().filter(|&&l| l).count() as f64;
    let total_neg = labels.len() as f64 - total_pos;

    let mut fprs = vec![0.0];
    let mut tprs = vec![0.0];
    let mut thresholds = vec![f64::INFINITY];

    if total_pos == 0.0 || total_neg == 0.0 {
        info!("Warning: All instances are in one class. ROC curve will be degenerate.");
        return RocResult {
            fprs: vec![0.0, 1.0],
            tprs: vec![0.0, 1.0],
            thresholds: vec![f64::INFINITY, f64::NEG_INFINITY],
            auc: 0.5,
        };
    }

    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut auc = 0.0;

    let mut i = 0;
    while i < pairs.len() {
        let threshold = pairs[i].0;
        while i < pairs.len() && pairs[i].0 == threshold {
            if pairs[i].1 {
                tp += 1.0;
            } else {
                fp += 1.0;
            }
            i += 1;
        }

        let tpr = tp / total_pos;
        let fpr = fp / total_neg;
        let (prev_fpr, prev_tpr) = (fprs[fprs.len() - 1], tprs[tprs.len() - 1]);
        auc += (fpr - prev_fpr) * (tpr + prev_tpr) * 0.5;

        fprs.push(fpr);
        tprs.push(tpr);
        thresholds.push(threshold);
    }

    RocResult {
        fprs,
        tprs,
        thresholds,
        auc,
    }
}

/// Draw the ROC curve for the delta score with the random baseline.
pub fn plot_roc_curve(output_path: &Path, roc: &RocResult, label: &str) -> AnalysisResult<()> {
    let caption_font = ("sans-serif bold", 22);
    let axis_font = ("sans-serif", 18);
    let label_font = ("sans-serif", 15);
    let colour = RGBColor(214, 39, 40);

    let root = BitMapBackend::new(output_path, (700, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{label}: ROC (LOF vs FUNC/INT)"), caption_font)
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..1.0, 0.0..1.0)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("False Positive Rate")
        .y_desc("True Positive Rate")
        .axis_desc_style(axis_font)
        .label_style(label_font)
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(
            roc.fprs.iter().zip(roc.tprs.iter()).map(|(&x, &y)| (x, y)),
            colour.stroke_width(3),
        ))
        .map_err(plot_err)?
        .label(format!("{label} (AUC = {:.3})", roc.auc))
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 25, y)], colour.stroke_width(3)));

    chart
        .draw_series(LineSeries::new(
            vec![(0.0, 0.0), (1.0, 1.0)],
            BLACK.mix(0.2).stroke_width(2),
        ))
        .map_err(plot_err)?
        .label("Random (AUC = 0.50)")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 25, y)], BLACK.mix(0.2).stroke_width(3)));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(&BLACK)
        .label_font(label_font)
        .position(SeriesLabelPosition::LowerRight)
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    info!("ROC curve saved to: {}", output_path.display());
    Ok(())
}
