use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::analysis::delta::{compute_deltas, retain_finite};
use crate::analysis::report::{class_summaries, AnalysisOutcome, AnalysisReport, DELTA_COL};
use crate::analysis::roc::{auroc, roc_curve};
use crate::analysis::stripplot::plot_delta_stripplot;
use crate::analysis::windows::{build_window, DedupIndex};
use crate::config::AnalysisConfig;
use crate::data_handling::reference_fasta::Sequence;
use crate::data_handling::variant_table::VariantTable;
use crate::models::{AnalysisError, AnalysisResult, FunctionalClass, ScoredVariant};
use crate::prediction_tools::{sanity_probe, score_all, ScoringOracle};

/// Windows built for the variants that passed the precondition checks.
struct PreparedWindows {
    /// Row in the variant table for each prepared variant.
    rows: Vec<usize>,
    dedup_indices: Vec<usize>,
    variant_windows: Vec<String>,
    dedup: DedupIndex,
    skipped: usize,
    mismatches: usize,
}

fn prepare_windows(sequence: &Sequence, table: &VariantTable, window_size: usize) -> PreparedWindows {
    let mut prepared = PreparedWindows {
        rows: Vec::with_capacity(table.len()),
        dedup_indices: Vec::with_capacity(table.len()),
        variant_windows: Vec::with_capacity(table.len()),
        dedup: DedupIndex::new(),
        skipped: 0,
        mismatches: 0,
    };

    for record in table.records() {
        let offset = record.offset();
        let pair = match build_window(sequence, offset, window_size, &record.alternate) {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Skipping variant at {} (row {}): {}", record.position, record.row, e);
                prepared.skipped += 1;
                continue;
            }
        };

        if record.reference.len() == 1 && sequence.base_at(offset) != record.reference.chars().next() {
            debug!(
                "Reference mismatch at {}: table {} vs sequence {:?}",
                record.position,
                record.reference,
                sequence.base_at(offset)
            );
            prepared.mismatches += 1;
        }

        prepared.rows.push(record.row);
        prepared.dedup_indices.push(prepared.dedup.lookup_or_insert(&pair.reference));
        prepared.variant_windows.push(pair.variant);
    }

    if prepared.mismatches > 0 {
        warn!(
            "{} variants disagree with the reference base in {}",
            prepared.mismatches,
            sequence.id()
        );
    }
    prepared
}

/// Render the strip plot into memory; a plotting failure only loses the figure.
fn render_stripplot(scored: &[ScoredVariant], seed: u64) -> Option<Vec<u8>> {
    let deltas: Vec<f64> = scored.iter().map(|v| v.evo2_delta_score).collect();
    let classes: Vec<FunctionalClass> = scored.iter().map(|v| v.record.class.clone()).collect();

    let render = || -> AnalysisResult<Vec<u8>> {
        let tmp = tempfile::Builder::new()
            .prefix("delta_stripplot")
            .suffix(".png")
            .tempfile()
            .map_err(|e| AnalysisError::io(std::env::temp_dir(), e))?;
        plot_delta_stripplot(&deltas, &classes, tmp.path(), seed)?;
        std::fs::read(tmp.path()).map_err(|e| AnalysisError::io(tmp.path(), e))
    };

    match render() {
        Ok(png) => Some(png),
        Err(e) => {
            warn!("Could not render delta strip plot: {}", e);
            None
        }
    }
}

/// Score every variant in `table` against `sequence` with `oracle`.
///
/// Oracle failures abort the run with an error; variants whose delta is
/// non-finite are dropped and counted; if nothing survives the outcome is
/// [`AnalysisOutcome::Empty`].
pub fn run_analysis<O: ScoringOracle + ?Sized>(
    config: &AnalysisConfig,
    sequence: &Sequence,
    table: VariantTable,
    oracle: &mut O,
) -> AnalysisResult<AnalysisOutcome> {
    config.validate()?;

    if config.sanity_check {
        sanity_probe(oracle)?;
    }

    let table = table.limit(config.subset_size);
    let total_variants = table.len();
    let prepared = prepare_windows(sequence, &table, config.window_size);

    if prepared.rows.is_empty() {
        let reason = format!("none of {} variants produced a valid window", total_variants);
        warn!("{}", reason);
        return Ok(AnalysisOutcome::Empty {
            reason,
            discarded: prepared.skipped,
        });
    }

    info!("Scoring {} ref sequences...", prepared.dedup.len());
    let ref_scores = score_all(oracle, prepared.dedup.windows(), config.batch_size)?;

    info!("Scoring {} var sequences...", prepared.variant_windows.len());
    let var_scores = score_all(oracle, &prepared.variant_windows, config.batch_size)?;

    let deltas = compute_deltas(&prepared.dedup_indices, &ref_scores, &var_scores)?;
    let finite = retain_finite(&deltas);

    if finite.is_empty() {
        let reason = "All variants dropped: every delta score is non-finite".to_string();
        warn!("{}", reason);
        return Ok(AnalysisOutcome::Empty {
            reason,
            discarded: finite.discarded + prepared.skipped,
        });
    }

    // map surviving variants back to table rows (both in ascending order)
    let kept_rows: Vec<usize> = finite.kept.iter().map(|&i| prepared.rows[i]).collect();
    let mut keep = vec![false; table.frame().height()];
    for &row in &kept_rows {
        keep[row] = true;
    }
    let mask = BooleanChunked::from_slice(PlSmallStr::from_static("keep"), &keep);
    let mut variants = table.frame().filter(&mask)?;
    variants.with_column(Series::new(PlSmallStr::from_static(DELTA_COL), finite.deltas.clone()))?;

    let scored: Vec<ScoredVariant> = kept_rows
        .iter()
        .zip(&finite.deltas)
        .map(|(&row, &delta)| ScoredVariant {
            record: table.records()[row].clone(),
            evo2_delta_score: delta,
        })
        .collect();

    // lower delta should mean loss of function
    let scores: Vec<f64> = finite.deltas.iter().map(|d| -d).collect();
    let labels: Vec<bool> = scored.iter().map(|v| v.record.class.is_lof()).collect();
    let auroc = auroc(&scores, &labels);
    let roc = roc_curve(&scores, &labels);
    match auroc {
        Some(a) => info!("AUROC: {:.4}", a),
        None => warn!("AUROC undefined for this subset"),
    }

    let plot_png = render_stripplot(&scored, config.jitter_seed);

    Ok(AnalysisOutcome::Scored(Box::new(AnalysisReport {
        model_name: oracle.name().to_string(),
        window_size: config.window_size,
        variants,
        class_summaries: class_summaries(&scored),
        scored,
        auroc,
        roc,
        total_variants,
        skipped_variants: prepared.skipped,
        reference_mismatches: prepared.mismatches,
        discarded_non_finite: finite.discarded,
        reference_windows: prepared.dedup.len(),
        plot_png,
        embed_plot: config.embed_plot,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handling::variant_table::VariantTableSource;
    use crate::models::Dataset;
    use crate::prediction_tools::testing::StubOracle;
    use std::path::Path;

    fn config(window_size: usize) -> AnalysisConfig {
        AnalysisConfig {
            window_size,
            subset_size: None,
            sanity_check: false,
            ..AnalysisConfig::default()
        }
    }

    fn table(dir: &Path, rows: &[(u64, &str, &str, &str)]) -> VariantTable {
        let mut body = String::from("banner\nbanner\npos,ref,alt,class\n");
        for (pos, r, a, c) in rows {
            body.push_str(&format!("{pos},{r},{a},{c}\n"));
        }
        let path = dir.join("variants.csv");
        std::fs::write(&path, body).unwrap();
        VariantTableSource {
            path,
            sheet_index: 0,
            header_row: 2,
        }
        .load()
        .unwrap()
    }

    fn unwrap_scored(outcome: AnalysisOutcome) -> AnalysisReport {
        match outcome {
            AnalysisOutcome::Scored(r) => *r,
            AnalysisOutcome::Empty { reason, .. } => panic!("unexpected empty outcome: {reason}"),
        }
    }

    #[test]
    fn worked_example_window_and_delta() {
        let dir = tempfile::tempdir().unwrap();
        let seq = Sequence::new("toy", "AAAACGTTTT");
        let table = table(dir.path(), &[(5, "C", "G", "LOF")]);
        let mut oracle = StubOracle::default();

        let report = unwrap_scored(run_analysis(&config(4), &seq, table, &mut oracle).unwrap());

        assert_eq!(oracle.scored_sequences(), vec!["AACG", "AAGG"]);
        let expected = StubOracle::score("AAGG") - StubOracle::score("AACG");
        assert_eq!(report.scored[0].evo2_delta_score, expected);
        assert_eq!(report.reference_mismatches, 0);
        assert_eq!(report.auroc, None);
        assert!(report.plot_png.as_ref().is_some_and(|png| !png.is_empty()));
    }

    #[test]
    fn shared_reference_window_is_scored_once() {
        let dir = tempfile::tempdir().unwrap();
        let seq = Sequence::new("toy", "AAAACGTTTT");
        // same position, two alternates → identical reference windows
        let table = table(dir.path(), &[(5, "C", "T", "LOF"), (5, "C", "G", "FUNC")]);
        let mut oracle = StubOracle::default();

        let report = unwrap_scored(run_analysis(&config(4), &seq, table, &mut oracle).unwrap());

        let refs_scored = oracle.scored_sequences().iter().filter(|s| s.as_str() == "AACG").count();
        assert_eq!(refs_scored, 1);
        assert_eq!(report.reference_windows, 1);

        let ref_score = StubOracle::score("AACG");
        assert_eq!(report.scored[0].evo2_delta_score, StubOracle::score("AATG") - ref_score);
        assert_eq!(report.scored[1].evo2_delta_score, StubOracle::score("AAGG") - ref_score);
        assert_eq!(report.auroc, Some(1.0));
    }

    #[test]
    fn non_finite_deltas_shrink_the_evaluated_set() {
        let dir = tempfile::tempdir().unwrap();
        let bases = "ACGTTGCAAC".repeat(3);
        let seq = Sequence::new("toy", &bases);
        let rows: Vec<(u64, &str, &str, &str)> = (0..10)
            .map(|i| (3 + 2 * i as u64, "N", if i % 2 == 0 { "A" } else { "C" }, if i < 5 { "LOF" } else { "INT" }))
            .collect();
        let table = table(dir.path(), &rows);

        // poison three variant windows that share nothing with other windows
        let poisoned: Vec<String> = [0usize, 5, 6]
            .iter()
            .map(|&i| {
                let (pos, _, alt, _) = rows[i];
                build_window(&seq, pos as usize - 1, 4, alt).unwrap().variant
            })
            .collect();
        let mut oracle = StubOracle {
            nan_for: poisoned,
            ..Default::default()
        };

        let report = unwrap_scored(run_analysis(&config(4), &seq, table, &mut oracle).unwrap());

        assert_eq!(report.total_variants, 10);
        assert_eq!(report.valid_variants(), 7);
        assert_eq!(report.discarded_non_finite, 3);
        assert_eq!(report.variants.height(), 7);
        let kept_rows: Vec<usize> = report.scored.iter().map(|v| v.record.row).collect();
        assert_eq!(kept_rows, vec![1, 2, 3, 4, 7, 8, 9]);

        let scores: Vec<f64> = report.scored.iter().map(|v| -v.evo2_delta_score).collect();
        let labels: Vec<bool> = report.scored.iter().map(|v| v.record.class.is_lof()).collect();
        assert_eq!(report.auroc, auroc(&scores, &labels));

        let frame_deltas: Vec<f64> = report
            .variants
            .column(DELTA_COL)
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        let scored_deltas: Vec<f64> = report.scored.iter().map(|v| v.evo2_delta_score).collect();
        assert_eq!(frame_deltas, scored_deltas);
    }

    #[test]
    fn all_non_finite_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let seq = Sequence::new("toy", "AAAACGTTTT");
        let table = table(dir.path(), &[(5, "C", "G", "LOF")]);
        let mut oracle = StubOracle {
            nan_for: vec!["AACG".into()],
            ..Default::default()
        };

        match run_analysis(&config(4), &seq, table, &mut oracle).unwrap() {
            AnalysisOutcome::Empty { discarded, .. } => assert_eq!(discarded, 1),
            AnalysisOutcome::Scored(_) => panic!("expected empty outcome"),
        }
    }

    #[test]
    fn out_of_bounds_positions_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let seq = Sequence::new("toy", "AAAACGTTTT");
        let table = table(dir.path(), &[(5, "C", "G", "LOF"), (11, "A", "G", "FUNC"), (10, "T", "C", "INT")]);
        let mut oracle = StubOracle::default();

        let report = unwrap_scored(run_analysis(&config(4), &seq, table, &mut oracle).unwrap());
        assert_eq!(report.skipped_variants, 1);
        assert_eq!(report.valid_variants(), 2);
        assert_eq!(report.scored[1].record.position, 10);
    }

    #[test]
    fn deletion_alternates_are_skipped_not_scored() {
        let dir = tempfile::tempdir().unwrap();
        let seq = Sequence::new("toy", "AAAACGTTTT");
        let table = table(dir.path(), &[(5, "C", "-", "LOF"), (6, "G", "N", "FUNC"), (7, "T", "*", "LOF")]);
        let mut oracle = StubOracle::default();

        let report = unwrap_scored(run_analysis(&config(4), &seq, table, &mut oracle).unwrap());
        assert_eq!(report.skipped_variants, 2);
        assert_eq!(report.valid_variants(), 1);
        // the ambiguous `N` is scored as an `A` substitution
        assert_eq!(report.scored[0].record.alternate, "A");
        assert_eq!(oracle.scored_sequences(), vec!["ACGT", "ACAT"]);
    }

    #[test]
    fn subset_limits_scored_rows() {
        let dir = tempfile::tempdir().unwrap();
        let seq = Sequence::new("toy", "AAAACGTTTT");
        let table = table(dir.path(), &[(5, "C", "G", "LOF"), (6, "G", "A", "FUNC"), (7, "T", "C", "INT")]);
        let cfg = AnalysisConfig {
            subset_size: Some(2),
            ..config(4)
        };
        let mut oracle = StubOracle::default();

        let report = unwrap_scored(run_analysis(&cfg, &seq, table, &mut oracle).unwrap());
        assert_eq!(report.total_variants, 2);
        assert_eq!(report.variants.height(), 2);
    }

    #[test]
    fn failing_sanity_check_halts_before_scoring() {
        let dir = tempfile::tempdir().unwrap();
        let seq = Sequence::new("toy", "AAAACGTTTT");
        let table = table(dir.path(), &[(5, "C", "G", "LOF")]);
        let mut oracle = StubOracle {
            nan_for: vec!["ACGT".repeat(200)],
            ..Default::default()
        };
        let cfg = AnalysisConfig {
            sanity_check: true,
            ..config(4)
        };

        let err = run_analysis(&cfg, &seq, table, &mut oracle).unwrap_err();
        assert!(matches!(err, AnalysisError::OracleUnavailable(_)));
        // only the sanity check reached the model
        assert_eq!(oracle.calls.len(), 1);
    }

    #[test]
    fn reference_mismatch_is_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let seq = Sequence::new("toy", "AAAACGTTTT");
        let table = table(dir.path(), &[(5, "T", "G", "LOF")]);
        let mut oracle = StubOracle::default();

        let report = unwrap_scored(run_analysis(&config(4), &seq, table, &mut oracle).unwrap());
        assert_eq!(report.reference_mismatches, 1);
        assert_eq!(report.valid_variants(), 1);
    }
}
