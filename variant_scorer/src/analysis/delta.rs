use ndarray::{Array1, Axis};
use tracing::{info, warn};

use crate::models::{AnalysisError, AnalysisResult};

/// `delta[i] = var_scores[i] - ref_scores[dedup_indices[i]]`.
///
/// Misaligned inputs are reported as an oracle failure rather than panicking
/// inside the gather.
pub fn compute_deltas(
    dedup_indices: &[usize],
    ref_scores: &[f64],
    var_scores: &[f64],
) -> AnalysisResult<Vec<f64>> {
    if dedup_indices.len() != var_scores.len() {
        return Err(AnalysisError::OracleFailure(format!(
            "{} variant scores for {} variants",
            var_scores.len(),
            dedup_indices.len()
        )));
    }
    if let Some(&bad) = dedup_indices.iter().find(|&&i| i >= ref_scores.len()) {
        return Err(AnalysisError::OracleFailure(format!(
            "reference index {} out of range for {} reference scores",
            bad,
            ref_scores.len()
        )));
    }

    let refs = Array1::from(ref_scores.to_vec());
    let vars = Array1::from(var_scores.to_vec());
    let delta = vars - refs.select(Axis(0), dedup_indices);

    Ok(delta.to_vec())
}

/// Deltas that survived the finite filter, plus where they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct FiniteDeltas {
    /// Positions (into the scored variant list) of the kept deltas.
    pub kept: Vec<usize>,
    pub deltas: Vec<f64>,
    pub discarded: usize,
}

impl FiniteDeltas {
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}

pub fn retain_finite(deltas: &[f64]) -> FiniteDeltas {
    let (kept, kept_deltas): (Vec<usize>, Vec<f64>) = deltas
        .iter()
        .enumerate()
        .filter(|(_, d)| d.is_finite())
        .map(|(i, d)| (i, *d))
        .unzip();

    let discarded = deltas.len() - kept.len();
    if discarded > 0 {
        warn!("Discarded {} of {} variants with non-finite delta scores", discarded, deltas.len());
    } else {
        info!("All {} delta scores are finite", deltas.len());
    }

    FiniteDeltas {
        kept,
        deltas: kept_deltas,
        discarded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gathers_shared_reference_scores() {
        let deltas = compute_deltas(&[0, 1, 0], &[-1.5, -2.0], &[-1.0, -2.5, -3.5]).unwrap();
        assert_eq!(deltas, vec![-1.0 - -1.5, -2.5 - -2.0, -3.5 - -1.5]);
    }

    #[test]
    fn misaligned_inputs_are_errors() {
        assert!(matches!(
            compute_deltas(&[0, 0], &[1.0], &[1.0]),
            Err(AnalysisError::OracleFailure(_))
        ));
        assert!(matches!(
            compute_deltas(&[0, 2], &[1.0, 2.0], &[1.0, 1.0]),
            Err(AnalysisError::OracleFailure(_))
        ));
    }

    #[test]
    fn non_finite_deltas_are_dropped() {
        let deltas = [0.5, f64::NAN, -1.0, f64::INFINITY, f64::NEG_INFINITY, 2.0];
        let filtered = retain_finite(&deltas);
        assert_eq!(filtered.kept, vec![0, 2, 5]);
        assert_eq!(filtered.deltas, vec![0.5, -1.0, 2.0]);
        assert_eq!(filtered.discarded, 3);
    }

    #[test]
    fn all_discarded_is_empty_not_error() {
        let filtered = retain_finite(&[f64::NAN, f64::NAN]);
        assert!(filtered.is_empty());
        assert_eq!(filtered.discarded, 2);
    }
}
