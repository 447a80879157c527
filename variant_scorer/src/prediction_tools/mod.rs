pub mod evo2_integration;

use tracing::{debug, error, info};

use crate::models::{AnalysisError, AnalysisResult};

/// A pretrained sequence model seen as a black box: one log-likelihood-like
/// score per input sequence, in input order.
///
/// Implementations normalize whatever their backend returns into plain `f64`.
/// Non-finite values are allowed and are filtered downstream.
pub trait ScoringOracle {
    fn name(&self) -> &str;

    fn score_batch(&mut self, sequences: &[String]) -> AnalysisResult<Vec<f64>>;
}

/// Score `sequences` in chunks of `batch_size` (all at once when `None`),
/// concatenating results in input order.
pub fn score_all<O: ScoringOracle + ?Sized>(
    oracle: &mut O,
    sequences: &[String],
    batch_size: Option<usize>,
) -> AnalysisResult<Vec<f64>> {
    if sequences.is_empty() {
        return Ok(Vec::new());
    }
    let chunk = batch_size.filter(|&b| b > 0).unwrap_or(sequences.len());

    let mut scores = Vec::with_capacity(sequences.len());
    for (i, batch) in sequences.chunks(chunk).enumerate() {
        debug!("{}: scoring batch {} ({} sequences)", oracle.name(), i, batch.len());
        let out = oracle.score_batch(batch)?;
        if out.len() != batch.len() {
            error!("{} returned {} scores for {} sequences", oracle.name(), out.len(), batch.len());
            return Err(AnalysisError::OracleFailure(format!(
                "{} returned {} scores for a batch of {}",
                oracle.name(),
                out.len(),
                batch.len()
            )));
        }
        scores.extend(out);
    }

    Ok(scores)
}

/// Score a fixed low-complexity sequence before touching any variants.
///
/// A crash or a non-finite score means the model is not usable in this
/// environment and the run must stop.
pub fn sanity_probe<O: ScoringOracle + ?Sized>(oracle: &mut O) -> AnalysisResult<f64> {
    info!("Running sanity check on {}", oracle.name());
    let probe = vec!["ACGT".repeat(200)];

    let score = match oracle.score_batch(&probe) {
        Ok(scores) => scores.first().copied().ok_or_else(|| {
            AnalysisError::OracleUnavailable("sanity check returned no score".into())
        })?,
        Err(e) => {
            error!("Sanity check crashed: {}", e);
            return Err(AnalysisError::OracleUnavailable(format!("sanity check crashed: {e}")));
        }
    };

    if !score.is_finite() {
        error!("{} returned {} on the sanity sequence", oracle.name(), score);
        return Err(AnalysisError::OracleUnavailable(format!(
            "sanity check score is {score}; the model is not usable in this environment"
        )));
    }

    info!("Sanity check score: {}", score);
    Ok(score)
}
