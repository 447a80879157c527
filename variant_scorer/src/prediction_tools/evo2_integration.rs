use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;

use polars::prelude::*;
use tempfile::TempDir;
use tracing::{debug, error, info};

use crate::helper_functions::{read_csv_as_strings, resolve_path};
use crate::models::{AnalysisError, AnalysisResult};
use crate::prediction_tools::ScoringOracle;

const SEQUENCE_COL: &str = "sequence";
const SCORE_COL: &str = "score";

/// Evo2 run out-of-process through a Python bridge script.
///
/// Each batch is written to a CSV in a private scratch directory, scored by
/// `script --input <csv> --output <csv> --model <name>`, and read back from
/// the `score` column.
pub struct Evo2Oracle {
    python: PathBuf,
    script: PathBuf,
    model_name: String,
    scratch: TempDir,
    batches: usize,
}

impl Evo2Oracle {
    /// `python = None` picks the first `python3` on `PATH`.
    pub fn new(python: Option<&Path>, script: &Path, model_name: &str) -> AnalysisResult<Self> {
        let python = match python {
            Some(p) => resolve_path(p),
            None => which::which("python3")
                .map_err(|e| AnalysisError::OracleUnavailable(format!("no python3 interpreter found: {e}")))?,
        };
        let script = resolve_path(script);
        if !script.exists() {
            return Err(AnalysisError::OracleUnavailable(format!(
                "bridge script {} not found",
                script.display()
            )));
        }
        let scratch = tempfile::Builder::new()
            .prefix("evo2_scoring")
            .tempdir()
            .map_err(|e| AnalysisError::io(std::env::temp_dir(), e))?;

        info!(
            "Using {} via {} ({})",
            model_name,
            script.display(),
            python.display()
        );
        Ok(Self {
            python,
            script,
            model_name: model_name.to_string(),
            scratch,
            batches: 0,
        })
    }

    fn write_input(&self, sequences: &[String], path: &Path) -> AnalysisResult<()> {
        let mut df = DataFrame::new(vec![Series::new(
            PlSmallStr::from_static(SEQUENCE_COL),
            sequences,
        )
        .into()])?;
        let mut f = File::create(path).map_err(|e| AnalysisError::io(path, e))?;
        CsvWriter::new(&mut f).include_header(true).finish(&mut df)?;
        Ok(())
    }
}

/// A score cell must be a float literal; `nan` and `inf` are legal values
/// and are filtered later, anything else means the bridge is broken.
fn parse_score(row: usize, cell: Option<&str>) -> AnalysisResult<f64> {
    let text = cell.map(str::trim).unwrap_or_default();
    text.parse::<f64>().map_err(|_| {
        AnalysisError::OracleFailure(format!("score row {row}: cannot parse {text:?} as a number"))
    })
}

impl ScoringOracle for Evo2Oracle {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn score_batch(&mut self, sequences: &[String]) -> AnalysisResult<Vec<f64>> {
        self.batches += 1;
        let input_path = self.scratch.path().join(format!("evo2_input_{}.csv", self.batches));
        let output_path = self.scratch.path().join(format!("evo2_output_{}.csv", self.batches));

        // 1) dump the batch
        self.write_input(sequences, &input_path)?;

        // 2) call into Python
        let mut cmd = Command::new(&self.python);
        cmd.arg(&self.script)
            .arg("--input")
            .arg(&input_path)
            .arg("--output")
            .arg(&output_path)
            .arg("--model")
            .arg(&self.model_name)
            .env("VORTEX_DISABLE_TQDM", "1");
        debug!("Command: {:?}", cmd);

        let output = cmd.output().map_err(|e| {
            AnalysisError::OracleUnavailable(format!("failed to launch {}: {e}", self.python.display()))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("Evo2 scoring failed: {stderr}");
            return Err(AnalysisError::OracleUnavailable(format!(
                "{} exited with {}: {}",
                self.model_name,
                output.status,
                stderr.trim()
            )));
        }
        if !output_path.exists() {
            return Err(AnalysisError::OracleUnavailable(format!(
                "{} produced no output file",
                self.model_name
            )));
        }

        // 3) read back what Python wrote; NaN/inf come through as text
        let result_df = read_csv_as_strings(&output_path, b',', 0)?;
        let column = result_df.column(SCORE_COL).map_err(|_| AnalysisError::MissingColumn {
            column: SCORE_COL.to_string(),
            path: output_path.clone(),
        })?;
        let scores = column
            .str()?
            .into_iter()
            .enumerate()
            .map(|(row, cell)| parse_score(row, cell))
            .collect::<AnalysisResult<Vec<f64>>>()?;

        debug!("{} scored {} sequences", self.model_name, scores.len());
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_script_is_unavailable() {
        let err = Evo2Oracle::new(
            Some(Path::new("/usr/bin/python3")),
            Path::new("/definitely/not/here.py"),
            "evo2_1b_base",
        )
        .err()
        .unwrap();
        assert!(matches!(err, AnalysisError::OracleUnavailable(_)));
    }

    // `/bin/sh` stands in for the interpreter and runs the "bridge script"
    #[cfg(unix)]
    #[test]
    fn reads_scores_from_bridge_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("score_sequences.sh");
        std::fs::write(
            &script,
            "while [ $# -gt 0 ]; do if [ \"$1\" = --output ]; then out=$2; fi; shift; done\n\
             printf 'score\\n-1.25\\nnan\\n-inf\\n' > \"$out\"\n",
        )
        .unwrap();

        let mut oracle = Evo2Oracle::new(Some(Path::new("/bin/sh")), &script, "evo2_1b_base").unwrap();
        let seqs = vec!["ACGT".to_string(), "AAAA".to_string(), "CCCC".to_string()];
        let scores = oracle.score_batch(&seqs).unwrap();

        assert_eq!(scores[0], -1.25);
        assert!(scores[1].is_nan());
        assert_eq!(scores[2], f64::NEG_INFINITY);
    }

    #[test]
    fn score_cells_must_be_numbers() {
        assert_eq!(parse_score(0, Some(" -0.5 ")).unwrap(), -0.5);
        assert!(parse_score(0, Some("nan")).unwrap().is_nan());
        assert_eq!(parse_score(0, Some("inf")).unwrap(), f64::INFINITY);
        assert!(matches!(parse_score(3, None), Err(AnalysisError::OracleFailure(_))));
        assert!(matches!(parse_score(3, Some("")), Err(AnalysisError::OracleFailure(_))));
    }

    #[cfg(unix)]
    #[test]
    fn unparseable_bridge_output_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("score_sequences.sh");
        std::fs::write(
            &script,
            "while [ $# -gt 0 ]; do if [ \"$1\" = --output ]; then out=$2; fi; shift; done\n\
             printf 'score\\n-0.5\\ntensor(-1.25)\\n' > \"$out\"\n",
        )
        .unwrap();

        let mut oracle = Evo2Oracle::new(Some(Path::new("/bin/sh")), &script, "evo2_1b_base").unwrap();
        let seqs = vec!["ACGT".to_string(), "AAAA".to_string()];
        match oracle.score_batch(&seqs) {
            Err(AnalysisError::OracleFailure(msg)) => {
                assert!(msg.contains("row 1"), "{msg}");
                assert!(msg.contains("tensor(-1.25)"), "{msg}");
            }
            other => panic!("expected OracleFailure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn failing_bridge_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("score_sequences.sh");
        std::fs::write(&script, "echo 'CUDA out of memory' >&2\nexit 3\n").unwrap();

        let mut oracle = Evo2Oracle::new(Some(Path::new("/bin/sh")), &script, "evo2_1b_base").unwrap();
        match oracle.score_batch(&["ACGT".to_string()]) {
            Err(AnalysisError::OracleUnavailable(msg)) => assert!(msg.contains("CUDA out of memory")),
            other => panic!("expected OracleUnavailable, got {other:?}"),
        }
    }
}
