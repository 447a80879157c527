use std::fmt;
use std::path::PathBuf;

use polars::prelude::PolarsError;
use serde::Serialize;
use thiserror::Error;

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Everything that can stop a scoring run.
///
/// Non-finite oracle scores are *not* errors; they are filtered and counted by
/// the delta evaluator.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no sequence found in {path}")]
    EmptySequence { path: PathBuf },

    #[error("malformed FASTA {path}: {reason}")]
    InvalidFasta { path: PathBuf, reason: String },

    #[error("required column `{column}` missing from {path}")]
    MissingColumn { column: String, path: PathBuf },

    /// `row` is the 1-based row number as shown in the spreadsheet.
    #[error("sheet row {row}: invalid value {value:?} in column `{column}`")]
    InvalidRow {
        row: usize,
        column: String,
        value: String,
    },

    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("scoring oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("scoring oracle returned unusable output: {0}")]
    OracleFailure(String),

    #[error("plotting failed: {0}")]
    Plot(String),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AnalysisError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Anything plotters hands back is flattened into a [`AnalysisError::Plot`].
pub fn plot_err<E: fmt::Display>(e: E) -> AnalysisError {
    AnalysisError::Plot(e.to_string())
}

/// An input source that can be materialised into memory.
pub trait Dataset {
    type Output;

    fn load(&self) -> AnalysisResult<Self::Output>;
}

/// Functional class of a variant after `FUNC`/`INT` have been collapsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FunctionalClass {
    FuncInt,
    Lof,
    Other(String),
}

impl FunctionalClass {
    pub const FUNC_INT: &'static str = "FUNC/INT";
    pub const LOF: &'static str = "LOF";

    pub fn from_label(raw: &str) -> Self {
        match raw.trim() {
            "FUNC" | "INT" | Self::FUNC_INT => FunctionalClass::FuncInt,
            Self::LOF => FunctionalClass::Lof,
            other => FunctionalClass::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FunctionalClass::FuncInt => Self::FUNC_INT,
            FunctionalClass::Lof => Self::LOF,
            FunctionalClass::Other(s) => s,
        }
    }

    /// Positive label for the AUROC: loss-of-function.
    pub fn is_lof(&self) -> bool {
        matches!(self, FunctionalClass::Lof)
    }
}

impl fmt::Display for FunctionalClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for FunctionalClass {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One row of the variant spreadsheet.
#[derive(Debug, Clone, Serialize)]
pub struct VariantRecord {
    /// Row index within the (possibly truncated) table.
    pub row: usize,
    /// 1-based genomic position.
    pub position: u64,
    pub reference: String,
    pub alternate: String,
    pub class: FunctionalClass,
    pub chrom: Option<String>,
    pub function_score: Option<f64>,
}

impl VariantRecord {
    /// 0-based offset into the chromosome.
    pub fn offset(&self) -> usize {
        self.position.saturating_sub(1) as usize
    }
}

/// A variant that survived filtering, with its delta score attached.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredVariant {
    #[serde(flatten)]
    pub record: VariantRecord,
    pub evo2_delta_score: f64,
}
