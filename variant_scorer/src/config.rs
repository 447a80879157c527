use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{AnalysisError, AnalysisResult};

pub const DEFAULT_WINDOW_SIZE: usize = 8192;
pub const DEFAULT_SUBSET_SIZE: usize = 500;
pub const DEFAULT_MODEL: &str = "evo2_1b_base";

/// Everything a scoring run needs, passed explicitly to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub reference_fasta: PathBuf,
    pub variant_table: PathBuf,
    pub sheet_index: usize,
    /// 0-based row holding the column names.
    pub header_row: usize,
    pub window_size: usize,
    /// First `n` variants only; `None` scores the whole table.
    pub subset_size: Option<usize>,
    /// Sequences per oracle call; `None` sends everything at once.
    pub batch_size: Option<usize>,
    pub sanity_check: bool,
    pub output_dir: PathBuf,
    pub embed_plot: bool,
    pub jitter_seed: u64,
    pub oracle: OracleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    /// Interpreter for the bridge script; `python3` on `PATH` when unset.
    pub python: Option<PathBuf>,
    pub script: PathBuf,
    pub model_name: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            reference_fasta: PathBuf::from("evo2/notebooks/brca1/GRCh37.p13_chr17.fna.gz"),
            variant_table: PathBuf::from("evo2/notebooks/brca1/41586_2018_461_MOESM3_ESM.xlsx"),
            sheet_index: 0,
            header_row: 2,
            window_size: DEFAULT_WINDOW_SIZE,
            subset_size: Some(DEFAULT_SUBSET_SIZE),
            batch_size: None,
            sanity_check: true,
            output_dir: PathBuf::from("./brca1_results"),
            embed_plot: true,
            jitter_seed: 42,
            oracle: OracleConfig::default(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            python: None,
            script: PathBuf::from("scripts/score_sequences.py"),
            model_name: DEFAULT_MODEL.to_string(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_file(path: &Path) -> AnalysisResult<Self> {
        info!("Reading configuration from {}", path.display());
        let text = fs::read_to_string(path).map_err(|e| AnalysisError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        if self.window_size == 0 || self.window_size % 2 != 0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "window_size must be a positive even number, got {}",
                self.window_size
            )));
        }
        if self.subset_size == Some(0) {
            return Err(AnalysisError::InvalidConfig("subset_size must be at least 1".into()));
        }
        if self.batch_size == Some(0) {
            return Err(AnalysisError::InvalidConfig("batch_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Score BRCA1 SNVs with Evo2 and report how well the delta score separates
/// loss-of-function variants.
#[derive(Parser, Debug, Default)]
#[command(name = "variant_scorer", version)]
pub struct Cli {
    /// JSON configuration file; flags below override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Gzip'd FASTA of the chromosome (first record is used)
    #[arg(long)]
    pub reference: Option<PathBuf>,

    /// Variant spreadsheet (.xlsx/.csv/.tsv)
    #[arg(long)]
    pub variants: Option<PathBuf>,

    #[arg(long)]
    pub sheet_index: Option<usize>,

    #[arg(long)]
    pub header_row: Option<usize>,

    /// Window length around each SNV (even)
    #[arg(long)]
    pub window_size: Option<usize>,

    /// Number of variant rows to score
    #[arg(long, conflicts_with = "all_variants")]
    pub subset: Option<usize>,

    /// Score every row of the variant table
    #[arg(long)]
    pub all_variants: bool,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[arg(long)]
    pub python: Option<PathBuf>,

    #[arg(long)]
    pub script: Option<PathBuf>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub skip_sanity_check: bool,

    /// Do not embed the plot as base64 in summary.json
    #[arg(long)]
    pub no_embed_plot: bool,
}

impl Cli {
    pub fn into_config(self) -> AnalysisResult<AnalysisConfig> {
        let mut cfg = match &self.config {
            Some(path) => AnalysisConfig::from_json_file(path)?,
            None => AnalysisConfig::default(),
        };

        if let Some(v) = self.reference {
            cfg.reference_fasta = v;
        }
        if let Some(v) = self.variants {
            cfg.variant_table = v;
        }
        if let Some(v) = self.sheet_index {
            cfg.sheet_index = v;
        }
        if let Some(v) = self.header_row {
            cfg.header_row = v;
        }
        if let Some(v) = self.window_size {
            cfg.window_size = v;
        }
        if self.all_variants {
            cfg.subset_size = None;
        } else if let Some(v) = self.subset {
            cfg.subset_size = Some(v);
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = Some(v);
        }
        if let Some(v) = self.output_dir {
            cfg.output_dir = v;
        }
        if let Some(v) = self.python {
            cfg.oracle.python = Some(v);
        }
        if let Some(v) = self.script {
            cfg.oracle.script = v;
        }
        if let Some(v) = self.model {
            cfg.oracle.model_name = v;
        }
        if self.skip_sanity_check {
            cfg.sanity_check = false;
        }
        if self.no_embed_plot {
            cfg.embed_plot = false;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}
