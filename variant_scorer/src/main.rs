use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::analysis::report::{write_empty_summary, write_report, AnalysisOutcome};
use crate::config::Cli;
use crate::data_handling::reference_fasta::ReferenceFasta;
use crate::data_handling::variant_table::VariantTableSource;
use crate::helper_functions::resolve_path;
use crate::models::Dataset;
use crate::pipeline::run_analysis;
use crate::prediction_tools::evo2_integration::Evo2Oracle;

mod analysis;
mod config;
mod data_handling;
mod helper_functions;
mod models;
mod pipeline;
mod prediction_tools;

fn main() -> anyhow::Result<()> {
    // Setup logging and project configuration
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config().context("invalid configuration")?;
    info!("Starting BRCA1 variant scoring (window {} bp)", config.window_size);

    // Load inputs
    let sequence = ReferenceFasta {
        path: resolve_path(&config.reference_fasta),
    }
    .load()
    .context("loading reference sequence")?;

    let table = VariantTableSource {
        path: resolve_path(&config.variant_table),
        sheet_index: config.sheet_index,
        header_row: config.header_row,
    }
    .load()
    .context("loading variant table")?;

    // The oracle is owned here and handed to the pipeline
    let mut oracle = Evo2Oracle::new(
        config.oracle.python.as_deref(),
        &config.oracle.script,
        &config.oracle.model_name,
    )
    .context("starting scoring oracle")?;

    let output_dir = resolve_path(&config.output_dir);
    let outcome = match run_analysis(&config, &sequence, table, &mut oracle) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Scoring run halted: {}", e);
            return Err(e).context("scoring run failed; no results were written");
        }
    };

    match outcome {
        AnalysisOutcome::Scored(report) => {
            let files = write_report(&report, &output_dir)?;
            match report.auroc {
                Some(auroc) => println!("AUROC: {:.4} over {} variants", auroc, report.valid_variants()),
                None => println!("AUROC undefined over {} variants", report.valid_variants()),
            }
            if report.discarded_non_finite > 0 {
                println!("{} variants discarded (non-finite delta)", report.discarded_non_finite);
            }
            println!("Results: {}", files.summary_json.display());
        }
        AnalysisOutcome::Empty { reason, discarded } => {
            warn!("{} ({} variants discarded)", reason, discarded);
            let path = write_empty_summary(&reason, discarded, &output_dir)?;
            println!("No variants left to evaluate: {}", path.display());
        }
    }

    Ok(())
}
