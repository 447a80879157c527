use std::env;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use polars::prelude::*;
use tracing::info;

use crate::models::{AnalysisError, AnalysisResult};

pub fn project_root() -> PathBuf {
    match env::var_os("PROJECT_ROOT") {
        Some(val) => PathBuf::from(val),
        None => {
            // Fall back to current directory if PROJECT_ROOT not set
            env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        }
    }
}

/// Resolve `path` against [`project_root`] unless it is already absolute.
pub fn resolve_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root().join(path)
    }
}

/// Buffered reader over a plain or gzip'd (`.gz`) file.
pub fn get_dynamic_reader(path: &Path) -> AnalysisResult<Box<dyn BufRead>> {
    let is_gzipped = path.extension() == Some(OsStr::new("gz"));
    let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;

    let file: Box<dyn Read> = match is_gzipped {
        true => Box::new(MultiGzDecoder::new(file)),
        false => Box::new(file),
    };

    Ok(Box::new(BufReader::new(file)))
}

/// Upper-case a nucleotide string and map everything outside `ACGT` to `A`.
pub fn clean_sequence(raw: &str) -> String {
    raw.chars()
        .map(|c| match c.to_ascii_uppercase() {
            b @ ('A' | 'C' | 'G' | 'T') => b,
            _ => 'A',
        })
        .collect()
}

/// Upper-case an allele and map IUPAC ambiguity codes to `A`.
///
/// Symbols that are not nucleotides at all (`-`, `*`, `.`) are kept so the
/// window builder can reject the variant.
pub fn clean_allele(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c.to_ascii_uppercase() {
            'N' | 'R' | 'Y' | 'S' | 'W' | 'K' | 'M' | 'B' | 'D' | 'H' | 'V' => 'A',
            other => other,
        })
        .collect()
}

/// Read a delimited file with every column kept as a string.
///
/// `skip_rows` lines are dropped before the header line.
pub fn read_csv_as_strings(path: &Path, separator: u8, skip_rows: usize) -> AnalysisResult<DataFrame> {
    if !path.exists() {
        return Err(AnalysisError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        ));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_skip_rows(skip_rows)
        .with_infer_schema_length(Some(0))
        .map_parse_options(|o| o.with_separator(separator).with_truncate_ragged_lines(true))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    Ok(df)
}

pub fn dataframe_to_csv(df: &mut DataFrame, path: &Path) -> AnalysisResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AnalysisError::io(parent, e))?;
    }
    let mut file = File::create(path).map_err(|e| AnalysisError::io(path, e))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(df)?;

    info!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}
