// Loader for the saturation-genome-editing variant spreadsheet.
//
// The sheet carries two banner rows above the header. Every cell is read as a
// string; only the columns the pipeline needs are parsed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use polars::prelude::*;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::helper_functions::{clean_allele, clean_sequence, read_csv_as_strings};
use crate::models::{AnalysisError, AnalysisResult, Dataset, FunctionalClass, VariantRecord};

pub const POS_COL: &str = "pos";
pub const REF_COL: &str = "ref";
pub const ALT_COL: &str = "alt";
pub const CLASS_COL: &str = "class";
pub const CHROM_COL: &str = "chrom";
pub const SCORE_COL: &str = "score";

const REQUIRED_COLUMNS: [&str; 4] = [POS_COL, REF_COL, ALT_COL, CLASS_COL];

/// Spreadsheet (or delimited text) holding one SNV per row.
pub struct VariantTableSource {
    pub path: PathBuf,
    pub sheet_index: usize,
    /// 0-based row of the header line; rows above it are banner text.
    pub header_row: usize,
}

/// Normalized variant rows: the raw frame (every input column kept, class
/// collapsed) and the typed records, aligned by row.
#[derive(Debug, Clone)]
pub struct VariantTable {
    frame: DataFrame,
    records: Vec<VariantRecord>,
}

impl VariantTable {
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn records(&self) -> &[VariantRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keep the first `n` rows; `None` keeps everything.
    pub fn limit(self, n: Option<usize>) -> Self {
        match n {
            Some(n) if n < self.records.len() => {
                info!("Restricting analysis to the first {} of {} variants", n, self.records.len());
                let mut records = self.records;
                records.truncate(n);
                Self {
                    frame: self.frame.head(Some(n)),
                    records,
                }
            }
            _ => self,
        }
    }
}

impl Dataset for VariantTableSource {
    type Output = VariantTable;

    fn load(&self) -> AnalysisResult<VariantTable> {
        info!("Reading variant table from {}", self.path.display());

        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();

        let raw = match ext.as_str() {
            "csv" => read_csv_as_strings(&self.path, b',', self.header_row)?,
            "tsv" | "txt" => read_csv_as_strings(&self.path, b'\t', self.header_row)?,
            _ => read_excel(&self.path, self.sheet_index, self.header_row)?,
        };
        debug!("Raw variant columns = {:?}", raw.get_column_names());

        let frame = normalize_columns(raw, &self.path)?;
        let (frame, source_rows) = drop_blank_rows(frame)?;
        // 1-based sheet row of each data row: header_row is 0-based, data starts below it
        let sheet_rows: Vec<usize> = source_rows.iter().map(|r| self.header_row + 2 + r).collect();
        let records = extract_records(&frame, &sheet_rows)?;
        let frame = collapse_class_column(frame, &records)?;

        let lof = records.iter().filter(|r| r.class.is_lof()).count();
        info!(
            "Loaded {} variants ({} LOF, {} other)",
            records.len(),
            lof,
            records.len() - lof
        );

        Ok(VariantTable { frame, records })
    }
}

// ─── read_excel ──────────────────────────────────────────────────────────────

fn cell_to_string(cell: &calamine::DataType) -> String {
    use calamine::DataType as Ct;
    match cell {
        Ct::String(s) => s.clone(),
        Ct::Empty => String::new(),
        Ct::Bool(b) => b.to_string(),
        Ct::Error(e) => format!("ERR({e:?})"),
        Ct::Float(n) | Ct::Duration(n) => n.to_string(),
        Ct::Int(i) => i.to_string(),
        Ct::DateTime(f) => f.to_string(),
        Ct::DateTimeIso(s) | Ct::DurationIso(s) => s.clone(),
    }
}

/// xlsx/xls/ods → all-string DataFrame, header taken from `header_row`.
fn read_excel(path: &Path, sheet_idx: usize, header_row: usize) -> AnalysisResult<DataFrame> {
    use calamine::{open_workbook_auto, Reader};

    if !path.exists() {
        return Err(AnalysisError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        ));
    }

    let mut wb = open_workbook_auto(path).map_err(|e| AnalysisError::Spreadsheet(format!("{}: {e}", path.display())))?;
    let range = wb
        .worksheet_range_at(sheet_idx)
        .ok_or_else(|| AnalysisError::Spreadsheet(format!("{}: worksheet {sheet_idx} missing", path.display())))?
        .map_err(|e| AnalysisError::Spreadsheet(format!("{}: {e}", path.display())))?;

    // calamine trims leading empty rows; header_row counts from the top of the sheet
    let first_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);
    if header_row < first_row {
        return Err(AnalysisError::Spreadsheet(format!(
            "{}: header row {} is empty",
            path.display(),
            header_row
        )));
    }

    let mut rows = range.rows().skip(header_row - first_row);
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| AnalysisError::Spreadsheet(format!("{}: no header row", path.display())))?
        .iter()
        .map(cell_to_string)
        .collect();
    let headers = dedupe_headers(headers);
    debug!("Variant sheet header = {:?}", headers);

    let mut cols: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(range.height()); headers.len()];
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(headers.len()) {
            cols[i].push(match cell {
                calamine::DataType::Empty => None,
                _ => Some(cell_to_string(cell)),
            });
        }
    }

    let series: Vec<Series> = headers
        .into_iter()
        .zip(cols)
        .map(|(h, c)| Series::new(PlSmallStr::from(h), c))
        .collect();

    Ok(DataFrame::new(series.into_iter().map(Into::into).collect())?)
}

/// Blank or repeated header cells would make polars reject the frame.
fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    headers
        .into_iter()
        .enumerate()
        .map(|(i, h)| {
            let base = if h.trim().is_empty() {
                format!("column_{i}")
            } else {
                h.trim().to_string()
            };
            let mut name = base.clone();
            let mut n = 1;
            while !seen.insert(name.clone()) {
                name = format!("{base}_{n}");
                n += 1;
            }
            name
        })
        .collect()
}

// ─── normalization ───────────────────────────────────────────────────────────

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static POSITION_HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(position( \(.*\))?|pos)$").unwrap());

/// Canonical short name for a spreadsheet header, if it is one we use.
fn canonical_name(header: &str) -> Option<&'static str> {
    let key = WHITESPACE.replace_all(header.trim(), " ").to_ascii_lowercase();

    if POSITION_HEADER.is_match(&key) {
        return Some(POS_COL);
    }
    match key.as_str() {
        "reference" | "ref" => Some(REF_COL),
        "alt" | "alternate" => Some(ALT_COL),
        "func.class" | "class" => Some(CLASS_COL),
        "chromosome" | "chrom" => Some(CHROM_COL),
        "function.score.mean" | "score" => Some(SCORE_COL),
        _ => None,
    }
}

fn normalize_columns(mut df: DataFrame, path: &Path) -> AnalysisResult<DataFrame> {
    let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    let mut taken: HashSet<String> = names.iter().cloned().collect();

    for old in &names {
        let Some(new) = canonical_name(old) else {
            continue;
        };
        if old == new {
            continue;
        }
        if taken.contains(new) {
            warn!("Column `{}` would shadow existing `{}`, keeping original name", old, new);
            continue;
        }
        df.rename(old, PlSmallStr::from(new))?;
        taken.remove(old);
        taken.insert(new.to_string());
    }

    for column in REQUIRED_COLUMNS {
        if !taken.contains(column) {
            return Err(AnalysisError::MissingColumn {
                column: column.to_string(),
                path: path.to_path_buf(),
            });
        }
    }

    Ok(df)
}

/// Sheets often carry formatted-but-empty trailing rows.
///
/// Also returns the pre-drop index of every kept row.
fn drop_blank_rows(df: DataFrame) -> AnalysisResult<(DataFrame, Vec<usize>)> {
    let cols = REQUIRED_COLUMNS
        .iter()
        .map(|c| df.column(c).and_then(|s| s.str().cloned()))
        .collect::<PolarsResult<Vec<_>>>()?;

    let keep: Vec<bool> = (0..df.height())
        .map(|i| {
            cols.iter()
                .any(|c| c.get(i).map_or(false, |v| !v.trim().is_empty()))
        })
        .collect();

    let kept: Vec<usize> = (0..keep.len()).filter(|&i| keep[i]).collect();
    let dropped = keep.len() - kept.len();
    if dropped == 0 {
        return Ok((df, kept));
    }
    debug!("Dropping {} blank rows", dropped);
    let mask = BooleanChunked::from_slice(PlSmallStr::from_static("keep"), &keep);
    Ok((df.filter(&mask)?, kept))
}

fn parse_position(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(p) = raw.parse::<u64>() {
        return (p > 0).then_some(p);
    }
    // numeric cells come back from calamine as floats
    let f = raw.parse::<f64>().ok()?;
    (f.is_finite() && f >= 1.0 && f.fract() == 0.0).then_some(f as u64)
}

/// `sheet_rows[i]` is the row number the user sees for frame row `i`; it is
/// only used in error messages.
fn extract_records(df: &DataFrame, sheet_rows: &[usize]) -> AnalysisResult<Vec<VariantRecord>> {
    let pos = df.column(POS_COL)?.str()?;
    let reference = df.column(REF_COL)?.str()?;
    let alt = df.column(ALT_COL)?.str()?;
    let class = df.column(CLASS_COL)?.str()?;
    let chrom = match df.column(CHROM_COL) {
        Ok(c) => Some(c.str()?.clone()),
        Err(_) => None,
    };
    let score = match df.column(SCORE_COL) {
        Ok(c) => Some(c.str()?.clone()),
        Err(_) => None,
    };

    let invalid = |i: usize, column: &str, value: Option<&str>| AnalysisError::InvalidRow {
        row: sheet_rows.get(i).copied().unwrap_or(i + 1),
        column: column.to_string(),
        value: value.unwrap_or_default().to_string(),
    };

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let position = pos
            .get(i)
            .and_then(parse_position)
            .ok_or_else(|| invalid(i, POS_COL, pos.get(i)))?;
        let alternate = alt
            .get(i)
            .map(clean_allele)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| invalid(i, ALT_COL, alt.get(i)))?;
        let label = class.get(i).ok_or_else(|| invalid(i, CLASS_COL, None))?;

        records.push(VariantRecord {
            row: i,
            position,
            reference: reference.get(i).map(clean_sequence).unwrap_or_default(),
            alternate,
            class: FunctionalClass::from_label(label),
            chrom: chrom.as_ref().and_then(|c| c.get(i)).map(str::to_string),
            function_score: score
                .as_ref()
                .and_then(|s| s.get(i))
                .and_then(|s| s.trim().parse::<f64>().ok()),
        });
    }

    Ok(records)
}

fn collapse_class_column(mut df: DataFrame, records: &[VariantRecord]) -> AnalysisResult<DataFrame> {
    let labels: Vec<&str> = records.iter().map(|r| r.class.as_str()).collect();
    df.with_column(Series::new(PlSmallStr::from_static(CLASS_COL), labels))?;
    Ok(df)
}
