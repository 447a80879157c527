use std::path::PathBuf;

use seq_io::fasta::{Reader, Record};
use tracing::{debug, info};

use crate::helper_functions::{clean_sequence, get_dynamic_reader};
use crate::models::{AnalysisError, AnalysisResult, Dataset};

/// A single chromosome held in memory, normalized to `ACGT`.
#[derive(Debug, Clone)]
pub struct Sequence {
    id: String,
    bases: String,
}

impl Sequence {
    pub fn new(id: impl Into<String>, raw: &str) -> Self {
        Self {
            id: id.into(),
            bases: clean_sequence(raw),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.bases
    }

    /// `S[start..end]`, both already clamped by the caller.
    pub fn window(&self, start: usize, end: usize) -> &str {
        &self.bases[start..end]
    }

    pub fn base_at(&self, offset: usize) -> Option<char> {
        self.bases.as_bytes().get(offset).map(|&b| b as char)
    }
}

/// Gzip'd (or plain) FASTA holding the reference chromosome.
pub struct ReferenceFasta {
    pub path: PathBuf,
}

impl ReferenceFasta {
    fn malformed(&self, reason: impl ToString) -> AnalysisError {
        AnalysisError::InvalidFasta {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

impl Dataset for ReferenceFasta {
    type Output = Sequence;

    /// Only the first record is consumed; the rest of the file is never read.
    fn load(&self) -> AnalysisResult<Sequence> {
        info!("Reading reference sequence from {}", self.path.display());
        let mut fasta_reader = Reader::new(get_dynamic_reader(&self.path)?);

        let record = match fasta_reader.next() {
            Some(record) => record.map_err(|e| self.malformed(e))?,
            None => {
                return Err(AnalysisError::EmptySequence {
                    path: self.path.clone(),
                })
            }
        };
        let id = record.id().map_err(|e| self.malformed(e))?.to_string();

        let mut raw = Vec::new();
        for seq_line in record.seq_lines() {
            raw.extend(seq_line.iter().filter(|b| !b.is_ascii_whitespace()));
        }
        if raw.is_empty() {
            return Err(AnalysisError::EmptySequence {
                path: self.path.clone(),
            });
        }

        let sequence = Sequence::new(id, &String::from_utf8_lossy(&raw));
        debug!("First record of {} taken as the reference", self.path.display());
        info!("Loaded {} ({} bp)", sequence.id(), sequence.len());
        Ok(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs::File;
    use std::io::Write;

    fn write_gz(path: &std::path::Path, body: &str) {
        let mut enc = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        enc.write_all(body.as_bytes()).unwrap();
        enc.finish().unwrap();
    }

    #[test]
    fn loads_first_record_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chr17.fna.gz");
        write_gz(&path, ">NC_000017.10 Homo sapiens chromosome 17\nacgtn\nNNGG\n>second\nTTTT\n");

        let seq = ReferenceFasta { path }.load().unwrap();
        assert_eq!(seq.id(), "NC_000017.10");
        assert_eq!(seq.as_str(), "ACGTAAAGG");
        assert_eq!(seq.base_at(2), Some('G'));
        assert_eq!(seq.base_at(9), None);
    }

    #[test]
    fn plain_fasta_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chr.fa");
        std::fs::write(&path, ">chr\r\nAAAA\r\n\r\nCCCC\r\n").unwrap();

        let seq = ReferenceFasta { path }.load().unwrap();
        assert_eq!(seq.as_str(), "AAAACCCC");
    }

    #[test]
    fn empty_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.fa.gz");
        write_gz(&path, ">chr17\n\n");

        match (ReferenceFasta { path: path.clone() }).load() {
            Err(AnalysisError::EmptySequence { path: p }) => assert_eq!(p, path),
            other => panic!("expected EmptySequence, got {other:?}"),
        }
    }

    #[test]
    fn sequence_before_header_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("headless.fa");
        std::fs::write(&path, "ACGT\n>chr17\nAAAA\n").unwrap();

        let err = ReferenceFasta { path }.load().unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidFasta { .. }), "{err:?}");
    }

    #[test]
    fn empty_file_has_no_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nothing.fa");
        std::fs::write(&path, "").unwrap();

        let err = ReferenceFasta { path }.load().unwrap_err();
        assert!(matches!(err, AnalysisError::EmptySequence { .. }), "{err:?}");
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = ReferenceFasta {
            path: PathBuf::from("/no/such/chr17.fna.gz"),
        }
        .load()
        .unwrap_err();
        assert!(err.to_string().contains("/no/such/chr17.fna.gz"));
    }
}
