use std::collections::HashMap;

use thiserror::Error;

use crate::data_handling::reference_fasta::Sequence;

/// Reference/variant window pair around one SNV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPair {
    pub start: usize,
    pub end: usize,
    /// Position of the SNV inside `reference`.
    pub offset: usize,
    pub reference: String,
    pub variant: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("window size {0} must be a positive even number")]
    OddWindow(usize),
    #[error("position {position} lies outside the sequence (length {len})")]
    PositionOutOfBounds { position: usize, len: usize },
    #[error("alternate allele {0:?} is not a single A/C/G/T base")]
    InvalidAlternate(String),
}

/// Cut the reference window centred on `position` (0-based) and substitute
/// `alt` at the SNV offset.
///
/// Near the start of the sequence the window is clipped on the left and the
/// offset shrinks to `position`; near the end it is clipped on the right and
/// the offset stays at `window_size / 2`, which still points at `position`.
pub fn build_window(
    sequence: &Sequence,
    position: usize,
    window_size: usize,
    alt: &str,
) -> Result<WindowPair, WindowError> {
    if window_size == 0 || window_size % 2 != 0 {
        return Err(WindowError::OddWindow(window_size));
    }
    let len = sequence.len();
    if position >= len {
        return Err(WindowError::PositionOutOfBounds { position, len });
    }
    if !matches!(alt, "A" | "C" | "G" | "T") {
        return Err(WindowError::InvalidAlternate(alt.to_string()));
    }

    let half = window_size / 2;
    let start = position.saturating_sub(half);
    let end = len.min(position + half);
    let reference = sequence.window(start, end);

    let offset = half.min(position);
    debug_assert_eq!(start + offset, position);

    let mut variant = String::with_capacity(reference.len());
    variant.push_str(&reference[..offset]);
    variant.push_str(alt);
    variant.push_str(&reference[offset + 1..]);

    Ok(WindowPair {
        start,
        end,
        offset,
        reference: reference.to_string(),
        variant,
    })
}

/// Content → dense id map so each distinct reference window is scored once.
#[derive(Debug, Default)]
pub struct DedupIndex {
    index: HashMap<String, usize>,
    windows: Vec<String>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup_or_insert(&mut self, window: &str) -> usize {
        if let Some(&idx) = self.index.get(window) {
            return idx;
        }
        let idx = self.windows.len();
        self.index.insert(window.to_string(), idx);
        self.windows.push(window.to_string());
        idx
    }

    /// Distinct windows in insertion order; position `i` has id `i`.
    pub fn windows(&self) -> &[String] {
        &self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
