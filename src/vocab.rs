//! Symbol table loading and batch encoding.

use crate::error::{Result, TtsError};
use crate::normalize::NormalizedText;
use crate::preprocessing::{length_to_mask, pad_sequences};
use ndarray::{Array2, Array3};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Index used for padding and for characters the table does not cover.
pub const UNKNOWN_SYMBOL: i64 = 0;

/// Lookup table from a character's code point to a model symbol index.
#[derive(Clone, Debug)]
pub struct SymbolTable {
    indexer: Vec<i64>,
}

/// A padded batch of symbol ids with its text mask.
#[derive(Clone, Debug)]
pub struct EncodedBatch {
    /// `[B, T]` symbol ids, zero-padded at the tail.
    pub ids: Array2<i64>,
    /// `[B, 1, T]` validity mask.
    pub mask: Array3<f32>,
    /// Unpadded length of each item, in characters.
    pub lengths: Vec<usize>,
}

impl SymbolTable {
    pub fn new(indexer: Vec<i64>) -> Self {
        Self { indexer }
    }

    /// Load the table from a JSON file holding a flat list of indices:
    /// ```json
    /// [0, 0, 0, 12, 57, ...]
    /// ```
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| TtsError::load(format!("symbol table {}: {}", path.display(), e)))?;
        let indexer: Vec<i64> = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| TtsError::load(format!("symbol table {}: {}", path.display(), e)))?;
        Ok(Self::new(indexer))
    }

    /// Map one character. Characters past the end of the table, and table
    /// entries marked unsupported (negative), fall back to [`UNKNOWN_SYMBOL`].
    pub fn index(&self, ch: char) -> i64 {
        match self.indexer.get(ch as usize) {
            Some(&id) if id >= 0 => id,
            _ => UNKNOWN_SYMBOL,
        }
    }

    /// Encode a batch of already-normalized texts.
    pub fn encode(&self, texts: &[NormalizedText]) -> Result<EncodedBatch> {
        if texts.is_empty() {
            return Err(TtsError::invalid_input("cannot encode an empty batch"));
        }

        let rows: Vec<Vec<i64>> = texts
            .iter()
            .map(|text| text.as_str().chars().map(|ch| self.index(ch)).collect())
            .collect();
        let lengths: Vec<usize> = rows.iter().map(Vec::len).collect();
        let max_len = lengths.iter().copied().max().unwrap_or(0);

        Ok(EncodedBatch {
            ids: pad_sequences(&rows, max_len),
            mask: length_to_mask(&lengths, Some(max_len)),
            lengths,
        })
    }

    /// Get the table size.
    pub fn len(&self) -> usize {
        self.indexer.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.indexer.is_empty()
    }
}
