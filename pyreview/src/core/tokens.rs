//! Batched token sequences and prompt-echo stripping.
//!
//! A [`TokenBatch`] keeps every item's unpadded length next to the padded rows.
//! Echo stripping must slice by that per-item length, never by the padded width,
//! or shorter items in the batch lose the start of their response.

use anyhow::{Result, bail};

/// Right-padded batch of token ids, index-aligned with the prompts that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBatch {
    rows: Vec<Vec<u32>>,
    lengths: Vec<usize>,
    pad_id: u32,
}

impl TokenBatch {
    /// Pad `sequences` on the right with `pad_id` to the longest sequence.
    pub fn from_sequences(sequences: Vec<Vec<u32>>, pad_id: u32) -> Self {
        let width = sequences.iter().map(Vec::len).max().unwrap_or(0);
        let lengths: Vec<usize> = sequences.iter().map(Vec::len).collect();
        let rows = sequences
            .into_iter()
            .map(|mut row| {
                row.resize(width, pad_id);
                row
            })
            .collect();
        Self {
            rows,
            lengths,
            pad_id,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Padded width shared by every row.
    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    /// Unpadded input length of each item.
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Padded row `index`.
    pub fn row(&self, index: usize) -> &[u32] {
        &self.rows[index]
    }

    /// Row `index` without its padding.
    pub fn unpadded(&self, index: usize) -> &[u32] {
        &self.rows[index][..self.lengths[index]]
    }
}

/// Drop the echoed prompt from each generated sequence.
///
/// `outputs[i]` must start with the unpadded prompt of item `i`; only the tokens
/// after it are returned, in batch order.
pub fn strip_echo<'a>(batch: &TokenBatch, outputs: &'a [Vec<u32>]) -> Result<Vec<&'a [u32]>> {
    if outputs.len() != batch.len() {
        bail!(
            "model returned {} sequences for a batch of {}",
            outputs.len(),
            batch.len()
        );
    }
    outputs
        .iter()
        .zip(batch.lengths())
        .enumerate()
        .map(|(index, (output, &input_len))| {
            if output.len() < input_len {
                bail!(
                    "sequence {index} has {} tokens, shorter than its {input_len}-token prompt",
                    output.len()
                );
            }
            Ok(&output[input_len..])
        })
        .collect()
}
