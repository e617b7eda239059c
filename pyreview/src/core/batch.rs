//! Index-aligned per-item records carried through every pipeline stage.
//!
//! Each [`ReviewItem`] owns its source, extracted code, prompt, and (after
//! generation) response, so positional alignment between stages is structural
//! rather than a convention between parallel vectors.

use anyhow::{Result, bail};
use tracing::debug;

use crate::core::extract::{Extraction, extract};
use crate::core::types::{Origin, SourceItem, SourceKind};

/// One submission as it moves through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewItem {
    pub source: SourceItem,
    /// Program text extracted from `source`.
    pub code: String,
    /// Rendered instruction sent as the user turn.
    pub prompt: String,
    response: Option<String>,
}

impl ReviewItem {
    /// Decoded model feedback, once responses have been attached.
    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }
}

/// Ordered batch of review items; item `i` always belongs to input `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewBatch {
    items: Vec<ReviewItem>,
}

impl ReviewBatch {
    /// Extract code from every source and render its prompt, preserving input order.
    pub fn prepare<F>(sources: Vec<SourceItem>, mut build_prompt: F) -> Result<Self>
    where
        F: FnMut(&str) -> Result<String>,
    {
        let items = sources
            .into_iter()
            .map(|source| {
                let code = match extract(&source) {
                    Extraction::Extracted(code) => code,
                    Extraction::Raw(code) => {
                        if source.kind == SourceKind::Notebook {
                            debug!(source = %source.origin.label(), "treating notebook as plain text");
                        }
                        code
                    }
                };
                let prompt = build_prompt(&code)?;
                Ok(ReviewItem {
                    source,
                    code,
                    prompt,
                    response: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[ReviewItem] {
        &self.items
    }

    /// Prompts in batch order.
    pub fn prompts(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.prompt.as_str()).collect()
    }

    /// True when the run is the single standalone stream read from stdin.
    pub fn is_single_stream(&self) -> bool {
        matches!(self.items.as_slice(), [item] if item.source.origin == Origin::Stream)
    }

    /// Attach decoded responses; `responses[i]` belongs to item `i`.
    pub fn attach_responses(&mut self, responses: Vec<String>) -> Result<()> {
        if responses.len() != self.items.len() {
            bail!(
                "received {} responses for a batch of {} items",
                responses.len(),
                self.items.len()
            );
        }
        for (item, response) in self.items.iter_mut().zip(responses) {
            item.response = Some(response);
        }
        Ok(())
    }
}
