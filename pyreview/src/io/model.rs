//! Language model capability used by the review pipeline.
//!
//! The [`LanguageModel`] trait decouples the pipeline from the model runtime
//! (currently `candle` with Hugging Face tokenizers, see [`crate::io::hf`]).
//! Tests use a scripted model that never loads weights.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::tokens::TokenBatch;

/// One turn of a chat exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Upper bound on newly generated tokens per item.
    pub max_new_tokens: usize,
    /// Sampling temperature; `0.0` selects greedy decoding.
    pub temperature: f64,
    /// Nucleus sampling threshold; `1.0` disables it.
    pub top_p: f64,
    pub seed: u64,
    /// Run on the CPU even when an accelerator is available.
    pub cpu: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 512,
            temperature: 0.0,
            top_p: 1.0,
            seed: 299_792_458,
            cpu: false,
        }
    }
}

impl GenerationConfig {
    pub fn temperature(&self) -> Option<f64> {
        (self.temperature > 0.0).then_some(self.temperature)
    }

    pub fn top_p(&self) -> Option<f64> {
        (self.top_p < 1.0).then_some(self.top_p)
    }
}

/// Abstraction over chat-tuned causal language models.
pub trait LanguageModel {
    /// Identifier the model was loaded from.
    fn model_id(&self) -> &str;

    /// Render a chat exchange with the model's template, priming the assistant turn.
    fn render_chat(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Tokenize rendered texts as one right-padded batch, in order.
    ///
    /// Fails for the whole batch if any item cannot be tokenized.
    fn tokenize_batch(&self, texts: &[String]) -> Result<TokenBatch>;

    /// Generate continuations for every item of `batch` in one call.
    ///
    /// Returns, per item and in batch order, the unpadded prompt tokens followed
    /// by the newly generated tokens.
    fn generate(&mut self, batch: &TokenBatch, config: &GenerationConfig) -> Result<Vec<Vec<u32>>>;

    /// Decode token sequences to text, skipping special tokens.
    fn decode_batch(&self, sequences: &[&[u32]]) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_generation_is_greedy() {
        let cfg = GenerationConfig::default();
        assert_eq!(cfg.max_new_tokens, 512);
        assert_eq!(cfg.temperature(), None);
        assert_eq!(cfg.top_p(), None);
    }

    #[test]
    fn sampling_parameters_enable_when_set() {
        let cfg = GenerationConfig {
            temperature: 0.7,
            top_p: 0.9,
            ..GenerationConfig::default()
        };
        assert_eq!(cfg.temperature(), Some(0.7));
        assert_eq!(cfg.top_p(), Some(0.9));
    }
}
