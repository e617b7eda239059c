//! Test-only helpers: a scripted language model and input fixtures.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use serde_json::json;

use crate::core::tokens::TokenBatch;
use crate::io::chat_template::ChatTemplate;
use crate::io::model::{ChatMessage, GenerationConfig, LanguageModel};

/// End-of-sequence id; outside the `char` range so decoding skips it.
pub const SCRIPTED_EOS: u32 = 0x11_0000;
/// Padding id; outside the `char` range so decoding skips it.
pub const SCRIPTED_PAD: u32 = 0x11_0001;

type Responder = Box<dyn Fn(&str) -> String>;

/// In-memory model with one token per `char` and ChatML formatting.
///
/// Generation echoes each prompt and appends whatever the responder returns
/// for that prompt's text, followed by [`SCRIPTED_EOS`].
pub struct ScriptedModel {
    template: ChatTemplate,
    responder: Responder,
    context_window: Option<usize>,
    fail_generation: bool,
    generate_calls: usize,
}

impl ScriptedModel {
    /// Respond to every prompt with `responder(rendered_prompt)`.
    pub fn new(responder: impl Fn(&str) -> String + 'static) -> Self {
        Self {
            template: ChatTemplate::chatml(),
            responder: Box::new(responder),
            context_window: None,
            fail_generation: false,
            generate_calls: 0,
        }
    }

    /// Respond to every prompt with the same text.
    pub fn fixed(response: &str) -> Self {
        let response = response.to_string();
        Self::new(move |_| response.clone())
    }

    /// Reject prompts longer than `tokens` during tokenization.
    pub fn with_context_window(mut self, tokens: usize) -> Self {
        self.context_window = Some(tokens);
        self
    }

    /// Fail every generation call.
    pub fn failing(mut self) -> Self {
        self.fail_generation = true;
        self
    }

    /// Number of times `generate` has been called.
    pub fn generate_calls(&self) -> usize {
        self.generate_calls
    }
}

impl LanguageModel for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted-model"
    }

    fn render_chat(&self, messages: &[ChatMessage]) -> Result<String> {
        self.template.render(messages, true)
    }

    fn tokenize_batch(&self, texts: &[String]) -> Result<TokenBatch> {
        let mut sequences = Vec::with_capacity(texts.len());
        for (index, text) in texts.iter().enumerate() {
            let ids: Vec<u32> = text.chars().map(u32::from).collect();
            if let Some(window) = self.context_window {
                if ids.len() > window {
                    bail!(
                        "item {index} has {} tokens, over the {window}-token context window",
                        ids.len()
                    );
                }
            }
            sequences.push(ids);
        }
        Ok(TokenBatch::from_sequences(sequences, SCRIPTED_PAD))
    }

    fn generate(&mut self, batch: &TokenBatch, config: &GenerationConfig) -> Result<Vec<Vec<u32>>> {
        self.generate_calls += 1;
        if self.fail_generation {
            bail!("scripted generation failure");
        }
        let mut outputs = Vec::with_capacity(batch.len());
        for index in 0..batch.len() {
            let prompt = batch.unpadded(index);
            let text = decode(prompt);
            let mut output = prompt.to_vec();
            output.extend(
                (self.responder)(&text)
                    .chars()
                    .map(u32::from)
                    .take(config.max_new_tokens),
            );
            output.push(SCRIPTED_EOS);
            outputs.push(output);
        }
        Ok(outputs)
    }

    fn decode_batch(&self, sequences: &[&[u32]]) -> Result<Vec<String>> {
        Ok(sequences.iter().map(|ids| decode(ids)).collect())
    }
}

fn decode(ids: &[u32]) -> String {
    ids.iter().filter_map(|&id| char::from_u32(id)).collect()
}

/// Write a source file under `dir` and return its path.
pub fn write_source(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write source fixture");
    path
}

/// Build nbformat 4 JSON from `(cell_type, source)` pairs.
pub fn notebook_json(cells: &[(&str, &str)]) -> String {
    let cells: Vec<_> = cells
        .iter()
        .map(|(cell_type, source)| {
            json!({
                "cell_type": cell_type,
                "metadata": {},
                "source": source,
            })
        })
        .collect();
    json!({
        "nbformat": 4,
        "nbformat_minor": 5,
        "metadata": {},
        "cells": cells,
    })
    .to_string()
}
