//! Orchestration for one `pyreview` invocation.

use std::io::Write;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument};

use crate::core::artifact::render_prefix;
use crate::core::batch::ReviewBatch;
use crate::core::types::SourceItem;
use crate::io::batch::{assemble_batch, disaggregate};
use crate::io::config::ReviewConfig;
use crate::io::model::{GenerationConfig, LanguageModel};
use crate::io::prompt::PromptBuilder;
use crate::io::writer::{Destination, FeedbackWriter, WriterSettings};

/// Settings shared by every item of a run. Built once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewSettings {
    /// Extra reviewer instructions inserted into every prompt.
    pub nudges: Vec<String>,
    pub system_prompt: String,
    pub generation: GenerationConfig,
    pub writer: WriterSettings,
}

impl ReviewSettings {
    /// Derive run settings from config and the per-invocation flags.
    ///
    /// The prefix is rendered against `config.model` here, so every artifact
    /// carries the same text.
    pub fn from_config(config: &ReviewConfig, nudges: Vec<String>, with_code: bool, force: bool) -> Self {
        Self {
            nudges,
            system_prompt: config.system_prompt.clone(),
            generation: config.generation.clone(),
            writer: WriterSettings {
                prefix: render_prefix(&config.prefix, &config.model),
                with_code,
                force,
                extension: config.feedback_extension.clone(),
            },
        }
    }

    pub fn feedback_writer(&self) -> FeedbackWriter<'_> {
        FeedbackWriter::new(&self.writer)
    }
}

/// Result of a completed review run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOutcome {
    /// Where each item's feedback went, in input order.
    pub destinations: Vec<Destination>,
}

/// Review every source with a single batched generation call.
///
/// Destinations are checked before the model is touched, so an existing
/// feedback file (without `force`) fails the run with nothing generated and
/// nothing written. Feedback for the stream goes to `console`.
#[instrument(skip_all, fields(items = sources.len(), model = model.model_id()))]
pub fn run_review<M: LanguageModel + ?Sized, W: Write>(
    model: &mut M,
    sources: Vec<SourceItem>,
    settings: &ReviewSettings,
    console: &mut W,
) -> Result<ReviewOutcome> {
    if sources.is_empty() {
        bail!("nothing to review");
    }
    let writer = settings.feedback_writer();
    writer.preflight(&sources)?;

    let prompts = PromptBuilder::new(&settings.nudges);
    let mut batch = ReviewBatch::prepare(sources, |code| prompts.build(code))?;
    debug!(stream = batch.is_single_stream(), "prepared prompts");

    let tokens = assemble_batch(&*model, &settings.system_prompt, &batch.prompts())?;
    let started = Instant::now();
    let outputs = model
        .generate(&tokens, &settings.generation)
        .context("generate feedback")?;
    info!(
        items = batch.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "batch generated"
    );
    let responses = disaggregate(&*model, &tokens, &outputs)?;
    batch.attach_responses(responses)?;

    let destinations = writer.deliver(&batch, console)?;
    Ok(ReviewOutcome { destinations })
}
