//! Prompt builder for review instructions.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::artifact::code_fence;
use crate::core::nudges::render_nudge_block;

const REVIEW_TEMPLATE: &str = include_str!("prompts/review.md");

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("review", REVIEW_TEMPLATE)
            .expect("review template should be valid");
        Self { env }
    }

    fn render_review(&self, code: &str, nudges: &str) -> Result<String> {
        let template = self.env.get_template("review")?;
        let rendered = template.render(context! {
            code => code.trim_end_matches(['\r', '\n']),
            fence => code_fence(code),
            nudges => nudges,
        })?;
        Ok(rendered)
    }
}

/// Renders one review instruction per code submission.
///
/// The nudge block is rendered once at construction and reused for every item.
pub struct PromptBuilder {
    engine: PromptEngine,
    nudge_block: String,
}

impl PromptBuilder {
    pub fn new(nudges: &[String]) -> Self {
        Self {
            engine: PromptEngine::new(),
            nudge_block: render_nudge_block(nudges),
        }
    }

    /// Render the instruction for `code`, trimmed of surrounding whitespace.
    pub fn build(&self, code: &str) -> Result<String> {
        let rendered = self
            .engine
            .render_review(code, &self.nudge_block)
            .context("render review prompt")?;
        let prompt = rendered.trim().to_string();
        debug!(code_bytes = code.len(), prompt_bytes = prompt.len(), "built review prompt");
        Ok(prompt)
    }
}
