//! Chat templates in the Hugging Face `tokenizer_config.json` format.
//!
//! Models ship their chat format as a Jinja template; it is rendered with
//! minijinja. Models without one fall back to ChatML.

use anyhow::{Context, Result};
use minijinja::{Environment, Error, ErrorKind, context};
use serde::Deserialize;

use crate::io::model::ChatMessage;

/// ChatML, used by Qwen models and as the fallback format.
pub const CHATML_TEMPLATE: &str = "{%- for message in messages %}<|im_start|>{{ message.role }}\n{{ message.content }}<|im_end|>\n{% endfor %}{%- if add_generation_prompt %}<|im_start|>assistant\n{% endif %}";

/// A compiled chat template plus the special tokens it may reference.
#[derive(Debug, Clone)]
pub struct ChatTemplate {
    env: Environment<'static>,
    source: String,
    bos_token: String,
    eos_token: String,
}

impl ChatTemplate {
    /// Compile `source`; a template that does not parse is rejected here.
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let mut env = Environment::new();
        env.add_function("raise_exception", raise_exception);
        env.add_template_owned("chat", source.clone())
            .context("parse chat template")?;
        Ok(Self {
            env,
            source,
            bos_token: String::new(),
            eos_token: String::new(),
        })
    }

    pub fn chatml() -> Self {
        Self::new(CHATML_TEMPLATE).expect("ChatML template should be valid")
    }

    pub fn with_special_tokens(mut self, bos_token: Option<&str>, eos_token: Option<&str>) -> Self {
        self.bos_token = bos_token.unwrap_or_default().to_string();
        self.eos_token = eos_token.unwrap_or_default().to_string();
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render `messages` into one linear string.
    ///
    /// With `add_generation_prompt`, the template appends the opening of the
    /// assistant turn so generation continues as the assistant.
    pub fn render(&self, messages: &[ChatMessage], add_generation_prompt: bool) -> Result<String> {
        let template = self.env.get_template("chat")?;
        let rendered = template
            .render(context! {
                messages => messages,
                add_generation_prompt => add_generation_prompt,
                bos_token => &self.bos_token,
                eos_token => &self.eos_token,
            })
            .context("render chat template")?;
        Ok(rendered)
    }
}

/// Templates call `raise_exception` to reject unsupported conversations.
fn raise_exception(message: String) -> Result<String, Error> {
    Err(Error::new(ErrorKind::InvalidOperation, message))
}

/// The subset of `tokenizer_config.json` needed for chat formatting.
#[derive(Debug, Default, Deserialize)]
pub struct TokenizerConfig {
    #[serde(default)]
    chat_template: Option<TemplateSource>,
    #[serde(default)]
    bos_token: Option<SpecialToken>,
    #[serde(default)]
    eos_token: Option<SpecialToken>,
    #[serde(default)]
    pad_token: Option<SpecialToken>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TemplateSource {
    Single(String),
    Named(Vec<NamedTemplate>),
}

#[derive(Debug, Deserialize)]
struct NamedTemplate {
    name: String,
    template: String,
}

/// Special tokens appear either as plain strings or as added-token objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SpecialToken {
    Text(String),
    Added { content: String },
}

impl SpecialToken {
    fn as_str(&self) -> &str {
        match self {
            SpecialToken::Text(text) => text,
            SpecialToken::Added { content } => content,
        }
    }
}

impl TokenizerConfig {
    pub fn parse(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("parse tokenizer config")
    }

    pub fn eos_token(&self) -> Option<&str> {
        self.eos_token.as_ref().map(SpecialToken::as_str)
    }

    pub fn pad_token(&self) -> Option<&str> {
        self.pad_token.as_ref().map(SpecialToken::as_str)
    }

    /// The model's default chat template, or ChatML when none is shipped.
    pub fn chat_template(&self) -> Result<ChatTemplate> {
        let source = match &self.chat_template {
            Some(TemplateSource::Single(source)) => Some(source.as_str()),
            Some(TemplateSource::Named(templates)) => templates
                .iter()
                .find(|t| t.name == "default")
                .or_else(|| templates.first())
                .map(|t| t.template.as_str()),
            None => None,
        };
        Ok(ChatTemplate::new(source.unwrap_or(CHATML_TEMPLATE))?.with_special_tokens(
            self.bos_token.as_ref().map(SpecialToken::as_str),
            self.eos_token(),
        ))
    }
}
