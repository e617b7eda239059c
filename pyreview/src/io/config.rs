//! Review configuration stored in `pyreview.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::io::model::GenerationConfig;

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "pyreview.toml";

pub const DEFAULT_MODEL: &str = "Qwen/CodeQwen1.5-7B-Chat";

pub const DEFAULT_PREFIX: &str = "> **Note:** this feedback was generated automatically by the language model `{model}`. \
It can be wrong or incomplete, so ask your teacher if anything is unclear.";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, exciting assistant who really likes to review beginner Python code, \
and to encourage students to learn and improve!";

/// Review configuration (TOML).
///
/// Missing fields default to the values used by the CLI out of the box.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReviewConfig {
    /// Hugging Face model id or a local model directory.
    pub model: String,

    /// Hub revision (branch, tag, or commit) to load the model from.
    pub revision: String,

    /// Template prepended to every feedback document. `{model}` is replaced by
    /// the model id; an empty string disables the prefix.
    pub prefix: String,

    /// Extension of feedback documents written next to each input.
    pub feedback_extension: String,

    /// Persona sent as the system turn of every exchange.
    pub system_prompt: String,

    pub generation: GenerationConfig,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            revision: "main".to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
            feedback_extension: "md".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            generation: GenerationConfig::default(),
        }
    }
}

impl ReviewConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must be non-empty"));
        }
        if self.revision.trim().is_empty() {
            return Err(anyhow!("revision must be non-empty"));
        }
        let ext = &self.feedback_extension;
        if ext.is_empty() || ext.contains(['.', '/', '\\']) {
            return Err(anyhow!(
                "feedback_extension must be a bare extension like \"md\" (got {ext:?})"
            ));
        }
        if self.generation.max_new_tokens == 0 {
            return Err(anyhow!("generation.max_new_tokens must be > 0"));
        }
        let temperature = self.generation.temperature;
        if temperature.is_nan() || temperature < 0.0 {
            return Err(anyhow!("generation.temperature must be >= 0"));
        }
        let top_p = self.generation.top_p;
        if top_p.is_nan() || top_p <= 0.0 || top_p > 1.0 {
            return Err(anyhow!("generation.top_p must be in (0, 1]"));
        }
        Ok(())
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub model: Option<String>,
    pub prefix: Option<String>,
    pub cpu: bool,
}

/// Apply command-line overrides to a loaded config.
pub fn apply_overrides(mut base: ReviewConfig, overrides: &ConfigOverrides) -> Result<ReviewConfig> {
    if let Some(model) = &overrides.model {
        base.model = model.clone();
    }
    if let Some(prefix) = &overrides.prefix {
        base.prefix = prefix.clone();
    }
    if overrides.cpu {
        base.generation.cpu = true;
    }
    base.validate()?;
    Ok(base)
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ReviewConfig::default()`.
pub fn load_config(path: &Path) -> Result<ReviewConfig> {
    if !path.exists() {
        let cfg = ReviewConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ReviewConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Load a config file the operator named explicitly; it must exist.
pub fn load_explicit_config(path: &Path) -> Result<ReviewConfig> {
    if !path.exists() {
        bail!("config file {} not found", path.display());
    }
    load_config(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ReviewConfig::default());
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_explicit_config(&temp.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("pyreview.toml");
        fs::write(
            &path,
            "model = \"Qwen/Qwen2.5-Coder-1.5B-Instruct\"\n\n[generation]\nmax_new_tokens = 256\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.model, "Qwen/Qwen2.5-Coder-1.5B-Instruct");
        assert_eq!(cfg.generation.max_new_tokens, 256);
        assert_eq!(cfg.generation.top_p, 1.0);
        assert_eq!(cfg.feedback_extension, "md");
        assert_eq!(cfg.prefix, DEFAULT_PREFIX);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("pyreview.toml");
        fs::write(&path, "feedback_extension = \".md\"\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("feedback_extension"));

        fs::write(&path, "[generation]\ntop_p = 0.0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("top_p"));
    }

    #[test]
    fn overrides_take_precedence() {
        let overrides = ConfigOverrides {
            model: Some("demo-model".to_string()),
            prefix: Some(String::new()),
            cpu: true,
        };
        let cfg = apply_overrides(ReviewConfig::default(), &overrides).expect("merge");
        assert_eq!(cfg.model, "demo-model");
        assert_eq!(cfg.prefix, "");
        assert!(cfg.generation.cpu);
    }

    #[test]
    fn overrides_are_validated() {
        let overrides = ConfigOverrides {
            model: Some("  ".to_string()),
            ..ConfigOverrides::default()
        };
        assert!(apply_overrides(ReviewConfig::default(), &overrides).is_err());
    }

    #[test]
    fn default_prefix_names_the_model() {
        assert!(DEFAULT_PREFIX.contains(crate::core::artifact::MODEL_PLACEHOLDER));
    }
}
