//! Hugging Face model backend built on candle.
//!
//! Loads a Qwen2-family chat model by hub id (or from a local directory holding
//! the same files), formats chats with the model's own template, and generates
//! greedily or with sampling depending on [`GenerationConfig`].

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::qwen2::{Config as Qwen2Config, ModelForCausalLM};
use hf_hub::api::sync::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};
use serde::Deserialize;
use tokenizers::Tokenizer;
use tracing::{debug, info, instrument};

use crate::core::tokens::TokenBatch;
use crate::io::chat_template::{ChatTemplate, TokenizerConfig};
use crate::io::model::{ChatMessage, GenerationConfig, LanguageModel};

const SUPPORTED_ARCHITECTURES: &[&str] = &["Qwen2ForCausalLM"];

/// Where model files are read from.
enum ModelSource {
    Local(PathBuf),
    Hub(ApiRepo),
}

impl ModelSource {
    fn resolve(model_id: &str, revision: &str) -> Result<Self> {
        let local = Path::new(model_id);
        if local.is_dir() {
            return Ok(ModelSource::Local(local.to_path_buf()));
        }
        let api = Api::new().context("initialize hugging face hub client")?;
        Ok(ModelSource::Hub(api.repo(Repo::with_revision(
            model_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ))))
    }

    fn get(&self, name: &str) -> Result<PathBuf> {
        match self {
            ModelSource::Local(dir) => {
                let path = dir.join(name);
                if !path.exists() {
                    bail!("missing model file {}", path.display());
                }
                Ok(path)
            }
            ModelSource::Hub(repo) => repo.get(name).with_context(|| format!("fetch {name}")),
        }
    }

    fn get_optional(&self, name: &str) -> Option<PathBuf> {
        match self.get(name) {
            Ok(path) => Some(path),
            Err(err) => {
                debug!(file = name, err = %format!("{err:#}"), "optional model file unavailable");
                None
            }
        }
    }

    /// Safetensors weight files, following the shard index when there is one.
    fn weights(&self) -> Result<Vec<PathBuf>> {
        let Some(index_path) = self.get_optional("model.safetensors.index.json") else {
            return Ok(vec![self.get("model.safetensors")?]);
        };
        let index: SafetensorsIndex = serde_json::from_str(&read(&index_path)?)
            .with_context(|| format!("parse {}", index_path.display()))?;
        let shards: BTreeSet<String> = index.weight_map.into_values().collect();
        shards.iter().map(|shard| self.get(shard)).collect()
    }
}

#[derive(Debug, Deserialize)]
struct SafetensorsIndex {
    weight_map: HashMap<String, String>,
}

/// Fields of `config.json` checked before building the model.
#[derive(Debug, Deserialize)]
struct ModelHeader {
    #[serde(default)]
    architectures: Vec<String>,
}

impl ModelHeader {
    fn ensure_supported(&self) -> Result<()> {
        if self
            .architectures
            .iter()
            .any(|arch| SUPPORTED_ARCHITECTURES.contains(&arch.as_str()))
        {
            return Ok(());
        }
        bail!(
            "unsupported model architecture {:?} (supported: {})",
            self.architectures,
            SUPPORTED_ARCHITECTURES.join(", ")
        )
    }
}

/// The subset of `generation_config.json` used here.
#[derive(Debug, Default, Deserialize)]
struct HubGenerationConfig {
    #[serde(default)]
    eos_token_id: Option<TokenIds>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenIds {
    One(u32),
    Many(Vec<u32>),
}

impl TokenIds {
    fn into_vec(self) -> Vec<u32> {
        match self {
            TokenIds::One(id) => vec![id],
            TokenIds::Many(ids) => ids,
        }
    }
}

/// A chat model loaded into memory.
pub struct HfModel {
    model_id: String,
    tokenizer: Tokenizer,
    template: ChatTemplate,
    model: ModelForCausalLM,
    device: Device,
    eos_token_ids: Vec<u32>,
    pad_id: u32,
    context_window: usize,
}

impl HfModel {
    /// Load tokenizer, chat template, and weights for `model_id`.
    #[instrument(skip_all, fields(model = model_id, revision, cpu))]
    pub fn load(model_id: &str, revision: &str, cpu: bool) -> Result<Self> {
        let source = ModelSource::resolve(model_id, revision)?;
        info!("fetching model files");

        let tokenizer_path = source.get("tokenizer.json")?;
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|err| anyhow!("load tokenizer {}: {err}", tokenizer_path.display()))?;
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(None)
            .map_err(|err| anyhow!("disable tokenizer truncation: {err}"))?;

        let tokenizer_config = match source.get_optional("tokenizer_config.json") {
            Some(path) => TokenizerConfig::parse(&read(&path)?)
                .with_context(|| format!("parse {}", path.display()))?,
            None => TokenizerConfig::default(),
        };

        let config_path = source.get("config.json")?;
        let config_raw = read(&config_path)?;
        let header: ModelHeader = serde_json::from_str(&config_raw)
            .with_context(|| format!("parse {}", config_path.display()))?;
        header.ensure_supported()?;
        let config: Qwen2Config = serde_json::from_str(&config_raw)
            .with_context(|| format!("parse qwen2 config {}", config_path.display()))?;

        let template = tokenizer_config.chat_template()?;

        let generation_config = match source.get_optional("generation_config.json") {
            Some(path) => serde_json::from_str(&read(&path)?)
                .with_context(|| format!("parse {}", path.display()))?,
            None => HubGenerationConfig::default(),
        };
        let eos_token_ids = collect_eos_ids(
            generation_config.eos_token_id,
            tokenizer_config
                .eos_token()
                .and_then(|token| tokenizer.token_to_id(token)),
        );
        let pad_id = tokenizer_config
            .pad_token()
            .and_then(|token| tokenizer.token_to_id(token))
            .or_else(|| eos_token_ids.first().copied())
            .unwrap_or(0);

        let device = if cpu {
            Device::Cpu
        } else {
            Device::cuda_if_available(0).context("select device")?
        };
        let dtype = if device.is_cuda() {
            DType::BF16
        } else {
            DType::F32
        };
        let weights = source.weights()?;
        info!(shards = weights.len(), ?dtype, cuda = device.is_cuda(), "loading weights");
        let started = Instant::now();
        let vb = load_weights(&weights, dtype, &device)?;
        let model = ModelForCausalLM::new(&config, vb).context("build model")?;
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "model loaded");

        Ok(Self {
            model_id: model_id.to_string(),
            tokenizer,
            template,
            model,
            device,
            eos_token_ids,
            pad_id,
            context_window: config.max_position_embeddings,
        })
    }

    fn generate_one(&mut self, prompt: &[u32], config: &GenerationConfig) -> Result<Vec<u32>> {
        self.model.clear_kv_cache();
        let mut sampler = LogitsProcessor::new(config.seed, config.temperature(), config.top_p());
        let budget = config
            .max_new_tokens
            .min(self.context_window.saturating_sub(prompt.len()));

        let mut tokens = prompt.to_vec();
        for step in 0..budget {
            // The first step feeds the whole prompt; later steps reuse the KV cache.
            let context_len = if step == 0 { tokens.len() } else { 1 };
            let start = tokens.len() - context_len;
            let input = Tensor::new(&tokens[start..], &self.device)?.unsqueeze(0)?;
            let logits = self.model.forward(&input, start)?;
            let logits = logits.squeeze(0)?.squeeze(0)?.to_dtype(DType::F32)?;
            let next = sampler.sample(&logits)?;
            tokens.push(next);
            if self.eos_token_ids.contains(&next) {
                break;
            }
        }
        Ok(tokens)
    }
}

impl LanguageModel for HfModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn render_chat(&self, messages: &[ChatMessage]) -> Result<String> {
        self.template.render(messages, true)
    }

    fn tokenize_batch(&self, texts: &[String]) -> Result<TokenBatch> {
        let mut sequences = Vec::with_capacity(texts.len());
        for (index, text) in texts.iter().enumerate() {
            // Chat templates already insert the model's special tokens.
            let encoding = self
                .tokenizer
                .encode(text.as_str(), false)
                .map_err(|err| anyhow!("tokenize item {index}: {err}"))?;
            let ids = encoding.get_ids().to_vec();
            if ids.len() >= self.context_window {
                bail!(
                    "item {index} has {} tokens, which does not fit the {}-token context window",
                    ids.len(),
                    self.context_window
                );
            }
            sequences.push(ids);
        }
        Ok(TokenBatch::from_sequences(sequences, self.pad_id))
    }

    #[instrument(skip_all, fields(items = batch.len(), max_new_tokens = config.max_new_tokens))]
    fn generate(&mut self, batch: &TokenBatch, config: &GenerationConfig) -> Result<Vec<Vec<u32>>> {
        let mut outputs = Vec::with_capacity(batch.len());
        for index in 0..batch.len() {
            let prompt = batch.unpadded(index);
            let started = Instant::now();
            let output = self
                .generate_one(prompt, config)
                .with_context(|| format!("generate item {index}"))?;
            info!(
                item = index,
                prompt_tokens = prompt.len(),
                new_tokens = output.len() - prompt.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "generated feedback"
            );
            outputs.push(output);
        }
        Ok(outputs)
    }

    fn decode_batch(&self, sequences: &[&[u32]]) -> Result<Vec<String>> {
        sequences
            .iter()
            .enumerate()
            .map(|(index, ids)| {
                self.tokenizer
                    .decode(ids, true)
                    .map_err(|err| anyhow!("decode item {index}: {err}"))
            })
            .collect()
    }
}

/// Load every safetensors shard into one var builder.
fn load_weights(files: &[PathBuf], dtype: DType, device: &Device) -> Result<VarBuilder<'static>> {
    let mut tensors = HashMap::new();
    for file in files {
        let shard = candle_core::safetensors::load(file, device)
            .with_context(|| format!("load weights {}", file.display()))?;
        tensors.extend(shard);
    }
    debug!(tensors = tensors.len(), "weights loaded");
    Ok(VarBuilder::from_tensors(tensors, dtype, device))
}

fn collect_eos_ids(configured: Option<TokenIds>, from_tokenizer: Option<u32>) -> Vec<u32> {
    let mut ids = configured.map(TokenIds::into_vec).unwrap_or_default();
    if let Some(id) = from_tokenizer {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eos_ids_merge_config_and_tokenizer() {
        let configured: HubGenerationConfig =
            serde_json::from_str(r#"{"eos_token_id": [151643, 151645]}"#).expect("parse");
        assert_eq!(
            collect_eos_ids(configured.eos_token_id, Some(151645)),
            vec![151643, 151645]
        );

        let single: HubGenerationConfig =
            serde_json::from_str(r#"{"eos_token_id": 2, "max_new_tokens": 64}"#).expect("parse");
        assert_eq!(collect_eos_ids(single.eos_token_id, Some(7)), vec![2, 7]);
        assert_eq!(collect_eos_ids(None, None), Vec::<u32>::new());
    }

    #[test]
    fn only_qwen2_architectures_are_accepted() {
        let qwen: ModelHeader =
            serde_json::from_str(r#"{"architectures": ["Qwen2ForCausalLM"]}"#).expect("parse");
        assert!(qwen.ensure_supported().is_ok());

        let llama: ModelHeader =
            serde_json::from_str(r#"{"architectures": ["LlamaForCausalLM"]}"#).expect("parse");
        let err = llama.ensure_supported().unwrap_err();
        assert!(err.to_string().contains("LlamaForCausalLM"));
    }

    #[test]
    fn local_directory_reports_missing_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let model_dir = temp.path().to_str().expect("utf8 path");
        let source = ModelSource::resolve(model_dir, "main").expect("resolve");
        fs::write(temp.path().join("config.json"), "{}").expect("write");

        assert_eq!(
            source.get("config.json").expect("config"),
            temp.path().join("config.json")
        );
        let err = source.get("tokenizer.json").unwrap_err();
        assert!(err.to_string().contains("missing model file"));
        assert!(source.get_optional("generation_config.json").is_none());
    }

    #[test]
    fn local_weights_follow_shard_index() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path();
        fs::write(
            dir.join("model.safetensors.index.json"),
            r#"{"metadata": {}, "weight_map": {
                "a.weight": "model-00002-of-00002.safetensors",
                "b.weight": "model-00001-of-00002.safetensors",
                "c.weight": "model-00001-of-00002.safetensors"
            }}"#,
        )
        .expect("write index");
        fs::write(dir.join("model-00001-of-00002.safetensors"), "").expect("shard 1");
        fs::write(dir.join("model-00002-of-00002.safetensors"), "").expect("shard 2");

        let source = ModelSource::resolve(dir.to_str().expect("utf8"), "main").expect("resolve");
        let weights = source.weights().expect("weights");
        assert_eq!(
            weights,
            vec![
                dir.join("model-00001-of-00002.safetensors"),
                dir.join("model-00002-of-00002.safetensors"),
            ]
        );
    }

    #[test]
    fn weights_from_every_shard_are_merged() {
        let temp = tempfile::tempdir().expect("tempdir");
        let device = Device::Cpu;
        let first = temp.path().join("model-00001-of-00002.safetensors");
        let second = temp.path().join("model-00002-of-00002.safetensors");
        let a = Tensor::new(&[1f32, 2.0], &device).expect("tensor a");
        let b = Tensor::new(&[3f32, 4.0, 5.0], &device).expect("tensor b");
        candle_core::safetensors::save(&HashMap::from([("a.weight", a)]), &first).expect("save 1");
        candle_core::safetensors::save(&HashMap::from([("b.weight", b)]), &second).expect("save 2");

        let vb = load_weights(&[first, second], DType::F32, &device).expect("load");

        let a = vb.get(2, "a.weight").expect("a.weight");
        let b = vb.get(3, "b.weight").expect("b.weight");
        assert_eq!(a.to_vec1::<f32>().expect("a values"), vec![1.0, 2.0]);
        assert_eq!(b.to_vec1::<f32>().expect("b values"), vec![3.0, 4.0, 5.0]);
    }
}
