//! Batch request assembly and response disaggregation around a [`LanguageModel`].

use anyhow::{Context, Result, ensure};
use tracing::{debug, instrument};

use crate::core::tokens::{TokenBatch, strip_echo};
use crate::io::model::{ChatMessage, LanguageModel};

/// Wrap each prompt in a system + user exchange, render it with the model's
/// chat template, and tokenize everything as one batch.
///
/// Item `i` of the returned batch belongs to `prompts[i]`.
#[instrument(skip_all, fields(items = prompts.len()))]
pub fn assemble_batch<M: LanguageModel + ?Sized>(
    model: &M,
    system_prompt: &str,
    prompts: &[&str],
) -> Result<TokenBatch> {
    let rendered = prompts
        .iter()
        .enumerate()
        .map(|(index, prompt)| {
            let messages = [ChatMessage::system(system_prompt), ChatMessage::user(*prompt)];
            model
                .render_chat(&messages)
                .with_context(|| format!("render chat for item {index}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let batch = model.tokenize_batch(&rendered).context("tokenize batch")?;
    ensure!(
        batch.len() == prompts.len(),
        "tokenizer returned {} rows for {} prompts",
        batch.len(),
        prompts.len()
    );
    debug!(
        width = batch.width(),
        pad_id = batch.pad_id(),
        lengths = ?batch.lengths(),
        "assembled batch"
    );
    Ok(batch)
}

/// Strip each item's echoed prompt from `outputs` and decode the remainder.
///
/// Response `i` belongs to batch item `i`.
#[instrument(skip_all, fields(items = batch.len()))]
pub fn disaggregate<M: LanguageModel + ?Sized>(
    model: &M,
    batch: &TokenBatch,
    outputs: &[Vec<u32>],
) -> Result<Vec<String>> {
    let continuations = strip_echo(batch, outputs)?;
    debug!(
        generated = ?continuations.iter().map(|ids| ids.len()).collect::<Vec<_>>(),
        "stripped prompt echo"
    );
    let responses = model
        .decode_batch(&continuations)
        .context("decode responses")?;
    ensure!(
        responses.len() == batch.len(),
        "decoder returned {} texts for {} items",
        responses.len(),
        batch.len()
    );
    Ok(responses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::model::GenerationConfig;
    use crate::test_support::{SCRIPTED_PAD, ScriptedModel};

    #[test]
    fn assemble_wraps_prompts_in_chat_exchange() {
        let model = ScriptedModel::fixed("ok");
        let batch = assemble_batch(&model, "You review code.", &["short", "a longer prompt"])
            .expect("assemble");

        assert_eq!(batch.len(), 2);
        let first: String = batch
            .unpadded(0)
            .iter()
            .filter_map(|&id| char::from_u32(id))
            .collect();
        assert_eq!(
            first,
            "<|im_start|>system\nYou review code.<|im_end|>\n<|im_start|>user\nshort<|im_end|>\n<|im_start|>assistant\n"
        );
        assert!(batch.lengths()[0] < batch.lengths()[1]);
        assert_eq!(batch.row(0).last(), Some(&SCRIPTED_PAD));
    }

    #[test]
    fn assemble_fails_whole_batch_when_item_exceeds_context() {
        let model = ScriptedModel::fixed("ok").with_context_window(90);
        let long = "x".repeat(200);
        let err = assemble_batch(&model, "sys", &["tiny", long.as_str()]).unwrap_err();
        assert!(format!("{err:#}").contains("item 1"));
    }

    #[test]
    fn disaggregate_returns_only_new_text_per_item() {
        let mut model = ScriptedModel::new(|prompt| {
            if prompt.contains("first") {
                "feedback one".to_string()
            } else {
                "feedback two".to_string()
            }
        });
        let batch = assemble_batch(&model, "sys", &["first", "second prompt, much longer"])
            .expect("assemble");
        let outputs = model
            .generate(&batch, &GenerationConfig::default())
            .expect("generate");

        let responses = disaggregate(&model, &batch, &outputs).expect("disaggregate");
        assert_eq!(responses, vec!["feedback one", "feedback two"]);
        assert!(responses.iter().all(|r| !r.contains("<|im_start|>")));
    }

    #[test]
    fn disaggregate_rejects_missing_items() {
        let model = ScriptedModel::fixed("ok");
        let batch = assemble_batch(&model, "sys", &["a", "b"]).expect("assemble");
        let err = disaggregate(&model, &batch, &[batch.unpadded(0).to_vec()]).unwrap_err();
        assert!(err.to_string().contains("1 sequences for a batch of 2"));
    }
}
