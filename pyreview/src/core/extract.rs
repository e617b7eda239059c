//! Normalize a submission into plain program text.
//!
//! Notebooks are validated against an embedded nbformat 4 schema before their
//! code cells are read. Anything that fails validation is passed through as raw
//! text so a malformed document never aborts a run.

use std::sync::LazyLock;

use jsonschema::{Draft, Validator};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::core::types::{SourceItem, SourceKind};

const NOTEBOOK_SCHEMA: &str = include_str!("../../schemas/notebook_v4.schema.json");
const CELL_SEPARATOR: &str = "\n\n";

static NOTEBOOK_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(NOTEBOOK_SCHEMA).expect("embedded notebook schema should be json");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("embedded notebook schema should compile")
});

/// Outcome of normalizing one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Code cells pulled out of a structured notebook.
    Extracted(String),
    /// Content used as-is (plain source, stream, or a notebook that failed validation).
    Raw(String),
}

#[derive(Debug, Deserialize)]
struct Notebook {
    cells: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    cell_type: String,
    source: CellSource,
}

/// nbformat stores cell source either as one string or as a list of lines.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CellSource {
    Text(String),
    Lines(Vec<String>),
}

impl CellSource {
    fn into_text(self) -> String {
        match self {
            CellSource::Text(text) => text,
            CellSource::Lines(lines) => lines.concat(),
        }
    }
}

/// Extract the program text for a submission.
pub fn extract(item: &SourceItem) -> Extraction {
    match item.kind {
        SourceKind::Notebook => extract_notebook(&item.raw_content),
        SourceKind::PlainSource | SourceKind::Stream => Extraction::Raw(item.raw_content.clone()),
    }
}

/// Join the code cells of a notebook with a blank line, in document order.
///
/// Falls back to [`Extraction::Raw`] when the document is not a valid notebook.
pub fn extract_notebook(raw: &str) -> Extraction {
    let Some(notebook) = parse_notebook(raw) else {
        return Extraction::Raw(raw.to_string());
    };
    let code = notebook
        .cells
        .into_iter()
        .filter(|cell| cell.cell_type == "code")
        .map(|cell| cell.source.into_text())
        .collect::<Vec<_>>()
        .join(CELL_SEPARATOR);
    Extraction::Extracted(code)
}

fn parse_notebook(raw: &str) -> Option<Notebook> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            debug!(%err, "notebook is not json; using raw text");
            return None;
        }
    };
    let errors: Vec<String> = NOTEBOOK_VALIDATOR
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !errors.is_empty() {
        debug!(errors = errors.len(), first = %errors[0], "notebook failed validation; using raw text");
        return None;
    }
    match serde_json::from_value(value) {
        Ok(notebook) => Some(notebook),
        Err(err) => {
            debug!(%err, "notebook cells unreadable; using raw text");
            None
        }
    }
}
