//! Reading submissions from files or the standalone stream.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::core::types::SourceItem;

const STDIN_MARKER: &str = "-";

/// True when the inputs name the standalone stream: no files, or just `-`.
pub fn is_stream_request(files: &[PathBuf]) -> bool {
    match files {
        [] => true,
        [only] => only.as_path() == Path::new(STDIN_MARKER),
        _ => false,
    }
}

/// Load every input in order, reading stdin when no files are given.
pub fn load_sources(files: &[PathBuf]) -> Result<Vec<SourceItem>> {
    if is_stream_request(files) {
        let item = read_stream(std::io::stdin().lock())?;
        return Ok(vec![item]);
    }
    read_files(files)
}

/// Read each file as one submission, preserving argument order.
pub fn read_files(files: &[PathBuf]) -> Result<Vec<SourceItem>> {
    if files.iter().any(|path| path.as_path() == Path::new(STDIN_MARKER)) {
        bail!("`-` (stdin) cannot be combined with file inputs");
    }
    files
        .iter()
        .map(|path| {
            let contents =
                fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
            let item = SourceItem::from_file(path, contents);
            debug!(path = %path.display(), kind = ?item.kind, bytes = item.raw_content.len(), "loaded source");
            Ok(item)
        })
        .collect()
}

/// Read the whole standalone stream as one submission.
pub fn read_stream<R: Read>(mut reader: R) -> Result<SourceItem> {
    let mut contents = String::new();
    reader
        .read_to_string(&mut contents)
        .context("read standard input")?;
    debug!(bytes = contents.len(), "loaded source from stdin");
    Ok(SourceItem::from_stream(contents))
}
