//! Feedback delivery: one document per input file, or stdout for the stream.
//!
//! Destinations are checked for every item before anything is written. Without
//! `force`, files are opened with `create_new`, so an existing document is never
//! replaced even if it appears after the check. If delivery fails part-way,
//! documents created earlier in the same run are removed again.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::artifact::{FeedbackArtifact, feedback_path};
use crate::core::batch::{ReviewBatch, ReviewItem};
use crate::core::types::{Origin, SourceItem};

/// A feedback document already exists and overwriting was not allowed.
#[derive(Debug, thiserror::Error)]
#[error("feedback file {} already exists (use --force to overwrite)", .path.display())]
pub struct FeedbackExists {
    pub path: PathBuf,
}

/// How artifacts are composed and where they may be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterSettings {
    /// Prefix already rendered with the model id; reused for every item.
    pub prefix: Option<String>,
    /// Echo the submitted code below the feedback.
    pub with_code: bool,
    /// Allow replacing existing feedback documents.
    pub force: bool,
    /// Extension given to feedback documents.
    pub extension: String,
}

/// Where one artifact goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Console,
    File(PathBuf),
}

pub struct FeedbackWriter<'a> {
    settings: &'a WriterSettings,
}

impl<'a> FeedbackWriter<'a> {
    pub fn new(settings: &'a WriterSettings) -> Self {
        Self { settings }
    }

    /// Destination of each source, in order.
    ///
    /// A lone stream goes to the console. Files map to `<stem>.<extension>`;
    /// collisions between inputs, or with an input itself, are rejected.
    pub fn destinations<'s, I>(&self, sources: I) -> Result<Vec<Destination>>
    where
        I: IntoIterator<Item = &'s SourceItem>,
    {
        let sources: Vec<&SourceItem> = sources.into_iter().collect();
        if let [only] = sources.as_slice() {
            if only.origin == Origin::Stream {
                return Ok(vec![Destination::Console]);
            }
        }

        let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
        let mut destinations = Vec::with_capacity(sources.len());
        for source in sources {
            let Some(path) = source.origin.path() else {
                bail!("standard input can only be reviewed on its own");
            };
            let dest = feedback_path(path, &self.settings.extension);
            if dest == path {
                bail!(
                    "feedback for {} would overwrite the input itself",
                    path.display()
                );
            }
            if let Some(other) = claimed.insert(dest.clone(), path) {
                bail!(
                    "{} and {} would both write feedback to {}",
                    other.display(),
                    path.display(),
                    dest.display()
                );
            }
            destinations.push(Destination::File(dest));
        }
        Ok(destinations)
    }

    /// Resolve destinations and, unless `force` is set, fail on the first one
    /// that already exists.
    pub fn preflight<'s, I>(&self, sources: I) -> Result<Vec<Destination>>
    where
        I: IntoIterator<Item = &'s SourceItem>,
    {
        let destinations = self.destinations(sources)?;
        if !self.settings.force {
            for dest in &destinations {
                if let Destination::File(path) = dest {
                    if path.exists() {
                        return Err(FeedbackExists { path: path.clone() }.into());
                    }
                }
            }
        }
        Ok(destinations)
    }

    /// Compose the artifact for one item.
    pub fn compose(&self, item: &ReviewItem) -> Result<FeedbackArtifact> {
        let response = item
            .response()
            .ok_or_else(|| anyhow!("no response for {}", item.source.origin.label()))?;
        Ok(FeedbackArtifact {
            prefix: self.settings.prefix.clone(),
            response: response.to_string(),
            code: self.settings.with_code.then(|| item.code.clone()),
        })
    }

    /// Write every artifact of `batch` to its destination.
    #[instrument(skip_all, fields(items = batch.len(), force = self.settings.force))]
    pub fn deliver<W: Write>(&self, batch: &ReviewBatch, console: &mut W) -> Result<Vec<Destination>> {
        let destinations = self.preflight(batch.items().iter().map(|item| &item.source))?;
        let bodies = batch
            .items()
            .iter()
            .map(|item| self.compose(item).map(|artifact| artifact.render()))
            .collect::<Result<Vec<_>>>()?;

        let mut created: Vec<&Path> = Vec::new();
        for (dest, body) in destinations.iter().zip(&bodies) {
            let result = match dest {
                Destination::Console => write_console(console, body),
                Destination::File(path) => {
                    let existed = path.exists();
                    write_feedback_file(path, body, self.settings.force).inspect(|_| {
                        if !existed {
                            created.push(path);
                        }
                    })
                }
            };
            if let Err(err) = result {
                remove_created(&created);
                return Err(err);
            }
        }
        info!(written = destinations.len(), "delivered feedback");
        Ok(destinations)
    }
}

fn write_console<W: Write>(console: &mut W, body: &str) -> Result<()> {
    console
        .write_all(body.as_bytes())
        .and_then(|()| console.flush())
        .context("write feedback to stdout")
}

fn write_feedback_file(path: &Path, contents: &str, force: bool) -> Result<()> {
    if force {
        return write_atomic(path, contents);
    }
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            return Err(FeedbackExists {
                path: path.to_path_buf(),
            }
            .into());
        }
        Err(err) => return Err(err).with_context(|| format!("create {}", path.display())),
    };
    if let Err(err) = file.write_all(contents.as_bytes()) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(err).with_context(|| format!("write {}", path.display()));
    }
    debug!(path = %path.display(), bytes = contents.len(), "wrote feedback");
    Ok(())
}

/// Replace `path` atomically (temp file + rename).
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp feedback {}", tmp_path.display()))?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err).with_context(|| format!("replace {}", path.display()));
    }
    debug!(path = %path.display(), bytes = contents.len(), "wrote feedback");
    Ok(())
}

fn remove_created(paths: &[&Path]) {
    for path in paths {
        if let Err(err) = fs::remove_file(path) {
            warn!(path = %path.display(), %err, "could not remove feedback after failed run");
        }
    }
}
