//! Shared deterministic types for review core logic.
//!
//! These types define stable contracts between pipeline stages. They should not
//! depend on external state or I/O.

use std::path::{Path, PathBuf};

/// Where a submission came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// A file named on the command line.
    File(PathBuf),
    /// The standalone stream (stdin) used when no files are given.
    Stream,
}

impl Origin {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Origin::File(path) => Some(path),
            Origin::Stream => None,
        }
    }

    /// Display name for logs and error messages.
    pub fn label(&self) -> String {
        match self {
            Origin::File(path) => path.display().to_string(),
            Origin::Stream => "<stdin>".to_string(),
        }
    }
}

/// How the raw content of a submission should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Plain program text (e.g. `.py`).
    PlainSource,
    /// Jupyter notebook (`.ipynb`); only code cells are program text.
    Notebook,
    /// Standalone stream without a filename hint.
    Stream,
}

impl SourceKind {
    /// Classify a file by its extension. Anything that is not a notebook is plain source.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("ipynb") => SourceKind::Notebook,
            _ => SourceKind::PlainSource,
        }
    }
}

/// One student submission, immutable after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    pub origin: Origin,
    pub raw_content: String,
    pub kind: SourceKind,
}

impl SourceItem {
    pub fn from_file(path: impl Into<PathBuf>, raw_content: String) -> Self {
        let path = path.into();
        let kind = SourceKind::from_path(&path);
        Self {
            origin: Origin::File(path),
            raw_content,
            kind,
        }
    }

    pub fn from_stream(raw_content: String) -> Self {
        Self {
            origin: Origin::Stream,
            raw_content,
            kind: SourceKind::Stream,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_extension() {
        assert_eq!(
            SourceKind::from_path(Path::new("lab/ex1.ipynb")),
            SourceKind::Notebook
        );
        assert_eq!(
            SourceKind::from_path(Path::new("lab/EX1.IPYNB")),
            SourceKind::Notebook
        );
        assert_eq!(
            SourceKind::from_path(Path::new("lab/ex1.py")),
            SourceKind::PlainSource
        );
        assert_eq!(
            SourceKind::from_path(Path::new("README")),
            SourceKind::PlainSource
        );
    }

    #[test]
    fn stream_has_no_path() {
        let item = SourceItem::from_stream("print(1)".to_string());
        assert_eq!(item.kind, SourceKind::Stream);
        assert!(item.origin.path().is_none());
        assert_eq!(item.origin.label(), "<stdin>");
    }
}
