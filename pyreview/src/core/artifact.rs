//! Feedback document composition.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

/// Placeholder in prefix templates replaced by the active model identifier.
pub const MODEL_PLACEHOLDER: &str = "{model}";

static BACKTICK_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`{3,}").expect("backtick regex should be valid"));

/// Render the prefix template once for a run, keeping it verbatim apart from
/// the model substitution. An empty or all-whitespace template disables the prefix.
pub fn render_prefix(template: &str, model_id: &str) -> Option<String> {
    if template.trim().is_empty() {
        return None;
    }
    Some(template.replace(MODEL_PLACEHOLDER, model_id))
}

/// Backtick fence long enough that nothing inside `code` can close it.
pub fn code_fence(code: &str) -> String {
    let longest = BACKTICK_RUN_RE
        .find_iter(code)
        .map(|run| run.as_str().len())
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

/// Wrap `code` in a fenced Python block.
pub fn fenced_code(code: &str) -> String {
    let fence = code_fence(code);
    format!("{fence}python\n{}\n{fence}", code.trim_end_matches(['\r', '\n']))
}

/// Feedback file next to `source`, with its extension replaced.
pub fn feedback_path(source: &Path, extension: &str) -> PathBuf {
    source.with_extension(extension)
}

/// Final unit delivered for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackArtifact {
    pub prefix: Option<String>,
    pub response: String,
    /// Original code to echo below the feedback, if enabled.
    pub code: Option<String>,
}

impl FeedbackArtifact {
    /// Prefix, response, then fenced code, separated by single blank lines.
    pub fn render(&self) -> String {
        let mut sections: Vec<String> = Vec::new();
        if let Some(prefix) = self.prefix.as_deref().filter(|p| !p.trim().is_empty()) {
            sections.push(prefix.to_string());
        }
        let response = self.response.trim();
        if !response.is_empty() {
            sections.push(response.to_string());
        }
        if let Some(code) = &self.code {
            sections.push(fenced_code(code));
        }
        let mut body = sections.join("\n\n");
        body.push('\n');
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_substitutes_model() {
        let prefix = render_prefix("_Generated by {model}. Check with your tutor._", "demo-model")
            .expect("prefix");
        assert!(prefix.contains("demo-model"));
        assert!(!prefix.contains(MODEL_PLACEHOLDER));
    }

    #[test]
    fn empty_prefix_is_disabled() {
        assert_eq!(render_prefix("", "demo-model"), None);
        assert_eq!(render_prefix("  \n", "demo-model"), None);
    }

    #[test]
    fn prefix_without_placeholder_is_kept_verbatim() {
        assert_eq!(
            render_prefix("Automated feedback.", "demo-model").as_deref(),
            Some("Automated feedback.")
        );
    }

    #[test]
    fn prefix_keeps_surrounding_whitespace() {
        assert_eq!(
            render_prefix("  > Reviewed by {model}\n", "demo-model").as_deref(),
            Some("  > Reviewed by demo-model\n")
        );
        let artifact = FeedbackArtifact {
            prefix: Some("  > Note".to_string()),
            response: "Fine.".to_string(),
            code: None,
        };
        assert_eq!(artifact.render(), "  > Note\n\nFine.\n");
    }

    #[test]
    fn fence_outgrows_backticks_in_code() {
        assert_eq!(code_fence("x = 1"), "```");
        assert_eq!(code_fence("s = '````'"), "`````");
        assert_eq!(
            fenced_code("print('```')\n"),
            "````python\nprint('```')\n````"
        );
    }

    #[test]
    fn artifact_sections_are_ordered_and_separated() {
        let artifact = FeedbackArtifact {
            prefix: Some("Note".to_string()),
            response: "\nGood use of functions.\n".to_string(),
            code: Some("x = 1\n".to_string()),
        };
        assert_eq!(
            artifact.render(),
            "Note\n\nGood use of functions.\n\n```python\nx = 1\n```\n"
        );
    }

    #[test]
    fn artifact_without_optional_sections() {
        let artifact = FeedbackArtifact {
            prefix: None,
            response: "Nice.".to_string(),
            code: None,
        };
        assert_eq!(artifact.render(), "Nice.\n");
    }

    #[test]
    fn feedback_path_replaces_extension() {
        assert_eq!(
            feedback_path(Path::new("week1/ex2.py"), "md"),
            PathBuf::from("week1/ex2.md")
        );
        assert_eq!(
            feedback_path(Path::new("week1/ex2.ipynb"), "md"),
            PathBuf::from("week1/ex2.md")
        );
        assert_eq!(feedback_path(Path::new("solution"), "md"), PathBuf::from("solution.md"));
    }
}
