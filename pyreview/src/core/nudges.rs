//! Operator nudges rendered as extra instruction bullets.

/// Render nudges as `- ` prefixed lines in the given order.
///
/// Whitespace inside a nudge (including newlines) collapses to single spaces,
/// so each nudge stays on one line. Blank nudges are skipped; an empty list
/// renders as an empty string.
pub fn render_nudge_block(nudges: &[String]) -> String {
    nudges
        .iter()
        .map(|nudge| nudge.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|nudge| !nudge.is_empty())
        .map(|nudge| format!("- {nudge}"))
        .collect::<Vec<_>>()
        .join("\n")
}
