//! Stable exit codes for the `pyreview` CLI.

/// Every item was reviewed and its feedback delivered.
pub const OK: i32 = 0;
/// Bad input, config, model, or generation failure.
pub const FAILED: i32 = 1;
/// A feedback file already exists and `--force` was not given.
pub const FEEDBACK_EXISTS: i32 = 2;
