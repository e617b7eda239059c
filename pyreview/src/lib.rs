//! Batched LLM code review for beginner Python.
//!
//! Each input file (or stdin) becomes one review prompt. All prompts go to the
//! model as a single batch, and each response is written next to the file it
//! belongs to as `<stem>.md`.
//!
//! - **[`core`]**: Pure logic (extraction, prompt-independent batch
//!   bookkeeping, echo stripping, artifact layout). No I/O.
//! - **[`io`]**: Filesystem, config, templates, and the model backend.
//!
//! [`review`] ties the two together for the CLI.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod review;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
