//! Side-effecting parts of a review: reading inputs, loading config, talking to
//! the model, and writing feedback.

pub mod batch;
pub mod chat_template;
pub mod config;
pub mod hf;
pub mod model;
pub mod prompt;
pub mod source;
pub mod writer;
