//! Deterministic, pure logic shared by the review pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod artifact;
pub mod batch;
pub mod extract;
pub mod nudges;
pub mod tokens;
pub mod types;
