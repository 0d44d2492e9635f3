//! # tailor-core
//!
//! Core types, traits, and abstractions for tailor model routing.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the other tailor crates depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod tokenizer;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use tokenizer::{count_prompt_tokens, count_tokens, estimate_tokens, TiktokenTokenizer, Tokenizer};
pub use traits::*;
