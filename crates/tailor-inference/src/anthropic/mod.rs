//! Anthropic provider backend (Messages API).

mod backend;
mod types;

pub use backend::{AnthropicBackend, AnthropicConfig};
pub use types::*;
