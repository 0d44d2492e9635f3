//! OpenAI provider backend.
//!
//! Serves chat completions and embeddings for every OpenAI model in the
//! registry; the model id is chosen per call by the selector.
//!
//! # Example
//!
//! ```rust,no_run
//! use tailor_core::{ChatMessage, CompletionRequest, ProviderBackend};
//! use tailor_inference::openai::{OpenAIBackend, OpenAIConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::new(OpenAIConfig {
//!         api_key: std::env::var("OPENAI_API_KEY").ok(),
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//!     let request = CompletionRequest::new(vec![ChatMessage::user("Extract the skills")]);
//!     let completion = backend.complete("gpt-4o-mini", &request).await.unwrap();
//!     println!("{} ({} tokens out)", completion.text, completion.tokens_out);
//! }
//! ```

mod backend;
mod types;

pub use backend::{OpenAIBackend, OpenAIConfig};
pub use types::*;
