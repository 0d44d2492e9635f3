//! # tailor-inference
//!
//! Model routing for tailor.
//!
//! This crate provides:
//! - The model registry and per-model cost overrides
//! - Built-in and configured selection strategies with atomic swap
//! - Task-based model selection with circuit-breaker fallback
//! - Per-model circuit breakers
//! - Cost calculation and asynchronous invocation recording
//! - OpenAI and Anthropic provider backends
//! - The invoker that runs selected calls under deadlines and budgets
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tailor_inference::{ModelInvoker, ProviderRegistry, RoutingConfig};
//! use tailor_core::{ChatMessage, CompletionRequest, TaskContext};
//! use tailor_db::MemoryInvocationRepository;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RoutingConfig::load().unwrap();
//!     let providers = ProviderRegistry::from_config(&config).unwrap();
//!     let repo = Arc::new(MemoryInvocationRepository::new());
//!     let (invoker, recorder) = ModelInvoker::from_config(&config, providers, repo).unwrap();
//!
//!     let ctx = TaskContext::cv_generation(1200, 8, true);
//!     let request = CompletionRequest::new(vec![ChatMessage::user("Tailor this CV")]);
//!     let out = invoker.generate(&ctx, &request).await.unwrap();
//!     println!("{}: {}", out.model_id, out.selection.selection_reason);
//!
//!     recorder.shutdown().await.unwrap();
//! }
//! ```

pub mod anthropic;
pub mod circuit_breaker;
pub mod config;
pub mod invoker;
pub mod mock;
pub mod openai;
pub mod profiles;
pub mod provider;
pub mod selector;
pub mod strategy;
pub mod tracker;

// Re-export core types
pub use tailor_core::*;

pub use anthropic::{AnthropicBackend, AnthropicConfig};
pub use circuit_breaker::{Admission, BreakerConfig, BreakerSnapshot, CircuitBreakers, CircuitState};
pub use config::{ConfigError, ConfigResult, RoutingConfig};
pub use invoker::{EmbeddingBatch, Generation, InvokerTimeouts, ModelInvoker};
pub use openai::{OpenAIBackend, OpenAIConfig};
pub use profiles::{ModelOverride, ModelRegistry};
pub use provider::ProviderRegistry;
pub use selector::{compute_complexity, ModelSelector};
pub use strategy::{builtin_strategy, validate_strategy, StrategyStore, BUILTIN_STRATEGIES};
pub use tracker::{CostTracker, RecorderHandle, RecorderStats};
