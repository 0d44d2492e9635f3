//! Scripted provider backend for deterministic testing.
//!
//! Outcomes are queued per model id; once a model's queue is empty every
//! call succeeds with the default response. Embeddings are derived from the
//! text so equal inputs always produce equal vectors.
//!
//! ## Usage
//!
//! ```rust
//! use tailor_core::Provider;
//! use tailor_inference::mock::{MockOutcome, ScriptedBackend};
//!
//! let backend = ScriptedBackend::new(Provider::OpenAI)
//!     .with_response("Tailored CV")
//!     .with_dimension(1536);
//! backend.push_outcomes("gpt-4o", MockOutcome::Unavailable, 5);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use tailor_core::{
    count_prompt_tokens, count_tokens, Completion, CompletionRequest, Embeddings, Error, Provider,
    ProviderBackend, Result, Vector,
};

/// Result of one scripted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOutcome {
    Succeed,
    /// Fails with [`Error::ProviderUnavailable`].
    Unavailable,
    /// Fails with [`Error::ProviderAuth`].
    AuthFailure,
    /// Never answers within any reasonable deadline.
    Hang,
}

/// A call observed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub operation: &'static str,
    pub model_id: String,
    pub input_count: usize,
}

#[derive(Debug, Default)]
struct Script {
    queued: HashMap<String, VecDeque<MockOutcome>>,
    always_failing: HashSet<String>,
    calls: Vec<MockCall>,
}

/// Provider backend driven by a per-model script.
#[derive(Debug)]
pub struct ScriptedBackend {
    provider: Provider,
    response: String,
    dimension: usize,
    latency: Duration,
    script: Mutex<Script>,
}

impl ScriptedBackend {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            response: "Mock response".to_string(),
            dimension: 1536,
            latency: Duration::ZERO,
            script: Mutex::new(Script::default()),
        }
    }

    /// Text returned by successful completions.
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = response.into();
        self
    }

    /// Length of generated embedding vectors.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Simulated latency applied to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `count` copies of `outcome` for `model_id`.
    pub fn push_outcomes(&self, model_id: &str, outcome: MockOutcome, count: usize) {
        let mut script = self.lock();
        let queue = script.queued.entry(model_id.to_string()).or_default();
        queue.extend(std::iter::repeat(outcome).take(count));
    }

    /// Make every call to `model_id` fail as unavailable.
    pub fn fail_always(&self, model_id: &str) {
        self.lock().always_failing.insert(model_id.to_string());
    }

    /// Every call seen so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Number of calls made against `model_id`.
    pub fn call_count(&self, model_id: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.model_id == model_id)
            .count()
    }

    fn next_outcome(&self, operation: &'static str, model_id: &str, input_count: usize) -> MockOutcome {
        let mut script = self.lock();
        script.calls.push(MockCall {
            operation,
            model_id: model_id.to_string(),
            input_count,
        });
        if script.always_failing.contains(model_id) {
            return MockOutcome::Unavailable;
        }
        script
            .queued
            .get_mut(model_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(MockOutcome::Succeed)
    }

    async fn play(&self, outcome: MockOutcome, model_id: &str) -> Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match outcome {
            MockOutcome::Succeed => Ok(()),
            MockOutcome::Unavailable => Err(Error::unavailable(model_id, "scripted failure")),
            MockOutcome::AuthFailure => Err(Error::ProviderAuth {
                provider: self.provider.to_string(),
                message: "scripted authentication failure".to_string(),
            }),
            MockOutcome::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                Err(Error::unavailable(model_id, "scripted hang ended"))
            }
        }
    }
}

#[async_trait]
impl ProviderBackend for ScriptedBackend {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn complete(&self, model_id: &str, request: &CompletionRequest) -> Result<Completion> {
        let outcome = self.next_outcome("complete", model_id, request.messages.len());
        self.play(outcome, model_id).await?;
        Ok(Completion {
            text: self.response.clone(),
            tokens_in: count_prompt_tokens(request) as u64,
            tokens_out: count_tokens(&self.response) as u64,
        })
    }

    async fn embed(&self, model_id: &str, texts: &[String]) -> Result<Embeddings> {
        let outcome = self.next_outcome("embed", model_id, texts.len());
        self.play(outcome, model_id).await?;
        Ok(Embeddings {
            vectors: texts
                .iter()
                .map(|t| Vector::from(deterministic_embedding(t, self.dimension)))
                .collect(),
            tokens_in: texts.iter().map(|t| count_tokens(t) as u64).sum(),
        })
    }
}

/// Unit vector derived from the characters of `text`.
pub fn deterministic_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dimension];
    if dimension == 0 {
        return vec;
    }
    for (i, c) in text.chars().enumerate() {
        vec[(c as usize + i) % dimension] += 0.1;
    }
    let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        vec.iter_mut().for_each(|x| *x /= magnitude);
    }
    vec
}
