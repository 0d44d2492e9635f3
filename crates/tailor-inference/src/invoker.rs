//! Invocation orchestration.
//!
//! [`ModelInvoker`] ties selection to execution: it picks a model, asks the
//! model's breaker for admission, checks the cost ceiling, runs the call
//! under a deadline, feeds the outcome back into the breaker and the
//! recorder, and retries at most once against the strategy fallback.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn, Span};

use tailor_core::{
    defaults, logging, Completion, CompletionRequest, Embeddings, Error, InvocationRecord,
    InvocationRepository, ModelSelection, Result, SelectionStrategy, TaskContext, TaskType,
    TextEmbedder, Vector,
};

use crate::circuit_breaker::{Admission, CircuitBreakers};
use crate::config::RoutingConfig;
use crate::profiles::ModelRegistry;
use crate::provider::ProviderRegistry;
use crate::selector::ModelSelector;
use crate::strategy::{validate_strategy, StrategyStore};
use crate::tracker::{CostTracker, RecorderHandle};

/// Per-call deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokerTimeouts {
    pub generation: Duration,
    pub embedding: Duration,
}

impl Default for InvokerTimeouts {
    fn default() -> Self {
        Self {
            generation: Duration::from_secs(defaults::GENERATION_TIMEOUT_SECS),
            embedding: Duration::from_secs(defaults::EMBEDDING_TIMEOUT_SECS),
        }
    }
}

/// Outcome of a completion call.
#[derive(Debug, Clone)]
pub struct Generation {
    /// Selection made before the call.
    pub selection: ModelSelection,
    /// Model that produced the completion.
    pub model_id: String,
    pub completion: Completion,
    pub cost_usd: f64,
    pub latency_ms: u64,
    /// Whether the first attempt failed and the fallback answered.
    pub retried: bool,
}

/// Outcome of an embedding call.
#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    pub selection: ModelSelection,
    pub model_id: String,
    pub embeddings: Embeddings,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub retried: bool,
}

/// Selection plus execution against the provider backends.
pub struct ModelInvoker {
    selector: ModelSelector,
    strategies: Arc<StrategyStore>,
    breakers: Arc<CircuitBreakers>,
    providers: ProviderRegistry,
    tracker: CostTracker,
    timeouts: InvokerTimeouts,
}

impl ModelInvoker {
    pub fn new(
        selector: ModelSelector,
        strategies: Arc<StrategyStore>,
        breakers: Arc<CircuitBreakers>,
        providers: ProviderRegistry,
        tracker: CostTracker,
        timeouts: InvokerTimeouts,
    ) -> Self {
        Self {
            selector,
            strategies,
            breakers,
            providers,
            tracker,
            timeouts,
        }
    }

    /// Build every component from configuration and start the recorder.
    ///
    /// Must be called inside a tokio runtime.
    pub fn from_config(
        config: &RoutingConfig,
        providers: ProviderRegistry,
        repository: Arc<dyn InvocationRepository>,
    ) -> Result<(Self, RecorderHandle)> {
        let registry = Arc::new(config.build_registry()?);
        let strategy = config.active(&registry)?;
        let (tracker, handle) = CostTracker::start(
            Arc::clone(&registry),
            repository,
            config.recorder.queue_capacity,
        );

        info!(
            subsystem = "invoker",
            strategy = %strategy.name,
            models = registry.len(),
            failure_threshold = config.breaker.failure_threshold,
            "Model invoker initialized"
        );

        let invoker = Self::new(
            ModelSelector::new(registry),
            Arc::new(StrategyStore::new(strategy)),
            Arc::new(CircuitBreakers::new(config.breaker_config())),
            providers,
            tracker,
            InvokerTimeouts {
                generation: config.generation_timeout(),
                embedding: config.embedding_timeout(),
            },
        );
        Ok((invoker, handle))
    }

    pub fn registry(&self) -> &ModelRegistry {
        self.selector.registry()
    }

    pub fn breakers(&self) -> &CircuitBreakers {
        &self.breakers
    }

    pub fn tracker(&self) -> &CostTracker {
        &self.tracker
    }

    /// Active strategy.
    pub fn strategy(&self) -> Arc<SelectionStrategy> {
        self.strategies.current()
    }

    /// Validate `strategy` against the registry and make it active.
    ///
    /// In-flight calls keep the strategy they started with.
    pub fn reload_strategy(&self, strategy: SelectionStrategy) -> Result<Arc<SelectionStrategy>> {
        validate_strategy(&strategy, self.registry())?;
        Ok(self.strategies.swap(strategy))
    }

    /// Activate the strategy named by a freshly loaded `config`.
    ///
    /// Only the strategy is swapped; breaker, timeout and recorder settings
    /// take effect on the next restart.
    pub fn reload_from_config(&self, config: &RoutingConfig) -> Result<Arc<SelectionStrategy>> {
        let strategy = config.active(self.registry())?;
        info!(
            subsystem = "invoker",
            op = "reload",
            strategy = %strategy.name,
            "Reloading selection strategy"
        );
        self.reload_strategy(strategy)
    }

    /// Choose a model for `ctx` under the active strategy. Reads breaker
    /// state only.
    pub fn select_model(&self, ctx: &TaskContext) -> Result<ModelSelection> {
        self.selector.select(ctx, &self.strategies.current(), &self.breakers)
    }

    /// Run a completion for a job-parsing or CV-generation task.
    #[instrument(skip_all, fields(
        subsystem = "invoker",
        op = "generate",
        task_type = %ctx.task_type,
        model = tracing::field::Empty,
        fallback = tracing::field::Empty,
    ))]
    pub async fn generate(&self, ctx: &TaskContext, request: &CompletionRequest) -> Result<Generation> {
        if ctx.task_type == TaskType::Embedding {
            return Err(Error::InvalidInput(
                "Embedding tasks must use embed()".to_string(),
            ));
        }

        let strategy = self.strategies.current();
        let selection = self.selector.select(ctx, &strategy, &self.breakers)?;
        let fallback = self.selector.fallback_for(ctx.task_type, &strategy).to_string();
        let admission = self.admit(&selection.model_id, &fallback)?;
        let admission = self.check_budget(admission, request, &strategy)?;
        let model_id = admission.model_id().to_string();

        let first = self.complete_once(admission, ctx.task_type, request).await;
        let (model_id, result, retried) = match first {
            Err(e) if e.is_retryable() && model_id != fallback => {
                let Some(retry_admission) = self.breakers.acquire(&fallback) else {
                    return Err(e);
                };
                let retry_admission = self.check_budget(retry_admission, request, &strategy)?;
                warn!(
                    subsystem = "invoker",
                    model = %model_id,
                    fallback = %fallback,
                    error = %e,
                    "Call failed, retrying once on fallback model"
                );
                let retry = self
                    .complete_once(retry_admission, ctx.task_type, request)
                    .await;
                (fallback, retry, true)
            }
            other => (model_id, other, false),
        };
        let (completion, latency_ms) = result?;

        let cost_usd = self
            .tracker
            .calculate_cost(&model_id, completion.tokens_in, completion.tokens_out)?;
        self.tracker.record(InvocationRecord::success(
            &model_id,
            ctx.task_type,
            latency_ms,
            completion.tokens_in,
            completion.tokens_out,
            cost_usd,
        ));

        let span = Span::current();
        span.record(logging::MODEL, model_id.as_str());
        span.record(logging::FALLBACK, selection.fallback_applied || retried);
        debug!(
            subsystem = "invoker",
            op = "generate",
            tokens_in = completion.tokens_in,
            tokens_out = completion.tokens_out,
            cost_usd,
            duration_ms = latency_ms,
            "Completion finished"
        );

        Ok(Generation {
            selection,
            model_id,
            completion,
            cost_usd,
            latency_ms,
            retried,
        })
    }

    /// Embed `texts` for an embedding task.
    ///
    /// Returned vectors are checked against the model's declared dimension.
    #[instrument(skip_all, fields(
        subsystem = "invoker",
        op = "embed",
        input_count = texts.len(),
        model = tracing::field::Empty,
        fallback = tracing::field::Empty,
    ))]
    pub async fn embed(&self, ctx: &TaskContext, texts: &[String]) -> Result<EmbeddingBatch> {
        if ctx.task_type != TaskType::Embedding {
            return Err(Error::InvalidInput(format!(
                "Task {} cannot produce embeddings",
                ctx.task_type
            )));
        }

        let strategy = self.strategies.current();
        let selection = self.selector.select(ctx, &strategy, &self.breakers)?;
        if texts.is_empty() {
            return Ok(EmbeddingBatch {
                model_id: selection.model_id.clone(),
                selection,
                embeddings: Embeddings {
                    vectors: Vec::new(),
                    tokens_in: 0,
                },
                cost_usd: 0.0,
                latency_ms: 0,
                retried: false,
            });
        }

        let fallback = self.selector.fallback_for(ctx.task_type, &strategy).to_string();
        let admission = self.admit(&selection.model_id, &fallback)?;
        let model_id = admission.model_id().to_string();

        let first = self.embed_once(admission, texts).await;
        let (model_id, result, retried) = match first {
            Err(e) if e.is_retryable() && model_id != fallback => {
                let Some(retry_admission) = self.breakers.acquire(&fallback) else {
                    return Err(e);
                };
                warn!(
                    subsystem = "invoker",
                    model = %model_id,
                    fallback = %fallback,
                    error = %e,
                    "Embedding failed, retrying once on fallback model"
                );
                let retry = self.embed_once(retry_admission, texts).await;
                (fallback, retry, true)
            }
            other => (model_id, other, false),
        };
        let (embeddings, latency_ms) = result?;

        let cost_usd = self.tracker.calculate_cost(&model_id, embeddings.tokens_in, 0)?;
        self.tracker.record(InvocationRecord::success(
            &model_id,
            TaskType::Embedding,
            latency_ms,
            embeddings.tokens_in,
            0,
            cost_usd,
        ));

        let span = Span::current();
        span.record(logging::MODEL, model_id.as_str());
        span.record(logging::FALLBACK, selection.fallback_applied || retried);

        Ok(EmbeddingBatch {
            selection,
            model_id,
            embeddings,
            cost_usd,
            latency_ms,
            retried,
        })
    }

    /// Admit a call to `model_id`, or to `fallback` when the breaker refuses.
    fn admit(&self, model_id: &str, fallback: &str) -> Result<Admission<'_>> {
        if let Some(admission) = self.breakers.acquire(model_id) {
            return Ok(admission);
        }
        if fallback != model_id {
            if let Some(admission) = self.breakers.acquire(fallback) {
                warn!(
                    subsystem = "invoker",
                    model = model_id,
                    fallback,
                    "Breaker refused call, using fallback model"
                );
                return Ok(admission);
            }
        }
        Err(Error::unavailable(
            model_id,
            format!("circuit open for {} and fallback {}", model_id, fallback),
        ))
    }

    /// Reject the call when its estimated cost exceeds the strategy ceiling.
    fn check_budget<'a>(
        &self,
        admission: Admission<'a>,
        request: &CompletionRequest,
        strategy: &SelectionStrategy,
    ) -> Result<Admission<'a>> {
        let model_id = admission.model_id();
        let estimated_usd = match self.tracker.estimate_cost(model_id, request) {
            Ok(estimate) => estimate,
            Err(e) => {
                admission.release();
                return Err(e);
            }
        };
        debug!(
            subsystem = "invoker",
            op = "budget",
            model = model_id,
            estimated_usd,
            ceiling_usd = strategy.max_cost_per_generation,
            "Budget estimate"
        );
        if estimated_usd > strategy.max_cost_per_generation {
            let err = Error::BudgetExceeded {
                model: model_id.to_string(),
                estimated_usd,
                ceiling_usd: strategy.max_cost_per_generation,
            };
            admission.release();
            return Err(err);
        }
        Ok(admission)
    }

    async fn complete_once(
        &self,
        admission: Admission<'_>,
        task_type: TaskType,
        request: &CompletionRequest,
    ) -> Result<(Completion, u64)> {
        let model_id = admission.model_id().to_string();
        let backend = match self
            .registry()
            .require(&model_id)
            .and_then(|profile| self.providers.for_model(profile))
        {
            Ok(backend) => backend,
            Err(e) => {
                admission.release();
                return Err(e);
            }
        };
        self.guarded(admission, task_type, self.timeouts.generation, || {
            backend.complete(&model_id, request)
        })
        .await
    }

    async fn embed_once(
        &self,
        admission: Admission<'_>,
        texts: &[String],
    ) -> Result<(Embeddings, u64)> {
        let model_id = admission.model_id().to_string();
        let resolved = self.registry().require(&model_id).and_then(|profile| {
            let backend = self.providers.for_model(profile)?;
            Ok((backend, profile.embedding_dimension))
        });
        let (backend, expected) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                admission.release();
                return Err(e);
            }
        };

        // A wrong-sized answer is a failed invocation, not a success.
        let model = model_id.as_str();
        self.guarded(admission, TaskType::Embedding, self.timeouts.embedding, move || async move {
            let embeddings = backend.embed(model, texts).await?;
            if let Some(expected) = expected {
                check_dimensions(expected, &embeddings)?;
            }
            Ok(embeddings)
        })
        .await
    }

    /// Run `call` under `deadline` and report the outcome to the breaker.
    ///
    /// Failures are recorded here; successes are recorded by the caller once
    /// the cost is known. If the returned future is dropped mid-call, the
    /// admission and the pending record both report a failure.
    async fn guarded<T, F, Fut>(
        &self,
        admission: Admission<'_>,
        task_type: TaskType,
        deadline: Duration,
        call: F,
    ) -> Result<(T, u64)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let model_id = admission.model_id().to_string();
        let pending = PendingRecord::new(&self.tracker, &model_id, task_type);
        let result = match tokio::time::timeout(deadline, call()).await {
            Ok(result) => result,
            Err(_) => Err(Error::unavailable(
                &model_id,
                format!("timed out after {}ms", deadline.as_millis()),
            )),
        };
        let latency_ms = pending.finish();

        match result {
            Ok(value) => {
                admission.success();
                Ok((value, latency_ms))
            }
            Err(e) => {
                if e.counts_against_breaker() {
                    admission.failure();
                } else {
                    admission.release();
                }
                warn!(
                    subsystem = "invoker",
                    model = %model_id,
                    task_type = task_type.as_str(),
                    duration_ms = latency_ms,
                    error = %e,
                    "Provider call failed"
                );
                self.tracker
                    .record(InvocationRecord::failure(&model_id, task_type, latency_ms));
                Err(e)
            }
        }
    }
}

fn check_dimensions(expected: usize, embeddings: &Embeddings) -> Result<()> {
    match embeddings
        .vectors
        .iter()
        .find(|v| v.as_slice().len() != expected)
    {
        Some(bad) => Err(Error::DimensionMismatch {
            expected,
            actual: bad.as_slice().len(),
        }),
        None => Ok(()),
    }
}

/// Failure record written when a provider call is abandoned mid-flight.
struct PendingRecord<'a> {
    tracker: &'a CostTracker,
    model_id: &'a str,
    task_type: TaskType,
    start: Instant,
    finished: bool,
}

impl<'a> PendingRecord<'a> {
    fn new(tracker: &'a CostTracker, model_id: &'a str, task_type: TaskType) -> Self {
        Self {
            tracker,
            model_id,
            task_type,
            start: Instant::now(),
            finished: false,
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Disarm and return the call's latency.
    fn finish(mut self) -> u64 {
        self.finished = true;
        self.elapsed_ms()
    }
}

impl Drop for PendingRecord<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.tracker.record(InvocationRecord::failure(
                self.model_id,
                self.task_type,
                self.elapsed_ms(),
            ));
        }
    }
}

#[async_trait]
impl TextEmbedder for ModelInvoker {
    fn embedding_model(&self, ctx: &TaskContext) -> Result<String> {
        Ok(self.select_model(ctx)?.model_id)
    }

    async fn embed_texts(&self, ctx: &TaskContext, texts: &[String]) -> Result<(String, Vec<Vector>)> {
        let batch = self.embed(ctx, texts).await?;
        Ok((batch.model_id, batch.embeddings.vectors))
    }
}
