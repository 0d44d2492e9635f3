//! Task-based model selection.
//!
//! The selector maps a [`TaskContext`] and the active [`SelectionStrategy`]
//! to a model id:
//!
//! - **Job parsing**: long inputs need the long-context model, short inputs
//!   go to the cheapest model, everything else uses the strategy default.
//! - **CV generation**: a complexity score picks the premium, mid, or economy
//!   tier, capped by the strategy's `max_tier`.
//! - **Embedding**: analysis-heavy use cases get the high-dimension model.
//!
//! An open circuit on the chosen model substitutes the strategy fallback.
//! Selection only reads breaker state.

use std::sync::Arc;

use tracing::debug;

use tailor_core::{
    defaults, Error, GenerationTier, ModelProfile, ModelSelection, Result, SelectionStrategy,
    TaskContext, TaskType,
};

use crate::circuit_breaker::CircuitBreakers;
use crate::profiles::ModelRegistry;

/// Complexity score of a generation request, always within [0, 1].
///
/// More than [`defaults::PREMIUM_ARTIFACT_COUNT`] artifacts floors the score
/// at [`defaults::PREMIUM_COMPLEXITY`].
pub fn compute_complexity(ctx: &TaskContext) -> f64 {
    let long_input = if ctx.has_long_input() {
        defaults::LONG_INPUT_WEIGHT
    } else {
        0.0
    };
    let artifacts = (defaults::ARTIFACT_WEIGHT * ctx.artifact_count as f64)
        .min(defaults::ARTIFACT_WEIGHT_CAP);
    let creative = if ctx.requires_creative_tone {
        defaults::CREATIVE_TONE_WEIGHT
    } else {
        0.0
    };

    let mut score = long_input + artifacts + creative;
    if ctx.artifact_count > defaults::PREMIUM_ARTIFACT_COUNT {
        score = score.max(defaults::PREMIUM_COMPLEXITY);
    }
    score.clamp(0.0, 1.0)
}

/// Model selector over a fixed registry.
#[derive(Debug, Clone)]
pub struct ModelSelector {
    registry: Arc<ModelRegistry>,
}

impl ModelSelector {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Choose the model for `ctx` under `strategy`, honoring open circuits.
    pub fn select(
        &self,
        ctx: &TaskContext,
        strategy: &SelectionStrategy,
        breakers: &CircuitBreakers,
    ) -> Result<ModelSelection> {
        let complexity = compute_complexity(ctx);
        let (primary, mut reason) = match ctx.task_type {
            TaskType::JobParsing => self.select_job_parsing(ctx, strategy)?,
            TaskType::CvGeneration => self.select_generation(ctx, complexity, strategy)?,
            TaskType::Embedding => self.select_embedding(ctx, strategy)?,
        };
        self.registry.require(&primary)?;

        let mut model_id = primary.clone();
        let mut fallback_applied = false;
        if breakers.should_route_to_fallback(&primary) {
            let fallback = self.fallback_for(ctx.task_type, strategy);
            if fallback != primary {
                self.registry.require(fallback)?;
                reason.push_str(&format!(
                    "; circuit open for {}, routed to fallback {}",
                    primary, fallback
                ));
                model_id = fallback.to_string();
                fallback_applied = true;
            } else {
                reason.push_str(&format!(
                    "; circuit open for {} but it is also the fallback",
                    primary
                ));
            }
        }

        debug!(
            subsystem = "selector",
            op = "select",
            task_type = ctx.task_type.as_str(),
            strategy = %strategy.name,
            model = %model_id,
            primary_model = %primary,
            complexity,
            fallback = fallback_applied,
            reason = %reason,
            "Model selected"
        );

        Ok(ModelSelection {
            model_id,
            primary_model_id: primary,
            selection_reason: reason,
            complexity,
            fallback_applied,
        })
    }

    /// Fallback model for a task type.
    ///
    /// Generation tasks use `strategy.fallback_model`. Embedding tasks fall
    /// back to the strategy's default embedding model, since a generation
    /// model cannot produce vectors.
    pub fn fallback_for<'a>(&self, task_type: TaskType, strategy: &'a SelectionStrategy) -> &'a str {
        match task_type {
            TaskType::Embedding => &strategy.embedding_model,
            TaskType::JobParsing | TaskType::CvGeneration => &strategy.fallback_model,
        }
    }

    fn select_job_parsing(
        &self,
        ctx: &TaskContext,
        strategy: &SelectionStrategy,
    ) -> Result<(String, String)> {
        if ctx.has_long_input() {
            let model = self.long_context()?;
            return Ok((
                model.id.clone(),
                format!(
                    "input_word_count={} > {}: long-context model {} ({} token window)",
                    ctx.input_word_count,
                    defaults::LONG_INPUT_WORDS,
                    model.id,
                    model.context_window
                ),
            ));
        }
        if ctx.has_short_input() {
            let model = self.cheapest()?;
            return Ok((
                model.id.clone(),
                format!(
                    "input_word_count={} < {}: cheapest model {}",
                    ctx.input_word_count,
                    defaults::SHORT_INPUT_WORDS,
                    model.id
                ),
            ));
        }
        Ok((
            strategy.job_parsing_model.clone(),
            format!(
                "input_word_count={}: {} job parsing default {}",
                ctx.input_word_count, strategy.name, strategy.job_parsing_model
            ),
        ))
    }

    fn select_generation(
        &self,
        ctx: &TaskContext,
        complexity: f64,
        strategy: &SelectionStrategy,
    ) -> Result<(String, String)> {
        let (requested, trigger) = if ctx.artifact_count > defaults::PREMIUM_ARTIFACT_COUNT {
            (
                GenerationTier::Premium,
                format!(
                    "artifact_count={} > {}",
                    ctx.artifact_count,
                    defaults::PREMIUM_ARTIFACT_COUNT
                ),
            )
        } else if complexity > defaults::PREMIUM_COMPLEXITY {
            (
                GenerationTier::Premium,
                format!(
                    "complexity={:.2} > {}",
                    complexity,
                    defaults::PREMIUM_COMPLEXITY
                ),
            )
        } else if complexity > defaults::MID_COMPLEXITY {
            (
                GenerationTier::Mid,
                format!("complexity={:.2} > {}", complexity, defaults::MID_COMPLEXITY),
            )
        } else {
            (
                GenerationTier::Economy,
                format!("complexity={:.2} <= {}", complexity, defaults::MID_COMPLEXITY),
            )
        };

        let tier = requested.min(strategy.max_tier);
        let model_id = match strategy.model_for_tier(tier) {
            Some(id) => id.to_string(),
            None => self.cheapest()?.id.clone(),
        };

        let reason = if tier < requested {
            format!(
                "{}: {} tier requested, downgraded to {} tier by {} strategy: {}",
                trigger, requested, tier, strategy.name, model_id
            )
        } else {
            format!("{}: {} tier model {}", trigger, tier, model_id)
        };
        Ok((model_id, reason))
    }

    fn select_embedding(
        &self,
        ctx: &TaskContext,
        strategy: &SelectionStrategy,
    ) -> Result<(String, String)> {
        let use_case = ctx.use_case_or_default();
        if use_case.needs_large_model() {
            let model = self
                .registry
                .largest_embedding()
                .ok_or_else(|| Error::Config("No embedding models registered".to_string()))?;
            return Ok((
                model.id.clone(),
                format!(
                    "use_case={}: high-dimension embedding model {} ({} dims)",
                    use_case.as_str(),
                    model.id,
                    model.embedding_dimension.unwrap_or_default()
                ),
            ));
        }
        Ok((
            strategy.embedding_model.clone(),
            format!(
                "use_case={}: {} embedding default {}",
                use_case.as_str(),
                strategy.name,
                strategy.embedding_model
            ),
        ))
    }

    fn cheapest(&self) -> Result<&ModelProfile> {
        self.registry
            .cheapest_generation()
            .ok_or_else(|| Error::Config("No generation models registered".to_string()))
    }

    fn long_context(&self) -> Result<&ModelProfile> {
        self.registry
            .long_context_generation()
            .ok_or_else(|| Error::Config("No generation models registered".to_string()))
    }
}
