//! Domain types for model selection, invocation tracking, and embeddings.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::defaults;

// =============================================================================
// PROVIDERS AND MODEL PROFILES
// =============================================================================

/// LLM provider hosting a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    Anthropic,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAI => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            _ => Err(format!("Invalid provider: {}", s)),
        }
    }
}

/// Whether a model produces text or vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Generation,
    Embedding,
}

/// Static descriptor of a callable generation or embedding model.
///
/// Profiles are immutable after the registry is built at process start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Model key as sent to the provider (e.g. "gpt-4o").
    pub id: String,
    pub provider: Provider,
    pub kind: ModelKind,
    /// USD per one million input tokens.
    pub cost_input_per_mtok: f64,
    /// USD per one million output tokens.
    pub cost_output_per_mtok: f64,
    /// Context window in tokens.
    pub context_window: usize,
    #[serde(default)]
    pub capability_tags: BTreeSet<String>,
    /// Output dimension for embedding models.
    #[serde(default)]
    pub embedding_dimension: Option<usize>,
}

impl ModelProfile {
    /// Create a generation model profile.
    pub fn generation(
        id: impl Into<String>,
        provider: Provider,
        cost_input_per_mtok: f64,
        cost_output_per_mtok: f64,
        context_window: usize,
    ) -> Self {
        Self {
            id: id.into(),
            provider,
            kind: ModelKind::Generation,
            cost_input_per_mtok,
            cost_output_per_mtok,
            context_window,
            capability_tags: BTreeSet::new(),
            embedding_dimension: None,
        }
    }

    /// Create an embedding model profile. Embedding calls bill input only.
    pub fn embedding(
        id: impl Into<String>,
        provider: Provider,
        cost_input_per_mtok: f64,
        context_window: usize,
        dimension: usize,
    ) -> Self {
        Self {
            id: id.into(),
            provider,
            kind: ModelKind::Embedding,
            cost_input_per_mtok,
            cost_output_per_mtok: 0.0,
            context_window,
            capability_tags: BTreeSet::new(),
            embedding_dimension: Some(dimension),
        }
    }

    /// Attach capability tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capability_tags
            .extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn is_embedding(&self) -> bool {
        self.kind == ModelKind::Embedding
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.capability_tags.contains(tag)
    }

    /// Input plus output price, used to rank models by cheapness.
    pub fn blended_cost_per_mtok(&self) -> f64 {
        self.cost_input_per_mtok + self.cost_output_per_mtok
    }

    /// Exact cost of a call with the given token counts.
    pub fn cost_for(&self, tokens_in: u64, tokens_out: u64) -> f64 {
        tokens_in as f64 / 1_000_000.0 * self.cost_input_per_mtok
            + tokens_out as f64 / 1_000_000.0 * self.cost_output_per_mtok
    }
}

// =============================================================================
// TASK CONTEXT
// =============================================================================

/// Kind of work a model call performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    JobParsing,
    CvGeneration,
    Embedding,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobParsing => "job_parsing",
            Self::CvGeneration => "cv_generation",
            Self::Embedding => "embedding",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "job_parsing" => Ok(Self::JobParsing),
            "cv_generation" | "generation" => Ok(Self::CvGeneration),
            "embedding" => Ok(Self::Embedding),
            _ => Err(format!("Invalid task type: {}", s)),
        }
    }
}

/// What an embedding will be used for; drives small vs. large model routing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingUseCase {
    SemanticAnalysis,
    ComplexMatching,
    #[default]
    General,
}

impl EmbeddingUseCase {
    /// Parse a free-form label. Unrecognized labels are `General`.
    pub fn from_label(label: &str) -> Self {
        match label.to_lowercase().as_str() {
            "semantic_analysis" => Self::SemanticAnalysis,
            "complex_matching" => Self::ComplexMatching,
            _ => Self::General,
        }
    }

    /// Whether the use case needs the high-dimension embedding model.
    pub fn needs_large_model(&self) -> bool {
        matches!(self, Self::SemanticAnalysis | Self::ComplexMatching)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SemanticAnalysis => "semantic_analysis",
            Self::ComplexMatching => "complex_matching",
            Self::General => "general",
        }
    }
}

/// Per-request signals used to choose a model. Created per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    pub task_type: TaskType,
    #[serde(default)]
    pub input_word_count: usize,
    #[serde(default)]
    pub artifact_count: usize,
    #[serde(default)]
    pub requires_creative_tone: bool,
    #[serde(default)]
    pub use_case: Option<EmbeddingUseCase>,
}

impl TaskContext {
    /// Context for parsing a job description of `input_word_count` words.
    pub fn job_parsing(input_word_count: usize) -> Self {
        Self {
            task_type: TaskType::JobParsing,
            input_word_count,
            artifact_count: 0,
            requires_creative_tone: false,
            use_case: None,
        }
    }

    /// Context for generating a CV / cover letter.
    pub fn cv_generation(
        input_word_count: usize,
        artifact_count: usize,
        requires_creative_tone: bool,
    ) -> Self {
        Self {
            task_type: TaskType::CvGeneration,
            input_word_count,
            artifact_count,
            requires_creative_tone,
            use_case: None,
        }
    }

    /// Context for an embedding call.
    pub fn embedding(use_case: EmbeddingUseCase) -> Self {
        Self {
            task_type: TaskType::Embedding,
            input_word_count: 0,
            artifact_count: 0,
            requires_creative_tone: false,
            use_case: Some(use_case),
        }
    }

    /// Set the word count from raw text.
    pub fn with_input_text(mut self, text: &str) -> Self {
        self.input_word_count = word_count(text);
        self
    }

    pub fn has_long_input(&self) -> bool {
        self.input_word_count > defaults::LONG_INPUT_WORDS
    }

    pub fn has_short_input(&self) -> bool {
        self.input_word_count < defaults::SHORT_INPUT_WORDS
    }

    pub fn use_case_or_default(&self) -> EmbeddingUseCase {
        self.use_case.unwrap_or_default()
    }
}

/// Whitespace-delimited word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

// =============================================================================
// STRATEGY
// =============================================================================

/// Generation tiers ordered from cheapest to most capable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTier {
    Economy,
    Mid,
    Premium,
}

impl fmt::Display for GenerationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Economy => write!(f, "economy"),
            Self::Mid => write!(f, "mid"),
            Self::Premium => write!(f, "premium"),
        }
    }
}

/// Named bundle of default model choices and a cost ceiling.
///
/// Strategies are immutable once loaded; a reload replaces the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionStrategy {
    pub name: String,
    pub job_parsing_model: String,
    /// The strategy's CV-generation model, used for requests at the top of
    /// what the strategy pays for (`max_tier`).
    pub cv_generation_model: String,
    pub embedding_model: String,
    pub fallback_model: String,
    /// Ceiling on the estimated USD cost of one generation call.
    pub max_cost_per_generation: f64,
    /// Model for mid-tier requests when `max_tier` is premium.
    pub mid_tier_model: String,
    /// Highest tier this strategy will pay for; higher requests are downgraded.
    pub max_tier: GenerationTier,
}

impl SelectionStrategy {
    /// Model serving `tier`, which must already be capped at `max_tier`.
    /// `None` means the registry's cheapest model.
    pub fn model_for_tier(&self, tier: GenerationTier) -> Option<&str> {
        match tier {
            GenerationTier::Economy => None,
            t if t >= self.max_tier => Some(&self.cv_generation_model),
            GenerationTier::Mid => Some(&self.mid_tier_model),
            GenerationTier::Premium => Some(&self.cv_generation_model),
        }
    }

    /// Every model id this strategy references.
    pub fn referenced_models(&self) -> [&str; 5] {
        [
            &self.job_parsing_model,
            &self.cv_generation_model,
            &self.embedding_model,
            &self.fallback_model,
            &self.mid_tier_model,
        ]
    }
}

/// Result of a model selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSelection {
    /// Model to invoke.
    pub model_id: String,
    /// Model the policy chose before any breaker substitution.
    pub primary_model_id: String,
    /// Human-readable explanation, for observability.
    pub selection_reason: String,
    /// Complexity score used, always within [0, 1].
    pub complexity: f64,
    /// Whether the breaker forced the fallback model.
    pub fallback_applied: bool,
}

// =============================================================================
// INVOCATION RECORDS
// =============================================================================

/// Immutable audit record of one model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub id: Uuid,
    pub model_id: String,
    pub task_type: TaskType,
    pub latency_ms: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
    pub success: bool,
    /// Optional quality rating in [0, 1].
    pub quality_score: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl InvocationRecord {
    /// Record of a successful call.
    pub fn success(
        model_id: impl Into<String>,
        task_type: TaskType,
        latency_ms: u64,
        tokens_in: u64,
        tokens_out: u64,
        cost_usd: f64,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            model_id: model_id.into(),
            task_type,
            latency_ms,
            tokens_in,
            tokens_out,
            cost_usd,
            success: true,
            quality_score: None,
            timestamp: Utc::now(),
        }
    }

    /// Record of a failed call. Failed calls are billed nothing.
    pub fn failure(model_id: impl Into<String>, task_type: TaskType, latency_ms: u64) -> Self {
        Self {
            id: Uuid::now_v7(),
            model_id: model_id.into(),
            task_type,
            latency_ms,
            tokens_in: 0,
            tokens_out: 0,
            cost_usd: 0.0,
            success: false,
            quality_score: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach a quality score, clamped to [0, 1].
    pub fn with_quality(mut self, score: f64) -> Self {
        self.quality_score = Some(score.clamp(0.0, 1.0));
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Aggregated performance of one model over a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub model_id: String,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub invocations: u64,
    pub successes: u64,
    /// Fraction of successful calls; 0 when there were no calls.
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub total_cost_usd: f64,
    /// Mean of recorded quality scores, if any were recorded.
    pub avg_quality_score: Option<f64>,
}

impl PerformanceSummary {
    /// Summary with no invocations.
    pub fn empty(model_id: impl Into<String>, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            model_id: model_id.into(),
            since,
            until,
            invocations: 0,
            successes: 0,
            success_rate: 0.0,
            avg_latency_ms: 0.0,
            total_cost_usd: 0.0,
            avg_quality_score: None,
        }
    }

    /// Aggregate the records of `model_id` whose timestamp falls in `[since, until]`.
    pub fn from_records<'a, I>(
        model_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        records: I,
    ) -> Self
    where
        I: IntoIterator<Item = &'a InvocationRecord>,
    {
        let mut summary = Self::empty(model_id, since, until);
        let mut latency_sum = 0u64;
        let mut quality_sum = 0.0;
        let mut quality_count = 0u64;

        for record in records.into_iter().filter(|r| {
            r.model_id == model_id && r.timestamp >= since && r.timestamp <= until
        }) {
            summary.invocations += 1;
            if record.success {
                summary.successes += 1;
            }
            latency_sum += record.latency_ms;
            summary.total_cost_usd += record.cost_usd;
            if let Some(q) = record.quality_score {
                quality_sum += q;
                quality_count += 1;
            }
        }

        if summary.invocations > 0 {
            summary.success_rate = summary.successes as f64 / summary.invocations as f64;
            summary.avg_latency_ms = latency_sum as f64 / summary.invocations as f64;
        }
        if quality_count > 0 {
            summary.avg_quality_score = Some(quality_sum / quality_count as f64);
        }
        summary
    }
}

// =============================================================================
// EMBEDDINGS
// =============================================================================

/// Embedding vector type (re-exported from pgvector).
pub use pgvector::Vector;

/// A stored embedding for one (owner, content type) pair.
///
/// Rows are superseded rather than mutated: a content change inserts a new
/// row with a new `content_hash`.
#[derive(Debug, Clone)]
pub struct EmbeddingVector {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub content_type: String,
    pub content_hash: String,
    pub model_id: String,
    pub vector: Vector,
    pub created_at: DateTime<Utc>,
}

impl EmbeddingVector {
    pub fn new(
        owner_id: Uuid,
        content_type: impl Into<String>,
        content_hash: impl Into<String>,
        model_id: impl Into<String>,
        vector: Vector,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            owner_id,
            content_type: content_type.into(),
            content_hash: content_hash.into(),
            model_id: model_id.into(),
            vector,
            created_at: Utc::now(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.vector.as_slice().len()
    }
}

/// SHA-256 hex digest of embedded content, used for change detection.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Similarity measure used for ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMethod {
    #[default]
    Cosine,
    L2,
    InnerProduct,
}

impl DistanceMethod {
    /// pgvector operator for this method.
    pub fn pgvector_operator(&self) -> &'static str {
        match self {
            Self::Cosine => "<=>",
            Self::L2 => "<->",
            Self::InnerProduct => "<#>",
        }
    }

    /// Whether smaller scores are more relevant.
    pub fn ascending(&self) -> bool {
        !matches!(self, Self::InnerProduct)
    }
}

impl FromStr for DistanceMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "l2" | "euclidean" => Ok(Self::L2),
            "inner_product" | "ip" => Ok(Self::InnerProduct),
            _ => Err(format!("Invalid distance method: {}", s)),
        }
    }
}

/// One ranked candidate. `score` is the method's raw value: a distance for
/// cosine and L2, the inner product for inner product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate<K> {
    pub id: K,
    pub score: f32,
}

// =============================================================================
// PROVIDER CALL TYPES
// =============================================================================

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Provider-agnostic completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Output budget, falling back to the default when unset.
    pub fn max_tokens_or_default(&self) -> u32 {
        self.max_tokens.unwrap_or(defaults::MAX_OUTPUT_TOKENS)
    }

    /// Concatenated text of all user messages.
    pub fn user_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Result of a completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// Result of an embedding call.
#[derive(Debug, Clone)]
pub struct Embeddings {
    pub vectors: Vec<Vector>,
    pub tokens_in: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_provider_display_and_parse() {
        assert_eq!(Provider::OpenAI.to_string(), "openai");
        assert_eq!(Provider::Anthropic.to_string(), "anthropic");
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAI);
        assert!("cohere".parse::<Provider>().is_err());
    }

    #[test]
    fn test_cost_for_one_million_input_tokens_is_exact() {
        let profile = ModelProfile::generation("gpt-4o", Provider::OpenAI, 2.5, 10.0, 128_000);
        assert_eq!(profile.cost_for(1_000_000, 0), 2.5);
        assert_eq!(profile.cost_for(0, 1_000_000), 10.0);
    }

    #[test]
    fn test_cost_for_is_linear() {
        let profile = ModelProfile::generation("m", Provider::Anthropic, 3.0, 15.0, 200_000);
        let a = profile.cost_for(1000, 500);
        let b = profile.cost_for(2000, 1000);
        assert!((b - 2.0 * a).abs() < 1e-12);
    }

    #[test]
    fn test_embedding_profile_has_no_output_cost() {
        let profile =
            ModelProfile::embedding("text-embedding-3-small", Provider::OpenAI, 0.02, 8191, 1536);
        assert!(profile.is_embedding());
        assert_eq!(profile.cost_output_per_mtok, 0.0);
        assert_eq!(profile.embedding_dimension, Some(1536));
    }

    #[test]
    fn test_profile_tags() {
        let profile = ModelProfile::generation("m", Provider::OpenAI, 1.0, 1.0, 1000)
            .with_tags(["reasoning", "speed"]);
        assert!(profile.has_tag("reasoning"));
        assert!(!profile.has_tag("vision"));
    }

    #[test]
    fn test_task_type_round_trip_labels() {
        for t in [TaskType::JobParsing, TaskType::CvGeneration, TaskType::Embedding] {
            assert_eq!(t.as_str().parse::<TaskType>().unwrap(), t);
        }
    }

    #[test]
    fn test_use_case_from_label() {
        assert_eq!(
            EmbeddingUseCase::from_label("semantic_analysis"),
            EmbeddingUseCase::SemanticAnalysis
        );
        assert_eq!(
            EmbeddingUseCase::from_label("COMPLEX_MATCHING"),
            EmbeddingUseCase::ComplexMatching
        );
        assert_eq!(
            EmbeddingUseCase::from_label("artifact_search"),
            EmbeddingUseCase::General
        );
        assert!(EmbeddingUseCase::ComplexMatching.needs_large_model());
        assert!(!EmbeddingUseCase::General.needs_large_model());
    }

    #[test]
    fn test_task_context_word_boundaries() {
        assert!(!TaskContext::job_parsing(1000).has_long_input());
        assert!(TaskContext::job_parsing(1001).has_long_input());
        assert!(TaskContext::job_parsing(199).has_short_input());
        assert!(!TaskContext::job_parsing(200).has_short_input());
    }

    #[test]
    fn test_task_context_with_input_text() {
        let ctx = TaskContext::job_parsing(0).with_input_text("Senior Rust engineer,  remote\nfull time");
        assert_eq!(ctx.input_word_count, 6);
    }

    #[test]
    fn test_invocation_record_quality_is_clamped() {
        let record = InvocationRecord::success("m", TaskType::CvGeneration, 10, 1, 1, 0.0)
            .with_quality(1.7);
        assert_eq!(record.quality_score, Some(1.0));
    }

    #[test]
    fn test_failure_record_is_free() {
        let record = InvocationRecord::failure("m", TaskType::JobParsing, 30_000);
        assert!(!record.success);
        assert_eq!(record.cost_usd, 0.0);
        assert_eq!(record.tokens_in, 0);
    }

    #[test]
    fn test_performance_summary_from_records() {
        let now = Utc::now();
        let records = vec![
            InvocationRecord::success("gpt-4o", TaskType::CvGeneration, 100, 10, 10, 0.25)
                .with_quality(0.8)
                .at(now),
            InvocationRecord::failure("gpt-4o", TaskType::CvGeneration, 300).at(now),
            InvocationRecord::success("gpt-4o", TaskType::CvGeneration, 200, 10, 10, 0.5)
                .at(now - Duration::hours(48)),
            InvocationRecord::success("other", TaskType::CvGeneration, 50, 1, 1, 9.0).at(now),
        ];

        let summary = PerformanceSummary::from_records(
            "gpt-4o",
            now - Duration::hours(1),
            now,
            &records,
        );
        assert_eq!(summary.invocations, 2);
        assert_eq!(summary.successes, 1);
        assert!((summary.success_rate - 0.5).abs() < 1e-9);
        assert!((summary.avg_latency_ms - 200.0).abs() < 1e-9);
        assert!((summary.total_cost_usd - 0.25).abs() < 1e-9);
        assert_eq!(summary.avg_quality_score, Some(0.8));
    }

    #[test]
    fn test_performance_summary_empty_window() {
        let now = Utc::now();
        let summary = PerformanceSummary::from_records("m", now, now, &[]);
        assert_eq!(summary.invocations, 0);
        assert_eq!(summary.success_rate, 0.0);
        assert!(summary.avg_quality_score.is_none());
    }

    #[test]
    fn test_content_hash_is_stable_and_distinct() {
        let a = content_hash("Rust developer with 5 years experience");
        let b = content_hash("Rust developer with 5 years experience");
        let c = content_hash("Go developer with 5 years experience");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_distance_method_operators() {
        assert_eq!(DistanceMethod::Cosine.pgvector_operator(), "<=>");
        assert_eq!(DistanceMethod::L2.pgvector_operator(), "<->");
        assert_eq!(DistanceMethod::InnerProduct.pgvector_operator(), "<#>");
        assert!(DistanceMethod::Cosine.ascending());
        assert!(!DistanceMethod::InnerProduct.ascending());
        assert_eq!("ip".parse::<DistanceMethod>().unwrap(), DistanceMethod::InnerProduct);
    }

    #[test]
    fn test_completion_request_defaults() {
        let req = CompletionRequest::new(vec![
            ChatMessage::system("You write CVs."),
            ChatMessage::user("Tailor this."),
        ]);
        assert_eq!(req.max_tokens_or_default(), defaults::MAX_OUTPUT_TOKENS);
        assert_eq!(req.user_text(), "Tailor this.");
        assert_eq!(req.with_max_tokens(256).max_tokens_or_default(), 256);
    }

    #[test]
    fn test_strategy_model_for_tier() {
        let strategy = SelectionStrategy {
            name: "s".into(),
            job_parsing_model: "a".into(),
            cv_generation_model: "b".into(),
            embedding_model: "e".into(),
            fallback_model: "f".into(),
            max_cost_per_generation: 1.0,
            mid_tier_model: "m".into(),
            max_tier: GenerationTier::Premium,
        };
        assert_eq!(strategy.model_for_tier(GenerationTier::Premium), Some("b"));
        assert_eq!(strategy.model_for_tier(GenerationTier::Mid), Some("m"));
        assert_eq!(strategy.model_for_tier(GenerationTier::Economy), None);
        assert!(GenerationTier::Premium > GenerationTier::Mid);
        assert_eq!(strategy.referenced_models().len(), 5);

        // Capped at mid, the strategy's CV model serves the mid tier.
        let capped = SelectionStrategy {
            max_tier: GenerationTier::Mid,
            ..strategy
        };
        assert_eq!(capped.model_for_tier(GenerationTier::Mid), Some("b"));
        assert_eq!(capped.model_for_tier(GenerationTier::Economy), None);
    }
}
