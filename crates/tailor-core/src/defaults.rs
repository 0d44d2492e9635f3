//! Centralized default constants for tailor model routing.
//!
//! **This module is the single source of truth** for shared default values.
//! Configuration loaders and tests reference these constants instead of
//! repeating magic numbers.

// =============================================================================
// SELECTION THRESHOLDS
// =============================================================================

/// Job descriptions above this word count need the long-context model.
pub const LONG_INPUT_WORDS: usize = 1000;

/// Job descriptions below this word count go to the cheapest model.
pub const SHORT_INPUT_WORDS: usize = 200;

/// Complexity strictly above this value selects the premium tier.
pub const PREMIUM_COMPLEXITY: f64 = 0.8;

/// Complexity strictly above this value selects the mid tier.
pub const MID_COMPLEXITY: f64 = 0.5;

/// Artifact counts strictly above this value always select the premium tier.
pub const PREMIUM_ARTIFACT_COUNT: usize = 10;

/// Complexity weight of a long job description.
pub const LONG_INPUT_WEIGHT: f64 = 0.3;

/// Complexity contributed per artifact.
pub const ARTIFACT_WEIGHT: f64 = 0.05;

/// Cap on the artifact contribution to complexity.
pub const ARTIFACT_WEIGHT_CAP: f64 = 0.4;

/// Complexity weight of a creative tone request.
pub const CREATIVE_TONE_WEIGHT: f64 = 0.3;

// =============================================================================
// STRATEGY
// =============================================================================

/// Strategy active when none is configured.
pub const STRATEGY_NAME: &str = "balanced";

/// Default ceiling on the estimated cost of one generation (USD).
pub const MAX_COST_PER_GENERATION_USD: f64 = 0.50;

// =============================================================================
// CIRCUIT BREAKER
// =============================================================================

/// Consecutive failures before a model's breaker opens.
pub const BREAKER_FAILURE_THRESHOLD: u32 = 5;

/// Seconds an open breaker waits before allowing a trial call.
pub const BREAKER_COOLDOWN_SECS: u64 = 60;

// =============================================================================
// TIMEOUTS
// =============================================================================

/// Timeout for a single generation call.
pub const GENERATION_TIMEOUT_SECS: u64 = 30;

/// Timeout for a single embedding call.
pub const EMBEDDING_TIMEOUT_SECS: u64 = 10;

/// HTTP client timeout for provider backends (outer bound; per-call
/// timeouts are applied by the invoker).
pub const HTTP_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// GENERATION
// =============================================================================

/// Output token budget used when a request does not set `max_tokens`.
pub const MAX_OUTPUT_TOKENS: u32 = 4096;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Dimension of the small embedding model.
pub const EMBED_DIMENSION_SMALL: usize = 1536;

/// Dimension of the large embedding model.
pub const EMBED_DIMENSION_LARGE: usize = 3072;

/// Default number of ranked candidates returned.
pub const TOP_K: usize = 10;

// =============================================================================
// COST TRACKING
// =============================================================================

/// Capacity of the fire-and-forget invocation record queue.
pub const RECORDER_QUEUE_CAPACITY: usize = 1024;

/// Default aggregation window for performance summaries (hours).
pub const AGGREGATE_WINDOW_HOURS: i64 = 24;

// =============================================================================
// PROVIDERS
// =============================================================================

/// Default OpenAI API endpoint.
pub const OPENAI_URL: &str = "https://api.openai.com/v1";

/// Default Anthropic API endpoint.
pub const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic API version header value.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_weights_sum_to_one() {
        let max = LONG_INPUT_WEIGHT + ARTIFACT_WEIGHT_CAP + CREATIVE_TONE_WEIGHT;
        assert!((max - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_thresholds_are_ordered() {
        assert!(SHORT_INPUT_WORDS < LONG_INPUT_WORDS);
        assert!(MID_COMPLEXITY < PREMIUM_COMPLEXITY);
        assert!(EMBEDDING_TIMEOUT_SECS < GENERATION_TIMEOUT_SECS);
        assert!(EMBED_DIMENSION_SMALL < EMBED_DIMENSION_LARGE);
    }
}
