//! Structured logging schema and field name constants for tailor.
//!
//! All crates use these constants for consistent structured logging fields so
//! log aggregation can query by the same names across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied, record dropped |
//! | INFO  | Lifecycle events (startup, shutdown, strategy swap) |
//! | DEBUG | Decision points (selection reason, budget estimate) |
//! | TRACE | Per-item iteration (ranked candidates) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "selector", "breaker", "tracker", "invoker", "provider", "search", "db"
pub const SUBSYSTEM: &str = "subsystem";

/// Logical operation name.
/// Examples: "select", "complete", "embed", "record", "rank"
pub const OPERATION: &str = "op";

/// Invocation record UUID.
pub const INVOCATION_ID: &str = "invocation_id";

/// Owner entity of an embedding (artifact or job description).
pub const OWNER_ID: &str = "owner_id";

// ─── Routing fields ────────────────────────────────────────────────────────

/// Model id used for the call.
pub const MODEL: &str = "model";

/// Model id originally selected before fallback substitution.
pub const PRIMARY_MODEL: &str = "primary_model";

/// Provider name ("openai", "anthropic").
pub const PROVIDER: &str = "provider";

/// Task type ("job_parsing", "cv_generation", "embedding").
pub const TASK_TYPE: &str = "task_type";

/// Active strategy name.
pub const STRATEGY: &str = "strategy";

/// Complexity score used for the selection.
pub const COMPLEXITY: &str = "complexity";

/// Human-readable selection reason.
pub const REASON: &str = "reason";

/// Whether a fallback model was used.
pub const FALLBACK: &str = "fallback";

/// Breaker state after a transition.
pub const BREAKER_STATE: &str = "breaker_state";

/// Consecutive failure count for a model.
pub const FAILURE_COUNT: &str = "failure_count";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Input tokens consumed.
pub const TOKENS_IN: &str = "tokens_in";

/// Output tokens produced.
pub const TOKENS_OUT: &str = "tokens_out";

/// Cost of the call in USD.
pub const COST_USD: &str = "cost_usd";

/// Number of input texts sent to an embedding model.
pub const INPUT_COUNT: &str = "input_count";

/// Number of results returned by a ranking or nearest-neighbor query.
pub const RESULT_COUNT: &str = "result_count";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
