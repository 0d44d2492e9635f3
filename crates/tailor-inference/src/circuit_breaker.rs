//! Per-model circuit breakers.
//!
//! Each model id gets its own breaker, created on first touch. Consecutive
//! failures open the circuit; after a cool-down the circuit goes half-open
//! and admits exactly one trial call, whose outcome closes or re-opens it.
//!
//! All state lives behind one mutex so concurrent failure reports are never
//! lost and the threshold check sees every increment.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tailor_core::defaults;

/// Circuit breaker state for a single model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Healthy, requests allowed.
    Closed,
    /// Tripped, requests routed to the fallback until the cool-down expires.
    Open,
    /// Cool-down expired, one trial request allowed.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Time an open circuit waits before allowing a trial.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::BREAKER_FAILURE_THRESHOLD,
            cooldown: Duration::from_secs(defaults::BREAKER_COOLDOWN_SECS),
        }
    }
}

#[derive(Debug, Clone)]
struct ModelBreaker {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl ModelBreaker {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            opened_at: None,
            trial_in_flight: false,
        }
    }

    /// State with the open-to-half-open transition applied for `now`.
    fn effective_state(&self, cooldown: Duration, now: Instant) -> CircuitState {
        match (self.state, self.opened_at) {
            (CircuitState::Open, Some(at)) if now.saturating_duration_since(at) >= cooldown => {
                CircuitState::HalfOpen
            }
            (state, _) => state,
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.trial_in_flight = false;
    }
}

/// Point-in-time view of one model's breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub model_id: String,
    pub state: CircuitState,
    pub failure_count: u32,
    /// Time since the circuit opened, if it is open or half-open.
    pub open_for_ms: Option<u64>,
    pub trial_in_flight: bool,
}

/// Registry of per-model circuit breakers.
#[derive(Debug)]
pub struct CircuitBreakers {
    config: BreakerConfig,
    breakers: Mutex<HashMap<String, ModelBreaker>>,
}

impl CircuitBreakers {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> BreakerConfig {
        self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ModelBreaker>> {
        self.breakers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a successful call; resets the count and closes the circuit.
    pub fn record_success(&self, model_id: &str) {
        let mut breakers = self.lock();
        let breaker = breakers
            .entry(model_id.to_string())
            .or_insert_with(ModelBreaker::new);

        if breaker.state != CircuitState::Closed {
            info!(
                subsystem = "breaker",
                model = model_id,
                breaker_state = %CircuitState::Closed,
                "Circuit closed after successful call"
            );
        }
        *breaker = ModelBreaker::new();
    }

    /// Record a failed call. Returns the resulting state.
    pub fn record_failure(&self, model_id: &str) -> CircuitState {
        let now = Instant::now();
        let threshold = self.config.failure_threshold;
        let mut breakers = self.lock();
        let breaker = breakers
            .entry(model_id.to_string())
            .or_insert_with(ModelBreaker::new);

        breaker.failure_count = breaker.failure_count.saturating_add(1);

        match breaker.effective_state(self.config.cooldown, now) {
            CircuitState::HalfOpen => {
                breaker.open(now);
                warn!(
                    subsystem = "breaker",
                    model = model_id,
                    breaker_state = %CircuitState::Open,
                    failure_count = breaker.failure_count,
                    "Trial call failed, circuit re-opened"
                );
            }
            CircuitState::Closed if breaker.failure_count >= threshold => {
                breaker.open(now);
                warn!(
                    subsystem = "breaker",
                    model = model_id,
                    breaker_state = %CircuitState::Open,
                    failure_count = breaker.failure_count,
                    threshold,
                    "Circuit opened"
                );
            }
            state => {
                debug!(
                    subsystem = "breaker",
                    model = model_id,
                    breaker_state = %state,
                    failure_count = breaker.failure_count,
                    "Failure recorded"
                );
            }
        }
        breaker.state
    }

    /// Whether calls to `model_id` must go to the fallback: the circuit is
    /// open and the cool-down has not elapsed.
    pub fn should_route_to_fallback(&self, model_id: &str) -> bool {
        self.state(model_id) == CircuitState::Open
    }

    /// Current state of `model_id`. Unknown models are closed.
    pub fn state(&self, model_id: &str) -> CircuitState {
        let now = Instant::now();
        self.lock()
            .get(model_id)
            .map(|b| b.effective_state(self.config.cooldown, now))
            .unwrap_or(CircuitState::Closed)
    }

    /// Consecutive failures recorded for `model_id`.
    pub fn failure_count(&self, model_id: &str) -> u32 {
        self.lock()
            .get(model_id)
            .map(|b| b.failure_count)
            .unwrap_or(0)
    }

    /// Ask permission to call `model_id`.
    ///
    /// Closed circuits always admit. A half-open circuit admits one trial and
    /// rejects everyone else until that trial reports back.
    pub fn try_acquire(&self, model_id: &str) -> bool {
        let now = Instant::now();
        let mut breakers = self.lock();
        let Some(breaker) = breakers.get_mut(model_id) else {
            return true;
        };

        match breaker.effective_state(self.config.cooldown, now) {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                breaker.state = CircuitState::HalfOpen;
                if breaker.trial_in_flight {
                    false
                } else {
                    breaker.trial_in_flight = true;
                    debug!(
                        subsystem = "breaker",
                        model = model_id,
                        breaker_state = %CircuitState::HalfOpen,
                        "Trial call admitted"
                    );
                    true
                }
            }
        }
    }

    /// Like [`try_acquire`](Self::try_acquire), but returns a guard that
    /// must report the call's outcome.
    pub fn acquire(&self, model_id: &str) -> Option<Admission<'_>> {
        self.try_acquire(model_id).then(|| Admission {
            breakers: self,
            model_id: model_id.to_string(),
            reported: false,
        })
    }

    /// Give back a trial slot whose call ended without a verdict on the
    /// model's health (e.g. an authentication error).
    pub fn release(&self, model_id: &str) {
        if let Some(breaker) = self.lock().get_mut(model_id) {
            breaker.trial_in_flight = false;
        }
    }

    /// Snapshot of every breaker touched so far, sorted by model id.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let now = Instant::now();
        let mut out: Vec<BreakerSnapshot> = self
            .lock()
            .iter()
            .map(|(id, b)| BreakerSnapshot {
                model_id: id.clone(),
                state: b.effective_state(self.config.cooldown, now),
                failure_count: b.failure_count,
                open_for_ms: b
                    .opened_at
                    .map(|at| now.saturating_duration_since(at).as_millis() as u64),
                trial_in_flight: b.trial_in_flight,
            })
            .collect();
        out.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        out
    }
}

impl Default for CircuitBreakers {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

/// Permission to call one model, obtained from [`CircuitBreakers::acquire`].
///
/// Dropping an admission without reporting an outcome counts as a failure,
/// so a cancelled half-open trial re-opens the circuit instead of holding
/// the trial slot forever.
#[derive(Debug)]
#[must_use = "an unreported admission counts as a failure when dropped"]
pub struct Admission<'a> {
    breakers: &'a CircuitBreakers,
    model_id: String,
    reported: bool,
}

impl Admission<'_> {
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn success(mut self) {
        self.reported = true;
        self.breakers.record_success(&self.model_id);
    }

    pub fn failure(mut self) -> CircuitState {
        self.reported = true;
        self.breakers.record_failure(&self.model_id)
    }

    /// End the call without a verdict on the model's health.
    pub fn release(mut self) {
        self.reported = true;
        self.breakers.release(&self.model_id);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.reported {
            return;
        }
        warn!(
            subsystem = "breaker",
            model = %self.model_id,
            "Call abandoned before reporting an outcome, counting as failure"
        );
        self.breakers.record_failure(&self.model_id);
    }
}
