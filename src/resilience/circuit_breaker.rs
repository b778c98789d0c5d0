//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: first read or acquire after reset_timeout
//! Half-Open → Closed: probe request succeeds
//! Half-Open → Open: probe request fails (opened_at refreshed)
//! ```
//!
//! # Design Decisions
//! - Per-service circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Open → Half-Open is evaluated lazily on access; there is no timer task
//! - Single probe in Half-Open (prevents hammering recovering backend)
//! - Outcomes of requests admitted while Closed never move a Half-Open breaker

use std::sync::Mutex;

use serde::Serialize;

use crate::clock::now_millis;
use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitStatus::Closed => "closed",
            CircuitStatus::Open => "open",
            CircuitStatus::HalfOpen => "half_open",
        }
    }
}

/// Snapshot of a breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerState {
    pub service_name: String,
    pub status: CircuitStatus,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<u64>,
    pub opened_at: Option<u64>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitBreakerState,
    trial_in_flight: bool,
}

/// Returned by [`CircuitBreaker::try_acquire`] when the breaker rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitOpen;

#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout_ms: u64,
    count_server_errors: bool,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(service_name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout_ms: config.reset_timeout_ms,
            count_server_errors: config.count_server_errors,
            inner: Mutex::new(Inner {
                state: CircuitBreakerState {
                    service_name: service_name.into(),
                    status: CircuitStatus::Closed,
                    consecutive_failures: 0,
                    last_failure_at: None,
                    opened_at: None,
                },
                trial_in_flight: false,
            }),
        }
    }

    /// Whether a backend response with this status counts as a failure.
    pub fn is_failure_status(&self, status: u16) -> bool {
        self.count_server_errors && (500..600).contains(&status)
    }

    pub fn state(&self) -> CircuitStatus {
        self.state_at(now_millis())
    }

    /// Current status, applying a due Open → Half-Open transition first.
    pub fn state_at(&self, now: u64) -> CircuitStatus {
        let mut inner = self.lock();
        self.maybe_half_open(&mut inner, now);
        inner.state.status
    }

    pub fn snapshot_at(&self, now: u64) -> CircuitBreakerState {
        let mut inner = self.lock();
        self.maybe_half_open(&mut inner, now);
        inner.state.clone()
    }

    pub fn snapshot(&self) -> CircuitBreakerState {
        self.snapshot_at(now_millis())
    }

    pub fn try_acquire(&self) -> Result<BreakerPermit<'_>, CircuitOpen> {
        self.try_acquire_at(now_millis())
    }

    /// Ask to send one request. In Half-Open only one permit is outstanding.
    pub fn try_acquire_at(&self, now: u64) -> Result<BreakerPermit<'_>, CircuitOpen> {
        let mut inner = self.lock();
        self.maybe_half_open(&mut inner, now);

        match inner.state.status {
            CircuitStatus::Closed => Ok(BreakerPermit { breaker: self, trial: false, done: false }),
            CircuitStatus::Open => Err(CircuitOpen),
            CircuitStatus::HalfOpen if inner.trial_in_flight => Err(CircuitOpen),
            CircuitStatus::HalfOpen => {
                inner.trial_in_flight = true;
                tracing::info!(service = %inner.state.service_name, "Circuit half-open, admitting trial request");
                Ok(BreakerPermit { breaker: self, trial: true, done: false })
            }
        }
    }

    fn report_success(&self, trial: bool) {
        let mut inner = self.lock();
        inner.state.consecutive_failures = 0;
        if !trial {
            return;
        }

        inner.trial_in_flight = false;
        if inner.state.status == CircuitStatus::HalfOpen {
            tracing::info!(service = %inner.state.service_name, "Circuit closed");
            inner.state.status = CircuitStatus::Closed;
            inner.state.opened_at = None;
            metrics::record_breaker_state(&inner.state.service_name, CircuitStatus::Closed);
        }
    }

    fn report_failure(&self, trial: bool, now: u64) {
        let mut inner = self.lock();
        inner.state.consecutive_failures = inner.state.consecutive_failures.saturating_add(1);
        inner.state.last_failure_at = Some(now);
        if trial {
            inner.trial_in_flight = false;
        }

        // While Half-Open only the trial's outcome moves the breaker.
        let should_open = match inner.state.status {
            CircuitStatus::HalfOpen => trial,
            CircuitStatus::Closed => inner.state.consecutive_failures >= self.failure_threshold,
            CircuitStatus::Open => false,
        };

        if should_open {
            inner.state.status = CircuitStatus::Open;
            inner.state.opened_at = Some(now);
            tracing::warn!(
                service = %inner.state.service_name,
                failures = inner.state.consecutive_failures,
                reset_timeout_ms = self.reset_timeout_ms,
                "Circuit opened"
            );
            metrics::record_breaker_state(&inner.state.service_name, CircuitStatus::Open);
        }
    }

    fn maybe_half_open(&self, inner: &mut Inner, now: u64) {
        if inner.state.status != CircuitStatus::Open {
            return;
        }
        let opened_at = inner.state.opened_at.unwrap_or(0);
        if now.saturating_sub(opened_at) >= self.reset_timeout_ms {
            inner.state.status = CircuitStatus::HalfOpen;
            metrics::record_breaker_state(&inner.state.service_name, CircuitStatus::HalfOpen);
        }
    }

    fn release_trial(&self) {
        self.lock().trial_in_flight = false;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("circuit breaker mutex poisoned")
    }
}

/// Permission to send one request through a breaker.
///
/// Report the outcome with [`BreakerPermit::success`] or
/// [`BreakerPermit::failure`]. Dropping it unreported (the request was
/// cancelled) frees a Half-Open trial slot without touching the counters.
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    done: bool,
}

impl BreakerPermit<'_> {
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.done = true;
        self.breaker.report_success(self.trial);
    }

    pub fn failure(self) {
        self.failure_at(now_millis());
    }

    pub fn failure_at(mut self, now: u64) {
        self.done = true;
        self.breaker.report_failure(self.trial, now);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.done {
            self.breaker.release_trial();
        }
    }
}
