// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-service circuit breaker.
//!
//! ```text
//! Closed --(failure_threshold consecutive failures)--> Open
//! Open --(reset_timeout since last failure)--> HalfOpen
//! HalfOpen --(half_open_max_trials successes)--> Closed
//! HalfOpen --(any trial failure)--> Open
//! ```
//!
//! The Open -> HalfOpen transition happens lazily on the next call. Every
//! transition bumps an epoch; outcomes reported under a stale epoch are
//! dropped so a slow call that started before a transition cannot corrupt
//! the counters of the new state.

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dealerline_config::model::ResilienceConfig;
use dealerline_core::DealerlineError;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

/// State of one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding for the state gauge.
    pub fn as_gauge(self) -> f64 {
        match self {
            Self::Closed => 0.0,
            Self::Open => 1.0,
            Self::HalfOpen => 2.0,
        }
    }
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

/// Tuning for one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub half_open_max_trials: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(30),
            half_open_max_trials: 1,
        }
    }
}

impl From<&ResilienceConfig> for CircuitBreakerConfig {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: Duration::from_secs(config.reset_timeout_secs),
            half_open_max_trials: config.half_open_max_trials.max(1),
        }
    }
}

/// Error returned by a guarded call.
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// Rejected without invoking the operation.
    #[error("circuit open for `{service}`, retry after {retry_after:?}")]
    Open {
        service: String,
        retry_after: Duration,
    },

    /// The operation ran and failed.
    #[error(transparent)]
    Inner(E),
}

impl From<CircuitError<DealerlineError>> for DealerlineError {
    fn from(err: CircuitError<DealerlineError>) -> Self {
        match err {
            CircuitError::Open {
                service,
                retry_after,
            } => DealerlineError::CircuitOpen {
                service,
                retry_after,
            },
            CircuitError::Inner(inner) => inner,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    trials_in_flight: u32,
    trial_successes: u32,
    epoch: u64,
}

#[derive(Debug, Clone, Copy)]
struct Admission {
    trial: bool,
    epoch: u64,
}

/// A breaker for one named service. Safe to share across tasks.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                trials_in_flight: 0,
                trial_successes: 0,
                epoch: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Current state as a caller would observe it: an open breaker whose
    /// timeout has elapsed reports `HalfOpen`.
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        match inner.state {
            CircuitState::Open if self.open_remaining(&inner).is_zero() => CircuitState::HalfOpen,
            state => state,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Time left before an open breaker admits a trial, if it is open.
    pub fn retry_after(&self) -> Option<Duration> {
        let inner = self.lock();
        match inner.state {
            CircuitState::Open => Some(self.open_remaining(&inner)).filter(|d| !d.is_zero()),
            _ => None,
        }
    }

    /// Runs `operation` if the breaker admits it, recording the outcome.
    ///
    /// Every `Err` counts as a failure. While open, `operation` is never
    /// called. Dropping the returned future mid-trial counts as a failed trial.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = match self.admit() {
            Ok(admission) => admission,
            Err(retry_after) => {
                dealerline_prometheus::record_circuit_rejection(&self.name);
                return Err(CircuitError::Open {
                    service: self.name.clone(),
                    retry_after,
                });
            }
        };

        let guard = AdmissionGuard {
            breaker: self,
            admission: Some(admission),
        };
        match operation().await {
            Ok(value) => {
                guard.complete(true);
                Ok(value)
            }
            Err(err) => {
                guard.complete(false);
                Err(CircuitError::Inner(err))
            }
        }
    }

    /// Forces the breaker closed and clears its counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        inner.last_failure = None;
        self.transition(&mut inner, CircuitState::Closed);
        info!(service = %self.name, "circuit breaker reset");
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_remaining(&self, inner: &Inner) -> Duration {
        let elapsed = inner
            .last_failure
            .map(|t| Instant::now().saturating_duration_since(t))
            .unwrap_or(self.config.reset_timeout);
        self.config.reset_timeout.saturating_sub(elapsed)
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        inner.state = to;
        inner.trials_in_flight = 0;
        inner.trial_successes = 0;
        inner.epoch += 1;
        dealerline_prometheus::record_circuit_state(&self.name, to.as_gauge());
    }

    fn admit(&self) -> Result<Admission, Duration> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                return Ok(Admission {
                    trial: false,
                    epoch: inner.epoch,
                });
            }
            CircuitState::Open => {
                let remaining = self.open_remaining(&inner);
                if !remaining.is_zero() {
                    return Err(remaining);
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                info!(service = %self.name, "circuit half-open, admitting trial calls");
            }
            CircuitState::HalfOpen => {}
        }

        if inner.trials_in_flight + inner.trial_successes < self.config.half_open_max_trials {
            inner.trials_in_flight += 1;
            Ok(Admission {
                trial: true,
                epoch: inner.epoch,
            })
        } else {
            // Trials already running; if one fails the full timeout restarts.
            Err(self.config.reset_timeout)
        }
    }

    fn record(&self, admission: Admission, success: bool) {
        let mut inner = self.lock();
        if admission.epoch != inner.epoch {
            return;
        }

        match (inner.state, success) {
            (CircuitState::Closed, true) => inner.consecutive_failures = 0,
            (CircuitState::Closed, false) => {
                inner.consecutive_failures += 1;
                inner.last_failure = Some(Instant::now());
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        service = %self.name,
                        failures = inner.consecutive_failures,
                        reset_timeout = ?self.config.reset_timeout,
                        "circuit opened"
                    );
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            (CircuitState::HalfOpen, true) if admission.trial => {
                inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
                inner.trial_successes += 1;
                if inner.trial_successes >= self.config.half_open_max_trials {
                    inner.consecutive_failures = 0;
                    inner.last_failure = None;
                    self.transition(&mut inner, CircuitState::Closed);
                    info!(service = %self.name, "circuit closed after successful trial");
                }
            }
            (CircuitState::HalfOpen, false) if admission.trial => {
                inner.last_failure = Some(Instant::now());
                warn!(service = %self.name, "trial call failed, circuit re-opened");
                self.transition(&mut inner, CircuitState::Open);
            }
            _ => {}
        }
    }

    fn record_cancelled(&self, admission: Admission) {
        if admission.trial {
            self.record(admission, false);
        }
    }
}

/// Reports the outcome exactly once, even if the guarded future is dropped.
struct AdmissionGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Option<Admission>,
}

impl AdmissionGuard<'_> {
    fn complete(mut self, success: bool) {
        if let Some(admission) = self.admission.take() {
            self.breaker.record(admission, success);
        }
    }
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        if let Some(admission) = self.admission.take() {
            self.breaker.record_cancelled(admission);
        }
    }
}
