// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named breakers, created lazily and shared by every caller.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;

use crate::breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitError, CircuitState};

/// Point-in-time view of one breaker, for health output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub service: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    #[serde(with = "retry_after_secs")]
    pub retry_after: Option<Duration>,
}

mod retry_after_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }
}

/// Registry of circuit breakers keyed by service name.
///
/// Built once at startup and injected wherever external calls are made.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    defaults: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerConfig>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        Self {
            defaults,
            overrides: HashMap::new(),
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Uses `config` instead of the defaults for `service`.
    pub fn with_override(mut self, service: &str, config: CircuitBreakerConfig) -> Self {
        self.overrides.insert(service.to_string(), config);
        self
    }

    /// The breaker for `service`, creating it on first use.
    pub fn breaker(&self, service: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service)
        {
            return Arc::clone(existing);
        }

        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        let config = self.overrides.get(service).copied().unwrap_or(self.defaults);
        Arc::clone(
            breakers
                .entry(service.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(service, config))),
        )
    }

    /// Runs `operation` behind the breaker for `service`.
    pub async fn execute<T, E, F, Fut>(
        &self,
        service: &str,
        operation: F,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.breaker(service).call(operation).await
    }

    /// Forces `service` back to closed. Returns `false` if no such breaker exists.
    pub fn reset(&self, service: &str) -> bool {
        let breaker = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service)
            .cloned();
        match breaker {
            Some(b) => {
                b.reset();
                true
            }
            None => false,
        }
    }

    /// Snapshot of every breaker created so far, sorted by name.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<BreakerSnapshot> = breakers
            .values()
            .map(|b| BreakerSnapshot {
                service: b.name().to_string(),
                state: b.state(),
                consecutive_failures: b.consecutive_failures(),
                retry_after: b.retry_after(),
            })
            .collect();
        out.sort_by(|a, b| a.service.cmp(&b.service));
        out
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn breakers_are_isolated_per_service() {
        let registry = CircuitBreakerRegistry::default();
        for _ in 0..3 {
            registry
                .execute("anthropic", || async { Err::<(), _>("down") })
                .await
                .ok();
        }

        let blocked = registry
            .execute("anthropic", || async { Ok::<_, &str>(()) })
            .await;
        assert!(matches!(blocked, Err(CircuitError::Open { .. })));

        let other = registry
            .execute("whatsapp", || async { Ok::<_, &str>(1) })
            .await;
        assert_eq!(other.ok(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn same_breaker_shared_across_lookups() {
        let registry = CircuitBreakerRegistry::default();
        let a = registry.breaker("anthropic");
        let b = registry.breaker("anthropic");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_unknown_service_is_false() {
        let registry = CircuitBreakerRegistry::default();
        assert!(!registry.reset("nope"));
        registry.breaker("anthropic");
        assert!(registry.reset("anthropic"));
    }

    #[tokio::test(start_paused = true)]
    async fn override_applies_to_named_service() {
        let registry = CircuitBreakerRegistry::default().with_override(
            "whatsapp",
            CircuitBreakerConfig {
                failure_threshold: 1,
                ..CircuitBreakerConfig::default()
            },
        );
        registry
            .execute("whatsapp", || async { Err::<(), _>("x") })
            .await
            .ok();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].state, CircuitState::Open);
        assert!(snapshot[0].retry_after.is_some());
    }
}
