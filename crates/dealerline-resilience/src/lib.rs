// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Circuit breakers guarding calls to external services.
//!
//! A [`CircuitBreakerRegistry`] is built once at startup and shared by every
//! caller, so one failing dependency throttles all of them. Breakers are
//! created lazily per service name.

pub mod breaker;
pub mod registry;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitError, CircuitState};
pub use registry::{BreakerSnapshot, CircuitBreakerRegistry};
