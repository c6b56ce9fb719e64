// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Dealerline pipeline.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across adapter traits and pipeline stages.
#[derive(Debug, Error)]
pub enum DealerlineError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Outbound channel errors (provider rejected the message, network failure).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Reply agent errors (API failure, malformed response, rate limiting).
    #[error("agent error: {message}")]
    Agent {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A tool invocation failed. Fed back to the agent, never fatal to a cycle.
    #[error("tool `{name}` failed: {message}")]
    Tool { name: String, message: String },

    /// The named service's circuit breaker is open; the call was not attempted.
    #[error("circuit open for `{service}`, retry after {retry_after:?}")]
    CircuitOpen {
        service: String,
        retry_after: Duration,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// An inbound delivery carried neither text nor media.
    #[error("malformed delivery: {0}")]
    MalformedDelivery(String),

    /// Requested record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Request payload failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DealerlineError {
    /// Wraps any error as a storage failure.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(err),
        }
    }

    /// Returns `true` for failures that should count against a circuit breaker.
    ///
    /// Validation and lookup failures are caller mistakes, not signs of an
    /// unhealthy dependency.
    pub fn is_dependency_failure(&self) -> bool {
        !matches!(
            self,
            Self::Validation(_) | Self::NotFound { .. } | Self::MalformedDelivery(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_do_not_trip_breakers() {
        assert!(!DealerlineError::Validation("bad".into()).is_dependency_failure());
        assert!(DealerlineError::Timeout {
            duration: Duration::from_secs(1)
        }
        .is_dependency_failure());
        assert!(DealerlineError::Agent {
            message: "503".into(),
            source: None
        }
        .is_dependency_failure());
    }

    #[test]
    fn storage_helper_boxes_source() {
        let err = DealerlineError::storage(std::io::Error::other("disk full"));
        assert_eq!(err.to_string(), "storage error: disk full");
    }
}
