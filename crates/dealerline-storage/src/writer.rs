// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered persistence of one reply cycle.
//!
//! A cycle writes its user turn, and only after that write has completed,
//! its assistant turn. The assistant turn can only be recorded against a
//! [`RecordedUserTurn`], which exists only once the user write succeeded.
//! Its timestamp is clamped to never precede the user turn's.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dealerline_config::model::StorageConfig;
use dealerline_core::types::{Role, Turn};
use dealerline_core::{DealerlineError, StorageAdapter};
use tracing::{error, warn};

/// Retry policy for assistant-turn writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterConfig {
    /// Total attempts, including the first.
    pub assistant_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub retry_backoff: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            assistant_attempts: 3,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

impl From<&StorageConfig> for WriterConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            assistant_attempts: config.assistant_write_attempts.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// A user turn that has been durably written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUserTurn(Turn);

impl RecordedUserTurn {
    /// Wraps a user turn read back from storage, e.g. one a previous run
    /// recorded but never answered. `None` for assistant turns.
    pub fn from_persisted(turn: Turn) -> Option<Self> {
        (turn.role == Role::User).then_some(Self(turn))
    }

    pub fn turn(&self) -> &Turn {
        &self.0
    }
}

/// Writes the turns of reply cycles in order.
pub struct TurnWriter {
    storage: Arc<dyn StorageAdapter>,
    config: WriterConfig,
}

impl TurnWriter {
    pub fn new(storage: Arc<dyn StorageAdapter>, config: WriterConfig) -> Self {
        Self { storage, config }
    }

    /// Records the customer's message. The conversation is marked as awaiting
    /// a reply when `expects_reply` is set.
    ///
    /// A failure here must abort the cycle before any agent call.
    pub async fn record_user_turn(
        &self,
        conversation_id: &str,
        content: &str,
        expects_reply: bool,
    ) -> Result<RecordedUserTurn, DealerlineError> {
        let turn = Turn::new(conversation_id, Role::User, content, Utc::now());
        if let Err(e) = self.storage.append_turn(&turn, expects_reply).await {
            dealerline_prometheus::record_persistence_failure("user");
            error!(conversation_id, error = %e, "failed to record user turn");
            return Err(e);
        }
        Ok(RecordedUserTurn(turn))
    }

    /// Records the reply paired with `user_turn`, retrying with backoff.
    ///
    /// Returns the last error once every attempt has failed; the caller still
    /// dispatches the reply.
    pub async fn record_assistant_turn(
        &self,
        user_turn: &RecordedUserTurn,
        content: &str,
        tool_name: Option<String>,
    ) -> Result<Turn, DealerlineError> {
        let user = user_turn.turn();
        let created_at = Utc::now().max(user.created_at);
        let turn = Turn::new(&user.conversation_id, Role::Assistant, content, created_at)
            .with_tool(tool_name);

        let attempts = self.config.assistant_attempts.max(1);
        let mut backoff = self.config.retry_backoff;
        let mut attempt = 1;
        loop {
            match self.storage.append_turn(&turn, false).await {
                Ok(()) => return Ok(turn),
                Err(e) if attempt < attempts => {
                    warn!(
                        conversation_id = %user.conversation_id,
                        attempt,
                        error = %e,
                        "assistant turn write failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => {
                    dealerline_prometheus::record_persistence_failure("assistant");
                    error!(
                        conversation_id = %user.conversation_id,
                        attempts,
                        error = %e,
                        "giving up on assistant turn"
                    );
                    return Err(e);
                }
            }
        }
    }
}
