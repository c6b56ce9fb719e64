// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reply agent trait (the language-model capability).

use async_trait::async_trait;

use crate::error::DealerlineError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{AgentReply, HistoryEntry};

/// Generates a reply, optionally requesting a named tool, from a message history.
#[async_trait]
pub trait AgentAdapter: PluginAdapter {
    /// One model call. Returns either terminal text or a single tool request.
    async fn generate_reply(&self, history: &[HistoryEntry])
    -> Result<AgentReply, DealerlineError>;
}
