// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool trait for side-effecting capabilities the agent may request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DealerlineError;

/// Output from a tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// The content returned to the agent (text, JSON, etc.).
    pub content: String,
    /// Whether the invocation failed.
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// The conversation a tool call runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolContext {
    pub conversation_id: String,
    pub sender: String,
}

/// A named capability the agent can invoke mid-reply.
///
/// The orchestrator calls `invoke` with the JSON arguments from the agent's
/// tool request and feeds the output back into the history.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name used for lookup and in the agent's tool definitions.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema describing the tool's arguments.
    fn parameters_schema(&self) -> serde_json::Value;

    async fn invoke(
        &self,
        ctx: &ToolContext,
        args: serde_json::Value,
    ) -> Result<ToolOutput, DealerlineError>;
}
