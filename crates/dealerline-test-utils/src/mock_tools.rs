// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tools with predictable behaviour.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use dealerline_core::DealerlineError;
use dealerline_core::traits::{Tool, ToolContext, ToolOutput};

/// Returns its arguments as the tool output and counts invocations.
pub struct EchoTool {
    name: String,
    invocations: AtomicUsize,
}

impl EchoTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Echoes its arguments"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }

    async fn invoke(
        &self,
        _ctx: &ToolContext,
        args: serde_json::Value,
    ) -> Result<ToolOutput, DealerlineError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(ToolOutput::ok(args.to_string()))
    }
}

/// Always fails with a tool error.
pub struct FailingTool {
    name: String,
}

impl FailingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }

    async fn invoke(
        &self,
        _ctx: &ToolContext,
        _args: serde_json::Value,
    ) -> Result<ToolOutput, DealerlineError> {
        Err(DealerlineError::Tool {
            name: self.name.clone(),
            message: "inventory service unreachable".into(),
        })
    }
}
