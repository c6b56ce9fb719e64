// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted reply agent.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use dealerline_core::DealerlineError;
use dealerline_core::traits::{AgentAdapter, PluginAdapter};
use dealerline_core::types::{AdapterType, AgentReply, HistoryEntry};

type Scripted = Result<AgentReply, String>;

/// Replays queued replies in order. Once the queue is drained it repeats
/// the fallback reply (terminal "mock reply" unless set).
pub struct ScriptedAgent {
    queue: Arc<Mutex<VecDeque<Scripted>>>,
    fallback: Scripted,
    delay: Option<Duration>,
    calls: AtomicUsize,
    histories: Arc<Mutex<Vec<Vec<HistoryEntry>>>>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Ok(AgentReply::Terminal {
                text: "mock reply".to_string(),
            }),
            delay: None,
            calls: AtomicUsize::new(0),
            histories: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Replies `text` on every call.
    pub fn terminal(text: &str) -> Self {
        Self::new().repeating(AgentReply::Terminal {
            text: text.to_string(),
        })
    }

    /// Requests tool `name` on every call, forever.
    pub fn always_tool(name: &str) -> Self {
        Self::new().repeating(tool_call(name, serde_json::json!({}), None))
    }

    /// Fails every call.
    pub fn failing(message: &str) -> Self {
        Self {
            fallback: Err(message.to_string()),
            ..Self::new()
        }
    }

    pub fn repeating(self, reply: AgentReply) -> Self {
        Self {
            fallback: Ok(reply),
            ..self
        }
    }

    /// Sleeps before every reply; pair with paused tokio time.
    pub fn with_delay(self, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..self
        }
    }

    pub async fn push(&self, reply: AgentReply) {
        self.queue.lock().await.push_back(Ok(reply));
    }

    pub async fn push_error(&self, message: &str) {
        self.queue.lock().await.push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Histories received, one per call.
    pub async fn histories(&self) -> Vec<Vec<HistoryEntry>> {
        self.histories.lock().await.clone()
    }
}

impl Default for ScriptedAgent {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorthand for a tool-call reply with a generated id.
pub fn tool_call(name: &str, args: serde_json::Value, text: Option<&str>) -> AgentReply {
    AgentReply::ToolCall {
        id: format!("toolu_{}", uuid::Uuid::new_v4().simple()),
        name: name.to_string(),
        args,
        text: text.map(str::to_string),
    }
}

#[async_trait]
impl PluginAdapter for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted-agent"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Agent
    }
}

#[async_trait]
impl AgentAdapter for ScriptedAgent {
    async fn generate_reply(
        &self,
        history: &[HistoryEntry],
    ) -> Result<AgentReply, DealerlineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.histories.lock().await.push(history.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.queue.lock().await.pop_front();
        let scripted = match next {
            Some(s) => s,
            None => self.fallback.clone(),
        };
        scripted.map_err(|message| DealerlineError::Agent {
            message,
            source: None,
        })
    }
}
