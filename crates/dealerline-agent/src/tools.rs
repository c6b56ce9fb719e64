// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool registry and the built-in dealership tools.
//!
//! The [`ToolRegistry`] manages tool lookup by name, generates
//! Anthropic-format tool definitions for the agent, and runs invocations
//! under a timeout. Invocation never fails the reply cycle: unknown tools,
//! tool errors and timeouts all come back as error [`ToolOutput`]s the agent
//! can react to.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use dealerline_core::types::{Attribution, LeadSubmission, normalize_phone};
use dealerline_core::{DealerlineError, StorageAdapter, Tool, ToolContext, ToolOutput};

use crate::qualifier::LeadService;

/// Registry of available tools, indexed by name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            timeout,
        }
    }

    /// Registry with `capture_lead` and `schedule_visit` over `storage`.
    pub fn with_builtins(storage: Arc<dyn StorageAdapter>, timeout: Duration) -> Self {
        let mut registry = Self::new(timeout);
        registry.register(Arc::new(CaptureLeadTool::new(Arc::clone(&storage))));
        registry.register(Arc::new(ScheduleVisitTool::new(storage)));
        registry
    }

    /// Registers a tool under its `name()`, replacing any previous one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Sorted tool names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Anthropic-format definitions (`name`, `description`, `input_schema`), sorted by name.
    pub fn tool_definitions(&self) -> Vec<serde_json::Value> {
        let mut defs: Vec<serde_json::Value> = self
            .tools
            .values()
            .map(|t| {
                serde_json::json!({
                    "name": t.name(),
                    "description": t.description(),
                    "input_schema": t.parameters_schema(),
                })
            })
            .collect();
        defs.sort_by(|a, b| {
            a["name"]
                .as_str()
                .unwrap_or("")
                .cmp(b["name"].as_str().unwrap_or(""))
        });
        defs
    }

    /// Runs tool `name`. Every failure is folded into an error output.
    pub async fn invoke(
        &self,
        name: &str,
        ctx: &ToolContext,
        args: serde_json::Value,
    ) -> ToolOutput {
        let output = match self.tools.get(name) {
            None => {
                warn!(tool = name, "agent requested an unknown tool");
                ToolOutput::error(format!("unknown tool: {name}"))
            }
            Some(tool) => match tokio::time::timeout(self.timeout, tool.invoke(ctx, args)).await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    warn!(tool = name, error = %e, "tool invocation failed");
                    ToolOutput::error(e.to_string())
                }
                Err(_) => {
                    warn!(
                        tool = name,
                        timeout_secs = self.timeout.as_secs(),
                        "tool invocation timed out"
                    );
                    ToolOutput::error(
                        DealerlineError::Timeout {
                            duration: self.timeout,
                        }
                        .to_string(),
                    )
                }
            },
        };

        dealerline_prometheus::record_tool_invocation(name, output.is_error);
        debug!(tool = name, is_error = output.is_error, "tool invocation finished");
        output
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// --- capture_lead ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CaptureLeadArgs {
    name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    interest: Option<String>,
    source: Option<String>,
}

/// Qualifies and upserts a lead from the conversation, then links it.
pub struct CaptureLeadTool {
    storage: Arc<dyn StorageAdapter>,
    leads: LeadService,
}

impl CaptureLeadTool {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            leads: LeadService::new(Arc::clone(&storage)),
            storage,
        }
    }
}

#[async_trait]
impl Tool for CaptureLeadTool {
    fn name(&self) -> &str {
        "capture_lead"
    }

    fn description(&self) -> &str {
        "Record the customer's contact details and vehicle interest as a sales lead. \
         Call once the customer shares a name, e-mail or the vehicle they want."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Customer name" },
                "phone": { "type": "string", "description": "Phone number; defaults to the WhatsApp sender" },
                "email": { "type": "string", "description": "E-mail address" },
                "interest": { "type": "string", "description": "Vehicle or service of interest" },
                "source": { "type": "string", "description": "How the customer found the dealership" }
            }
        })
    }

    async fn invoke(
        &self,
        ctx: &ToolContext,
        args: serde_json::Value,
    ) -> Result<ToolOutput, DealerlineError> {
        let args: CaptureLeadArgs =
            serde_json::from_value(args).map_err(|e| DealerlineError::Tool {
                name: self.name().to_string(),
                message: format!("invalid arguments: {e}"),
            })?;

        let phone = args
            .phone
            .filter(|p| !normalize_phone(p).is_empty())
            .or_else(|| Some(ctx.sender.clone()));

        let lead = self
            .leads
            .upsert(LeadSubmission {
                name: args.name,
                phone,
                email: args.email,
                interest: args.interest,
                attribution: Attribution {
                    source: args.source,
                    ..Attribution::default()
                },
            })
            .await?;

        if let Err(e) = self.storage.link_lead(&ctx.conversation_id, &lead.id).await {
            warn!(
                conversation_id = ctx.conversation_id.as_str(),
                lead_id = lead.id.as_str(),
                error = %e,
                "failed to link lead to conversation"
            );
        }

        let body = serde_json::json!({
            "lead_id": lead.id,
            "score": lead.score,
            "priority": lead.priority.to_string(),
        });
        Ok(ToolOutput::ok(body.to_string()))
    }
}

// --- schedule_visit ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScheduleVisitArgs {
    preferred_date: Option<String>,
    vehicle: Option<String>,
}

/// Flags the conversation as having produced a showroom appointment.
pub struct ScheduleVisitTool {
    storage: Arc<dyn StorageAdapter>,
}

impl ScheduleVisitTool {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl Tool for ScheduleVisitTool {
    fn name(&self) -> &str {
        "schedule_visit"
    }

    fn description(&self) -> &str {
        "Register that the customer agreed to visit the showroom or book a test drive."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "preferred_date": { "type": "string", "description": "Date and time the customer proposed" },
                "vehicle": { "type": "string", "description": "Vehicle to prepare for the visit" }
            }
        })
    }

    async fn invoke(
        &self,
        ctx: &ToolContext,
        args: serde_json::Value,
    ) -> Result<ToolOutput, DealerlineError> {
        let args: ScheduleVisitArgs =
            serde_json::from_value(args).map_err(|e| DealerlineError::Tool {
                name: self.name().to_string(),
                message: format!("invalid arguments: {e}"),
            })?;

        self.storage.mark_appointment(&ctx.conversation_id).await?;

        let body = serde_json::json!({
            "scheduled": true,
            "preferred_date": args.preferred_date,
            "vehicle": args.vehicle,
        });
        Ok(ToolOutput::ok(body.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dealerline_core::types::{Conversation, Priority};
    use dealerline_test_utils::{EchoTool, FailingTool, MemoryStorage};

    fn ctx(conversation_id: &str) -> ToolContext {
        ToolContext {
            conversation_id: conversation_id.to_string(),
            sender: "whatsapp:+5585999999999".to_string(),
        }
    }

    async fn storage_with_conversation() -> (Arc<MemoryStorage>, String) {
        let storage = Arc::new(MemoryStorage::new());
        let conversation = Conversation::start("whatsapp:+5585999999999", Utc::now());
        storage.create_conversation(&conversation).await.unwrap();
        (storage, conversation.id)
    }

    #[tokio::test]
    async fn definitions_are_sorted_and_anthropic_shaped() {
        let registry =
            ToolRegistry::with_builtins(Arc::new(MemoryStorage::new()), Duration::from_secs(1));
        let defs = registry.tool_definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0]["name"], "capture_lead");
        assert_eq!(defs[1]["name"], "schedule_visit");
        assert!(defs[0]["input_schema"]["properties"]["phone"].is_object());
        assert_eq!(registry.names(), vec!["capture_lead", "schedule_visit"]);
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_output() {
        let registry = ToolRegistry::new(Duration::from_secs(1));
        let out = registry
            .invoke("nope", &ctx("c-1"), serde_json::json!({}))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("nope"));
    }

    #[tokio::test]
    async fn tool_errors_are_folded_into_output() {
        let mut registry = ToolRegistry::new(Duration::from_secs(1));
        registry.register(Arc::new(FailingTool::new("broken")));
        let out = registry
            .invoke("broken", &ctx("c-1"), serde_json::json!({}))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("broken"));
    }

    #[tokio::test]
    async fn echo_tool_passes_through() {
        let echo = Arc::new(EchoTool::new("echo"));
        let mut registry = ToolRegistry::new(Duration::from_secs(1));
        registry.register(echo.clone());
        let out = registry
            .invoke("echo", &ctx("c-1"), serde_json::json!({"x": 1}))
            .await;
        assert!(!out.is_error);
        assert_eq!(echo.invocations(), 1);
    }

    #[tokio::test]
    async fn capture_lead_defaults_phone_to_sender_and_links() {
        let (storage, conversation_id) = storage_with_conversation().await;
        let registry = ToolRegistry::with_builtins(storage.clone(), Duration::from_secs(1));

        let out = registry
            .invoke(
                "capture_lead",
                &ctx(&conversation_id),
                serde_json::json!({"name": "Ana", "email": "ana@example.com", "interest": "SUV"}),
            )
            .await;
        assert!(!out.is_error, "{}", out.content);

        let body: serde_json::Value = serde_json::from_str(&out.content).unwrap();
        assert_eq!(body["score"], 90);
        assert_eq!(body["priority"], Priority::Hot.to_string());

        let lead = storage
            .find_lead_by_phone("5585999999999")
            .await
            .unwrap()
            .unwrap();
        let conversation = storage
            .get_conversation(&conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.lead_id.as_deref(), Some(lead.id.as_str()));
    }

    #[tokio::test]
    async fn capture_lead_rejects_malformed_args() {
        let (storage, conversation_id) = storage_with_conversation().await;
        let registry = ToolRegistry::with_builtins(storage, Duration::from_secs(1));
        let out = registry
            .invoke(
                "capture_lead",
                &ctx(&conversation_id),
                serde_json::json!({"name": 42}),
            )
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("invalid arguments"));
    }

    #[tokio::test]
    async fn schedule_visit_marks_appointment() {
        let (storage, conversation_id) = storage_with_conversation().await;
        let registry = ToolRegistry::with_builtins(storage.clone(), Duration::from_secs(1));

        let out = registry
            .invoke(
                "schedule_visit",
                &ctx(&conversation_id),
                serde_json::json!({"preferred_date": "sábado 10h"}),
            )
            .await;
        assert!(!out.is_error);

        let conversation = storage
            .get_conversation(&conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert!(conversation.resulted_in_appointment);
    }

    #[tokio::test]
    async fn schedule_visit_on_missing_conversation_is_an_error() {
        let registry =
            ToolRegistry::with_builtins(Arc::new(MemoryStorage::new()), Duration::from_secs(1));
        let out = registry
            .invoke("schedule_visit", &ctx("missing"), serde_json::json!({}))
            .await;
        assert!(out.is_error);
    }
}
