// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Claude reply agent for Dealerline.
//!
//! Implements [`AgentAdapter`] over the Messages API: the conversation
//! history is mapped to alternating user/assistant messages with
//! `tool_use`/`tool_result` blocks, and the response is reduced to a single
//! [`AgentReply`].

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use dealerline_config::model::DealerlineConfig;
use dealerline_core::DealerlineError;
use dealerline_core::traits::{AgentAdapter, PluginAdapter};
use dealerline_core::types::{AdapterType, AgentReply, HealthStatus, HistoryEntry};

use crate::client::AnthropicClient;
use crate::types::{
    ApiContent, ApiContentBlock, ApiMessage, MessageRequest, MessageResponse,
    ResponseContentBlock, ToolDefinition,
};

/// Reply agent backed by the Anthropic Messages API.
pub struct AnthropicAgent {
    client: AnthropicClient,
    model: String,
    max_tokens: u32,
    temperature: f32,
    system_prompt: String,
    tools: Vec<ToolDefinition>,
}

impl AnthropicAgent {
    /// Builds the agent from configuration.
    ///
    /// `tool_definitions` are Anthropic-format JSON values, usually from the
    /// tool registry. Malformed entries are skipped with a warning.
    pub async fn new(
        config: &DealerlineConfig,
        tool_definitions: Vec<serde_json::Value>,
    ) -> Result<Self, DealerlineError> {
        let api_key = resolve_api_key(&config.anthropic.api_key)?;
        let system_prompt = load_system_prompt(
            &config.agent.name,
            &config.agent.system_prompt,
            &config.agent.system_prompt_file,
        )
        .await;

        let client = AnthropicClient::new(
            &api_key,
            &config.anthropic.api_version,
            &config.anthropic.base_url,
            Duration::from_secs(config.agent.request_timeout_secs),
        )?;

        let tools = parse_tool_definitions(tool_definitions);
        info!(
            model = config.anthropic.model.as_str(),
            tools = tools.len(),
            "Anthropic agent initialized"
        );

        Ok(Self {
            client,
            model: config.anthropic.model.clone(),
            max_tokens: config.anthropic.max_tokens,
            temperature: config.anthropic.temperature,
            system_prompt,
            tools,
        })
    }

    fn to_message_request(&self, history: &[HistoryEntry]) -> MessageRequest {
        MessageRequest {
            model: self.model.clone(),
            messages: history_to_messages(history),
            system: Some(self.system_prompt.clone()),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            tools: self.tools.clone(),
        }
    }
}

#[async_trait]
impl PluginAdapter for AnthropicAgent {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Agent
    }

    async fn health_check(&self) -> Result<HealthStatus, DealerlineError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl AgentAdapter for AnthropicAgent {
    async fn generate_reply(
        &self,
        history: &[HistoryEntry],
    ) -> Result<AgentReply, DealerlineError> {
        let request = self.to_message_request(history);
        if request.messages.is_empty() {
            return Err(DealerlineError::Agent {
                message: "history has no user message".into(),
                source: None,
            });
        }

        let response = self.client.complete_message(&request).await?;
        debug!(
            message_id = response.id.as_str(),
            model = response.model.as_str(),
            stop_reason = response.stop_reason.as_deref().unwrap_or("none"),
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "agent reply received"
        );
        Ok(response_to_reply(response))
    }
}

fn parse_tool_definitions(values: Vec<serde_json::Value>) -> Vec<ToolDefinition> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<ToolDefinition>(value) {
            Ok(def) => Some(def),
            Err(e) => {
                warn!(error = %e, "skipping malformed tool definition");
                None
            }
        })
        .collect()
}

/// Maps history to Messages API turns.
///
/// Consecutive entries with the same role merge into one message, and the
/// list starts at the first user entry since the API rejects a leading
/// assistant turn.
fn history_to_messages(history: &[HistoryEntry]) -> Vec<ApiMessage> {
    let mut grouped: Vec<(&'static str, Vec<ApiContentBlock>)> = Vec::new();

    for entry in history {
        let (role, blocks) = match entry {
            HistoryEntry::User { content } => (
                "user",
                vec![ApiContentBlock::Text {
                    text: content.clone(),
                }],
            ),
            HistoryEntry::Assistant { content } => (
                "assistant",
                vec![ApiContentBlock::Text {
                    text: content.clone(),
                }],
            ),
            HistoryEntry::ToolCall {
                id,
                name,
                args,
                text,
            } => {
                let mut blocks = Vec::with_capacity(2);
                if let Some(text) = text.as_ref().filter(|t| !t.trim().is_empty()) {
                    blocks.push(ApiContentBlock::Text { text: text.clone() });
                }
                blocks.push(ApiContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: args.clone(),
                });
                ("assistant", blocks)
            }
            HistoryEntry::ToolResult {
                id,
                content,
                is_error,
                ..
            } => (
                "user",
                vec![ApiContentBlock::ToolResult {
                    tool_use_id: id.clone(),
                    content: content.clone(),
                    is_error: is_error.then_some(true),
                }],
            ),
        };

        if grouped.is_empty() && role != "user" {
            continue;
        }
        match grouped.last_mut() {
            Some((last_role, last_blocks)) if *last_role == role => last_blocks.extend(blocks),
            _ => grouped.push((role, blocks)),
        }
    }

    grouped
        .into_iter()
        .map(|(role, mut blocks)| {
            let content = match blocks.as_slice() {
                [ApiContentBlock::Text { .. }] => match blocks.remove(0) {
                    ApiContentBlock::Text { text } => ApiContent::Text(text),
                    other => ApiContent::Blocks(vec![other]),
                },
                _ => ApiContent::Blocks(blocks),
            };
            ApiMessage {
                role: role.to_string(),
                content,
            }
        })
        .collect()
}

/// Reduces a response to one reply: the first `tool_use` wins, with any text
/// emitted before it kept as preamble.
fn response_to_reply(response: MessageResponse) -> AgentReply {
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_use = None;

    for block in response.content {
        match block {
            ResponseContentBlock::Text { text } => text_parts.push(text),
            ResponseContentBlock::ToolUse { id, name, input } if tool_use.is_none() => {
                tool_use = Some((id, name, input));
            }
            ResponseContentBlock::ToolUse { name, .. } => {
                debug!(tool = name.as_str(), "ignoring additional tool_use block");
            }
            ResponseContentBlock::Unsupported => {}
        }
    }

    let text = text_parts.join("\n").trim().to_string();
    match tool_use {
        Some((id, name, args)) => AgentReply::ToolCall {
            id,
            name,
            args,
            text: (!text.is_empty()).then_some(text),
        },
        None => AgentReply::Terminal { text },
    }
}

fn resolve_api_key(config_key: &Option<String>) -> Result<String, DealerlineError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(key.clone());
    }

    std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
        DealerlineError::Config(
            "Anthropic API key not found. Set anthropic.api_key in config or ANTHROPIC_API_KEY environment variable.".into(),
        )
    })
}

/// Loads the system prompt following priority: file > inline > default.
async fn load_system_prompt(
    agent_name: &str,
    inline_prompt: &Option<String>,
    prompt_file: &Option<String>,
) -> String {
    if let Some(file_path) = prompt_file {
        match tokio::fs::read_to_string(file_path).await {
            Ok(content) => {
                let trimmed = content.trim().to_string();
                if !trimmed.is_empty() {
                    info!(path = file_path.as_str(), "loaded system prompt from file");
                    return trimmed;
                }
            }
            Err(e) => {
                warn!(
                    path = file_path.as_str(),
                    error = %e,
                    "failed to read system prompt file, falling back"
                );
            }
        }
    }

    if let Some(prompt) = inline_prompt
        && !prompt.is_empty()
    {
        return prompt.clone();
    }

    format!(
        "Você é {agent_name}, assistente de vendas de uma concessionária de veículos. \
         Responda em português, de forma breve e cordial."
    )
}
