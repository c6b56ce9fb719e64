// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use serde::{Deserialize, Serialize};

/// Top-level Dealerline configuration. Every section defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DealerlineConfig {
    /// Reply behaviour: prompts, fallbacks, tool loop limits.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Anthropic Messages API settings.
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// WhatsApp provider (Twilio) credentials and dispatch target.
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Circuit breaker tuning.
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Delivery lock retention and ledger settings.
    #[serde(default)]
    pub dedup: DedupConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub prometheus: PrometheusConfig,

    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

/// Reply behaviour configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in logs and health output.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Inline system prompt. Overridden by `system_prompt_file` if both set.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Path to a file containing the system prompt.
    #[serde(default)]
    pub system_prompt_file: Option<String>,

    /// Sent when the agent is unavailable or the cycle cannot complete.
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,

    /// Sent when the tool loop hits its ceiling with no partial text.
    #[serde(default = "default_ceiling_message")]
    pub ceiling_message: String,

    /// Number of most recent turns handed to the agent.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Maximum tool invocations per reply cycle.
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,

    /// Timeout for one agent call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Timeout for one tool invocation.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            system_prompt: None,
            system_prompt_file: None,
            fallback_message: default_fallback_message(),
            ceiling_message: default_ceiling_message(),
            history_window: default_history_window(),
            max_tool_iterations: default_max_tool_iterations(),
            request_timeout_secs: default_request_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_agent_name() -> String {
    "dealerline".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_fallback_message() -> String {
    "Desculpe, estamos com uma instabilidade no momento. Um consultor vai te responder em breve!"
        .to_string()
}

fn default_ceiling_message() -> String {
    "Anotei tudo! Um consultor vai continuar o atendimento com você em instantes.".to_string()
}

fn default_history_window() -> usize {
    10
}

fn default_max_tool_iterations() -> usize {
    3
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_tool_timeout_secs() -> u64 {
    10
}

/// Anthropic API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicConfig {
    /// API key. `None` falls back to the `ANTHROPIC_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Output length bound per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Kept low for consistent answers.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            api_version: default_api_version(),
            base_url: default_anthropic_base_url(),
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    500
}

fn default_temperature() -> f32 {
    0.3
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

/// WhatsApp provider configuration (Twilio-compatible API).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsAppConfig {
    /// Provider account identifier.
    #[serde(default)]
    pub account_sid: Option<String>,

    /// Provider auth token; signs webhooks and authenticates dispatch.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Outbound sender address, e.g. `whatsapp:+14155238886`.
    #[serde(default)]
    pub from_number: Option<String>,

    /// Public URL the provider posts webhooks to; part of the signed payload.
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_whatsapp_api_base_url")]
    pub api_base_url: String,

    /// Reject webhooks whose `X-Twilio-Signature` does not verify.
    #[serde(default = "default_true")]
    pub validate_signatures: bool,

    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from_number: None,
            webhook_url: None,
            api_base_url: default_whatsapp_api_base_url(),
            validate_signatures: true,
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

fn default_whatsapp_api_base_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_send_timeout_secs() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// Timeout for a single store operation.
    #[serde(default = "default_op_timeout_secs")]
    pub op_timeout_secs: u64,

    /// Attempts for persisting an assistant turn before giving up.
    #[serde(default = "default_assistant_write_attempts")]
    pub assistant_write_attempts: u32,

    /// Base backoff between assistant-turn attempts; doubles each retry.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
            op_timeout_secs: default_op_timeout_secs(),
            assistant_write_attempts: default_assistant_write_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("dealerline").join("dealerline.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("dealerline.db"))
        .display()
        .to_string()
}

fn default_op_timeout_secs() -> u64 {
    5
}

fn default_assistant_write_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

/// Circuit breaker defaults applied to every named service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResilienceConfig {
    /// Consecutive failures that open a circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds an open circuit waits after its last failure before allowing a trial.
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,

    /// Trial calls allowed while half-open; that many successes close the circuit.
    #[serde(default = "default_half_open_max_trials")]
    pub half_open_max_trials: u32,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
            half_open_max_trials: default_half_open_max_trials(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_reset_timeout_secs() -> u64 {
    30
}

fn default_half_open_max_trials() -> u32 {
    1
}

/// Delivery lock configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DedupConfig {
    /// How long a claimed message id is remembered. Must cover the provider's retry window.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Back the in-memory claims with the database ledger so they survive restarts.
    #[serde(default = "default_true")]
    pub durable: bool,

    /// Timeout for a ledger claim; on expiry the delivery is processed anyway.
    #[serde(default = "default_ledger_timeout_ms")]
    pub ledger_timeout_ms: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            durable: true,
            ledger_timeout_ms: default_ledger_timeout_ms(),
        }
    }
}

fn default_retention_secs() -> u64 {
    24 * 60 * 60
}

fn default_ledger_timeout_ms() -> u64 {
    500
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token for `/v1` routes. `None` rejects every `/v1` request.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ShutdownConfig {
    /// How long in-flight reply cycles may run after a shutdown signal.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

fn default_drain_timeout_secs() -> u64 {
    30
}
