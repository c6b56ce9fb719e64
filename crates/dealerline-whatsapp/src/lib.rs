// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp channel adapter over the Twilio Messages API.
//!
//! Inbound: [`webhook::TwilioWebhook`] parses the provider's form-encoded
//! webhook and [`signature::SignatureValidator`] checks `X-Twilio-Signature`.
//! Outbound: [`TwilioChannel`] implements [`ChannelAdapter`].

pub mod signature;
pub mod webhook;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use dealerline_config::model::WhatsAppConfig;
use dealerline_core::types::{AdapterType, HealthStatus, MessageId, OutboundMessage};
use dealerline_core::{ChannelAdapter, DealerlineError, PluginAdapter};

pub use signature::SignatureValidator;
pub use webhook::{EMPTY_TWIML, TwilioWebhook};

const WHATSAPP_PREFIX: &str = "whatsapp:";

#[derive(Debug, Deserialize)]
struct SendResponse {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

/// Sends replies through `POST /2010-04-01/Accounts/{sid}/Messages.json`.
pub struct TwilioChannel {
    client: reqwest::Client,
    endpoint: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
    timeout: Duration,
}

impl std::fmt::Debug for TwilioChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioChannel")
            .field("endpoint", &self.endpoint)
            .field("from_number", &self.from_number)
            .field("auth_token", &"[REDACTED]")
            .finish()
    }
}

impl TwilioChannel {
    /// Builds the channel. Account SID, auth token and sender number are required.
    pub fn new(config: &WhatsAppConfig) -> Result<Self, DealerlineError> {
        let account_sid = required(&config.account_sid, "whatsapp.account_sid")?;
        let auth_token = required(&config.auth_token, "whatsapp.auth_token")?;
        let from_number = required(&config.from_number, "whatsapp.from_number")?;
        let timeout = Duration::from_secs(config.send_timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DealerlineError::Channel {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/2010-04-01/Accounts/{}/Messages.json",
                config.api_base_url.trim_end_matches('/'),
                account_sid
            ),
            account_sid,
            auth_token,
            from_number: whatsapp_address(&from_number),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn required(value: &Option<String>, key: &str) -> Result<String, DealerlineError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| DealerlineError::Config(format!("{key} is required for the WhatsApp channel")))
}

/// Prefixes a bare E.164 number with `whatsapp:`.
pub fn whatsapp_address(number: &str) -> String {
    let number = number.trim();
    if number.starts_with(WHATSAPP_PREFIX) {
        number.to_string()
    } else {
        format!("{WHATSAPP_PREFIX}{number}")
    }
}

#[async_trait]
impl PluginAdapter for TwilioChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, DealerlineError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ChannelAdapter for TwilioChannel {
    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, DealerlineError> {
        let to = whatsapp_address(&msg.to);
        let form = serde_urlencoded::to_string([
            ("To", to.as_str()),
            ("From", self.from_number.as_str()),
            ("Body", msg.body.as_str()),
        ])
        .map_err(|e| DealerlineError::Channel {
            message: format!("failed to encode message: {e}"),
            source: Some(Box::new(e)),
        })?;

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .header("content-type", "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DealerlineError::Timeout {
                        duration: self.timeout,
                    }
                } else {
                    DealerlineError::Channel {
                        message: format!("message send failed: {e}"),
                        source: Some(Box::new(e)),
                    }
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| DealerlineError::Channel {
            message: format!("failed to read provider response: {e}"),
            source: Some(Box::new(e)),
        })?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ProviderError>(&body) {
                Ok(err) => match err.code {
                    Some(code) => format!("provider rejected message ({code}): {}", err.message),
                    None => format!("provider rejected message: {}", err.message),
                },
                Err(_) => format!("provider returned {status}"),
            };
            return Err(DealerlineError::Channel {
                message,
                source: None,
            });
        }

        let sent: SendResponse =
            serde_json::from_str(&body).map_err(|e| DealerlineError::Channel {
                message: format!("failed to parse provider response: {e}"),
                source: Some(Box::new(e)),
            })?;
        debug!(sid = sent.sid.as_str(), "whatsapp message accepted");
        Ok(MessageId(sent.sid))
    }
}
