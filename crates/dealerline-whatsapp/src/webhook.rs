// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Twilio WhatsApp webhook payload parsing.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use dealerline_core::DealerlineError;
use dealerline_core::types::{InboundDelivery, MediaDescriptor};

/// Empty TwiML document acknowledging a webhook without a synchronous reply.
pub const EMPTY_TWIML: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Response/>"#;

/// Fields of an inbound message webhook. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TwilioWebhook {
    #[serde(default)]
    pub message_sid: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub num_media: Option<String>,
    #[serde(default)]
    pub media_content_type0: Option<String>,
    #[serde(default)]
    pub media_url0: Option<String>,
}

impl TwilioWebhook {
    /// Parses a form-encoded webhook body.
    pub fn from_form(body: &[u8]) -> Result<Self, DealerlineError> {
        serde_urlencoded::from_bytes(body)
            .map_err(|e| DealerlineError::MalformedDelivery(format!("invalid webhook form: {e}")))
    }

    /// Converts into a delivery. `MessageSid` and `From` are required.
    pub fn into_delivery(self, received_at: DateTime<Utc>) -> Result<InboundDelivery, DealerlineError> {
        if self.message_sid.trim().is_empty() {
            return Err(DealerlineError::MalformedDelivery(
                "webhook has no MessageSid".into(),
            ));
        }
        if self.from.trim().is_empty() {
            return Err(DealerlineError::MalformedDelivery(format!(
                "webhook {} has no From",
                self.message_sid
            )));
        }

        let count = self
            .num_media
            .as_deref()
            .and_then(|n| n.trim().parse::<u32>().ok())
            .unwrap_or(0);
        let media = (count > 0).then(|| MediaDescriptor {
            content_type: self.media_content_type0.filter(|t| !t.is_empty()),
            count,
        });
        let media_url = if count > 0 {
            self.media_url0.filter(|u| !u.is_empty())
        } else {
            None
        };

        Ok(InboundDelivery {
            message_id: self.message_sid.trim().to_string(),
            sender: self.from.trim().to_string(),
            body: self.body,
            media,
            media_url,
            received_at,
        })
    }
}

/// Parses a form body into ordered key/value pairs, as signed by the provider.
pub fn form_params(body: &[u8]) -> Result<Vec<(String, String)>, DealerlineError> {
    serde_urlencoded::from_bytes(body)
        .map_err(|e| DealerlineError::MalformedDelivery(format!("invalid webhook form: {e}")))
}
