// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by every Dealerline crate.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifier the outbound channel assigned to a sent message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`crate::PluginAdapter`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Agent,
    Channel,
    Storage,
    Transcription,
}

/// Formats a timestamp the way it is persisted: fixed-width RFC 3339 with
/// microseconds, so lexical order equals chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a persisted timestamp, falling back to the Unix epoch on garbage.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

// --- Inbound deliveries ---

/// Media attached to an inbound delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    /// MIME type of the first attachment, when the provider reported one.
    pub content_type: Option<String>,
    /// Number of attachments.
    pub count: u32,
}

impl MediaDescriptor {
    /// Audio notes are recognised by their `audio/` content-type prefix.
    pub fn is_audio(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("audio/"))
    }
}

/// One webhook delivery from the messaging provider. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundDelivery {
    /// Provider-assigned message identifier; the idempotency key.
    pub message_id: String,
    /// Sender address as the provider formats it (e.g. `whatsapp:+5585...`).
    pub sender: String,
    /// Raw body text, possibly empty.
    pub body: String,
    pub media: Option<MediaDescriptor>,
    /// Provider URL of the first attachment, used for transcription.
    #[serde(default)]
    pub media_url: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// What an inbound delivery carries, decided once at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Non-empty body text.
    Text,
    /// Empty body with an audio attachment.
    Audio,
    /// Empty body with non-audio attachments.
    Media,
    /// Empty body and no attachments.
    Empty,
}

impl InboundDelivery {
    pub fn payload_kind(&self) -> PayloadKind {
        if !self.body.trim().is_empty() {
            return PayloadKind::Text;
        }
        match &self.media {
            Some(media) if media.count > 0 && media.is_audio() => PayloadKind::Audio,
            Some(media) if media.count > 0 => PayloadKind::Media,
            _ => PayloadKind::Empty,
        }
    }
}

// --- Conversations and turns ---

/// Lifecycle state of a conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Closed,
}

/// A customer conversation. Never deleted, only closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub sender: String,
    /// Set once the customer has been qualified as a lead.
    pub lead_id: Option<String>,
    pub status: ConversationStatus,
    pub user_turns: u32,
    pub assistant_turns: u32,
    pub resulted_in_appointment: bool,
    /// A user turn was recorded whose reply has not been recorded yet.
    pub awaiting_reply: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// A fresh active conversation for `sender`.
    pub fn start(sender: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender: sender.to_string(),
            lead_id: None,
            status: ConversationStatus::Active,
            user_turns: 0,
            assistant_turns: 0,
            resulted_in_appointment: false,
            awaiting_reply: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Author of a turn.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message within a conversation. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    /// Last tool the agent invoked while producing this turn, if any.
    pub tool_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(
        conversation_id: &str,
        role: Role,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.into(),
            tool_name: None,
            created_at,
        }
    }

    pub fn with_tool(mut self, tool_name: Option<String>) -> Self {
        self.tool_name = tool_name;
        self
    }
}

/// Filters for listing conversations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationFilter {
    pub status: Option<ConversationStatus>,
    pub resulted_in_appointment: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// --- Leads ---

/// Coarse lead-quality bucket derived from the qualification score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    Hot,
    Warm,
    Cold,
}

/// Acquisition attribution captured with a lead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attribution {
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub content: Option<String>,
    pub term: Option<String>,
    pub click_id: Option<String>,
}

/// A lead as submitted by the lead form or captured by the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadSubmission {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub interest: Option<String>,
    pub attribution: Attribution,
}

/// A qualified, persisted lead. Identity is the normalized phone when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub name: Option<String>,
    /// Digits only.
    pub phone: Option<String>,
    pub email: Option<String>,
    pub interest: Option<String>,
    pub attribution: Attribution,
    pub score: u32,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Strips everything but ASCII digits from a phone number.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl LeadSubmission {
    /// Trims free-text fields, drops blank ones and reduces the phone to digits.
    pub fn normalized(self) -> Self {
        let attribution = Attribution {
            source: non_blank(self.attribution.source),
            medium: non_blank(self.attribution.medium),
            campaign: non_blank(self.attribution.campaign),
            content: non_blank(self.attribution.content),
            term: non_blank(self.attribution.term),
            click_id: non_blank(self.attribution.click_id),
        };
        Self {
            name: non_blank(self.name),
            phone: self
                .phone
                .map(|p| normalize_phone(&p))
                .filter(|p| !p.is_empty()),
            email: non_blank(self.email),
            interest: non_blank(self.interest),
            attribution,
        }
    }
}

// --- Agent protocol ---

/// What the reply agent produced for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentReply {
    /// Final text for the customer.
    Terminal { text: String },
    /// Request to run a named tool before replying.
    ToolCall {
        id: String,
        name: String,
        args: serde_json::Value,
        /// Text the agent emitted alongside the tool request.
        text: Option<String>,
    },
}

/// One entry of the history handed to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEntry {
    User {
        content: String,
    },
    Assistant {
        content: String,
    },
    ToolCall {
        id: String,
        name: String,
        args: serde_json::Value,
        text: Option<String>,
    },
    ToolResult {
        id: String,
        name: String,
        content: String,
        is_error: bool,
    },
}

impl From<&Turn> for HistoryEntry {
    fn from(turn: &Turn) -> Self {
        match turn.role {
            Role::User => HistoryEntry::User {
                content: turn.content.clone(),
            },
            Role::Assistant => HistoryEntry::Assistant {
                content: turn.content.clone(),
            },
        }
    }
}

// --- Outbound ---

/// A reply to send through the outbound channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Recipient address, in the same format the sender arrived with.
    pub to: String,
    pub body: String,
}
