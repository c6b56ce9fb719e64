// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Dealerline.
//!
//! Deterministic in-process stand-ins for every external collaborator:
//!
//! - [`ScriptedAgent`] - replays queued agent replies and records histories
//! - [`RecordingChannel`] - captures outbound replies, optionally failing
//! - [`MemoryStorage`] - in-memory store with failure injection
//! - [`StaticTranscriber`] - fixed transcription result
//! - [`EchoTool`], [`FailingTool`] - tools with predictable output

pub mod memory_storage;
pub mod mock_agent;
pub mod mock_channel;
pub mod mock_tools;

pub use memory_storage::MemoryStorage;
pub use mock_agent::ScriptedAgent;
pub use mock_channel::{RecordingChannel, StaticTranscriber};
pub use mock_tools::{EchoTool, FailingTool};

use chrono::Utc;
use dealerline_core::types::{InboundDelivery, MediaDescriptor};

/// A text delivery from `sender`.
pub fn text_delivery(message_id: &str, sender: &str, body: &str) -> InboundDelivery {
    InboundDelivery {
        message_id: message_id.to_string(),
        sender: sender.to_string(),
        body: body.to_string(),
        media: None,
        media_url: None,
        received_at: Utc::now(),
    }
}

/// A delivery with an empty body and `count` attachments of `content_type`.
pub fn media_delivery(
    message_id: &str,
    sender: &str,
    content_type: &str,
    count: u32,
) -> InboundDelivery {
    InboundDelivery {
        message_id: message_id.to_string(),
        sender: sender.to_string(),
        body: String::new(),
        media: Some(MediaDescriptor {
            content_type: Some(content_type.to_string()),
            count,
        }),
        media_url: (count > 0).then(|| format!("https://media.example/{message_id}")),
        received_at: Utc::now(),
    }
}
