// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound channel and transcription mocks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use dealerline_core::DealerlineError;
use dealerline_core::traits::{ChannelAdapter, PluginAdapter, TranscriptionAdapter};
use dealerline_core::types::{AdapterType, MessageId, OutboundMessage};

/// Captures every message passed to `send`.
pub struct RecordingChannel {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    failing: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            failing: AtomicBool::new(false),
        }
    }

    /// Makes subsequent sends fail (nothing is recorded while failing).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

impl Default for RecordingChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for RecordingChannel {
    fn name(&self) -> &str {
        "recording-channel"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }
}

#[async_trait]
impl ChannelAdapter for RecordingChannel {
    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, DealerlineError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DealerlineError::Channel {
                message: "recording channel set to fail".into(),
                source: None,
            });
        }
        let mut sent = self.sent.lock().await;
        sent.push(msg);
        Ok(MessageId(format!("SMmock{}", sent.len())))
    }
}

/// Returns the same transcription, or an error when built with `failing`.
pub struct StaticTranscriber {
    result: Result<String, String>,
}

impl StaticTranscriber {
    pub fn new(text: &str) -> Self {
        Self {
            result: Ok(text.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Err("transcription unavailable".to_string()),
        }
    }
}

#[async_trait]
impl PluginAdapter for StaticTranscriber {
    fn name(&self) -> &str {
        "static-transcriber"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transcription
    }
}

#[async_trait]
impl TranscriptionAdapter for StaticTranscriber {
    async fn transcribe(
        &self,
        _media_url: &str,
        _content_type: &str,
    ) -> Result<String, DealerlineError> {
        self.result.clone().map_err(|message| DealerlineError::Agent {
            message,
            source: None,
        })
    }
}
