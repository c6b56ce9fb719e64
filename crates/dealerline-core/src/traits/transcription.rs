// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Speech-to-text trait for voice notes.

use async_trait::async_trait;

use crate::error::DealerlineError;
use crate::traits::adapter::PluginAdapter;

#[async_trait]
pub trait TranscriptionAdapter: PluginAdapter {
    /// Transcribes the audio at `media_url` into text.
    async fn transcribe(
        &self,
        media_url: &str,
        content_type: &str,
    ) -> Result<String, DealerlineError>;
}
