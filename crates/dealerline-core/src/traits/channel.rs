// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound channel trait used for reply dispatch.

use async_trait::async_trait;

use crate::error::DealerlineError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{MessageId, OutboundMessage};

/// Delivers replies back to the customer's messaging app.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// Sends a message through the channel.
    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, DealerlineError>;
}
