// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Dealerline message pipeline.
//!
//! Holds the domain types (deliveries, conversations, turns, leads), the
//! shared error type, and the adapter traits every external collaborator
//! implements: the reply agent, the outbound channel, storage, speech
//! transcription and tools.

pub mod error;
pub mod traits;
pub mod types;

pub use error::DealerlineError;
pub use types::{AdapterType, HealthStatus, MessageId};

pub use traits::{
    AgentAdapter, ChannelAdapter, LeadMerge, PluginAdapter, StorageAdapter, Tool, ToolContext,
    ToolOutput, TranscriptionAdapter,
};
