// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the pipeline's external collaborators.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod agent;
pub mod channel;
pub mod storage;
pub mod tool;
pub mod transcription;

pub use adapter::PluginAdapter;
pub use agent::AgentAdapter;
pub use channel::ChannelAdapter;
pub use storage::{LeadMerge, StorageAdapter};
pub use tool::{Tool, ToolContext, ToolOutput};
pub use transcription::TranscriptionAdapter;
