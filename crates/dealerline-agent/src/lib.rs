// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound message pipeline for the Dealerline WhatsApp channel.
//!
//! The [`Pipeline`] is the per-delivery coordinator that:
//! - Rejects redelivered webhooks through the [`DeliveryLock`]
//! - Serializes work per sender with [`ConversationLocks`]
//! - Answers trivial greetings from the instant [`classifier`]
//! - Drives the bounded tool loop in the [`Orchestrator`]
//! - Persists turns in order and dispatches the reply

pub mod classifier;
pub mod dedup;
pub mod locks;
pub mod orchestrator;
pub mod pipeline;
pub mod qualifier;
pub mod shutdown;
pub mod tools;

pub use classifier::{ResponseKind, classify};
pub use dedup::DeliveryLock;
pub use locks::ConversationLocks;
pub use orchestrator::{OrchestratedReply, Orchestrator, OrchestratorConfig, ReplyOutcome};
pub use pipeline::{IngestOutcome, Pipeline, PipelineConfig};
pub use qualifier::{LeadService, Qualification, qualify};
pub use tools::{CaptureLeadTool, ScheduleVisitTool, ToolRegistry};
