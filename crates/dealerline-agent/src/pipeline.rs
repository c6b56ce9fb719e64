// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-delivery coordinator.
//!
//! [`Pipeline::ingest`] takes one webhook delivery from claim to dispatched
//! reply. The gateway splits it in two: [`Pipeline::claim`] runs inline so
//! the webhook can acknowledge quickly, and [`Pipeline::process`] runs on a
//! tracked background task. [`Pipeline::resume_interrupted`] answers cycles
//! a previous run recorded but never replied to.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use dealerline_config::model::DealerlineConfig;
use dealerline_core::types::{
    Conversation, HistoryEntry, InboundDelivery, OutboundMessage, PayloadKind,
};
use dealerline_core::{
    ChannelAdapter, DealerlineError, StorageAdapter, ToolContext, TranscriptionAdapter,
};
use dealerline_resilience::CircuitBreakerRegistry;
use dealerline_storage::writer::RecordedUserTurn;
use dealerline_storage::{TurnWriter, WriterConfig};

use crate::classifier::classify;
use crate::dedup::DeliveryLock;
use crate::locks::ConversationLocks;
use crate::orchestrator::{FallbackReason, OrchestratedReply, Orchestrator, ReplyOutcome};

/// Stored for media deliveries without text.
pub const MEDIA_PLACEHOLDER: &str = "[media received]";
/// Stored for audio that could not be transcribed.
pub const AUDIO_PLACEHOLDER: &str = "[audio received]";

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Already claimed; dropped without side effects.
    Duplicate,
    /// No body and no media; nothing recorded.
    Ignored,
    /// A user turn was recorded that needs no reply.
    Recorded,
    /// A reply cycle ran and a reply was dispatched.
    Replied(ReplyOutcome),
    /// The user turn could not be recorded; the fallback message was sent.
    Aborted,
}

impl IngestOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Ignored => "ignored",
            Self::Recorded => "recorded",
            Self::Replied(_) => "replied",
            Self::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Turns handed to the agent, newest last.
    pub history_window: usize,
    /// Breaker name for outbound dispatch.
    pub channel_service: String,
    pub dispatch_timeout: Duration,
    /// Breaker name for audio transcription.
    pub transcription_service: String,
    pub transcription_timeout: Duration,
    pub writer: WriterConfig,
}

impl From<&DealerlineConfig> for PipelineConfig {
    fn from(config: &DealerlineConfig) -> Self {
        Self {
            history_window: config.agent.history_window,
            channel_service: "whatsapp".to_string(),
            dispatch_timeout: Duration::from_secs(config.whatsapp.send_timeout_secs),
            transcription_service: "transcription".to_string(),
            transcription_timeout: Duration::from_secs(config.agent.request_timeout_secs),
            writer: WriterConfig::from(&config.storage),
        }
    }
}

/// Text to record for a delivery and whether it gets a reply.
struct UserInput {
    content: String,
    expects_reply: bool,
}

pub struct Pipeline {
    dedup: Arc<DeliveryLock>,
    locks: ConversationLocks,
    storage: Arc<dyn StorageAdapter>,
    writer: TurnWriter,
    orchestrator: Orchestrator,
    channel: Arc<dyn ChannelAdapter>,
    transcriber: Option<Arc<dyn TranscriptionAdapter>>,
    breakers: Arc<CircuitBreakerRegistry>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        dedup: Arc<DeliveryLock>,
        storage: Arc<dyn StorageAdapter>,
        orchestrator: Orchestrator,
        channel: Arc<dyn ChannelAdapter>,
        breakers: Arc<CircuitBreakerRegistry>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            dedup,
            locks: ConversationLocks::new(),
            writer: TurnWriter::new(Arc::clone(&storage), config.writer),
            storage,
            orchestrator,
            channel,
            transcriber: None,
            breakers,
            config,
        }
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn TranscriptionAdapter>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Claims and processes one delivery.
    pub async fn ingest(&self, delivery: InboundDelivery) -> IngestOutcome {
        if !self.claim(&delivery).await {
            return IngestOutcome::Duplicate;
        }
        self.process(delivery).await
    }

    /// Claims the delivery id. `false` means it was already handled.
    pub async fn claim(&self, delivery: &InboundDelivery) -> bool {
        let claimed = self.dedup.acquire(&delivery.message_id).await;
        if !claimed {
            dealerline_prometheus::record_delivery(IngestOutcome::Duplicate.label());
        }
        claimed
    }

    /// Processes a claimed delivery through to a dispatched reply.
    pub async fn process(&self, delivery: InboundDelivery) -> IngestOutcome {
        let outcome = self.process_inner(&delivery).await;
        dealerline_prometheus::record_delivery(outcome.label());
        match outcome {
            IngestOutcome::Replied(reply) => info!(
                message_id = delivery.message_id.as_str(),
                outcome = %reply,
                "delivery processed"
            ),
            other => debug!(
                message_id = delivery.message_id.as_str(),
                outcome = other.label(),
                "delivery processed"
            ),
        }
        outcome
    }

    /// Purges expired delivery claims and idle conversation locks.
    pub async fn run_maintenance(&self) {
        let purged = self.dedup.purge_expired().await;
        let pruned = self.locks.prune();
        debug!(purged, pruned, "pipeline maintenance completed");
    }

    /// Answers every conversation a previous run left awaiting a reply.
    /// Returns how many were answered.
    pub async fn resume_interrupted(&self) -> usize {
        let pending = match self.storage.list_awaiting_reply().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "failed to list interrupted reply cycles");
                return 0;
            }
        };
        if pending.is_empty() {
            debug!("no interrupted reply cycles");
            return 0;
        }

        info!(count = pending.len(), "resuming interrupted reply cycles");
        let mut resumed = 0;
        for conversation in &pending {
            if self.resume(conversation).await.is_some() {
                resumed += 1;
            }
        }
        resumed
    }

    /// Finishes the reply cycle for `conversation` when its latest turn is
    /// still an unanswered user turn. `None` when there is nothing to answer.
    pub async fn resume(&self, conversation: &Conversation) -> Option<ReplyOutcome> {
        let _guard = self.locks.lock(&conversation.sender).await;

        // Re-read under the lock: a fresh delivery may have answered it already.
        let current = match self.storage.get_conversation(&conversation.id).await {
            Ok(Some(current)) if current.awaiting_reply => current,
            Ok(_) => return None,
            Err(e) => {
                warn!(conversation_id = conversation.id.as_str(), error = %e, "cannot resume cycle");
                return None;
            }
        };
        let user_turn = match self.storage.get_turns(&current.id, Some(1)).await {
            Ok(mut turns) => turns.pop().and_then(RecordedUserTurn::from_persisted),
            Err(e) => {
                warn!(conversation_id = current.id.as_str(), error = %e, "cannot resume cycle");
                return None;
            }
        }?;

        info!(
            conversation_id = current.id.as_str(),
            turn_id = user_turn.turn().id.as_str(),
            "resuming interrupted reply cycle"
        );
        let outcome = self
            .reply_and_record(&current.id, &current.sender, &user_turn)
            .await;
        Some(outcome)
    }

    async fn process_inner(&self, delivery: &InboundDelivery) -> IngestOutcome {
        let Some(input) = self.extract_input(delivery).await else {
            let err = DealerlineError::MalformedDelivery(format!(
                "delivery {} has no body and no media",
                delivery.message_id
            ));
            warn!(message_id = delivery.message_id.as_str(), error = %err, "ignoring delivery");
            return IngestOutcome::Ignored;
        };

        let _guard = self.locks.lock(&delivery.sender).await;

        let conversation = match self.resolve_conversation(&delivery.sender).await {
            Ok(conversation) => conversation,
            Err(e) => {
                error!(
                    message_id = delivery.message_id.as_str(),
                    error = %e,
                    "failed to resolve conversation"
                );
                return self.abort(&delivery.sender).await;
            }
        };

        let user_turn = match self
            .writer
            .record_user_turn(&conversation.id, &input.content, input.expects_reply)
            .await
        {
            Ok(recorded) => recorded,
            Err(_) => return self.abort(&delivery.sender).await,
        };

        if !input.expects_reply {
            return IngestOutcome::Recorded;
        }

        let outcome = self
            .reply_and_record(&conversation.id, &delivery.sender, &user_turn)
            .await;
        IngestOutcome::Replied(outcome)
    }

    /// Answers a recorded user turn: instant reply or agent cycle, dispatch,
    /// then the assistant turn.
    async fn reply_and_record(
        &self,
        conversation_id: &str,
        sender: &str,
        user_turn: &RecordedUserTurn,
    ) -> ReplyOutcome {
        let content = user_turn.turn().content.as_str();
        let reply = match classify(content) {
            Some(kind) => {
                debug!(conversation_id, kind = %kind, "instant reply");
                OrchestratedReply {
                    text: kind.reply().to_string(),
                    outcome: ReplyOutcome::Instant,
                    last_tool: None,
                    tool_invocations: 0,
                }
            }
            None => {
                let history = self.load_history(conversation_id, content).await;
                let ctx = ToolContext {
                    conversation_id: conversation_id.to_string(),
                    sender: sender.to_string(),
                };
                self.orchestrator.run(history, &ctx).await
            }
        };

        self.dispatch(sender, &reply.text).await;
        dealerline_prometheus::record_reply(reply.outcome.label());

        if let Err(e) = self
            .writer
            .record_assistant_turn(user_turn, &reply.text, reply.last_tool.clone())
            .await
        {
            debug!(
                conversation_id,
                error = %e,
                "assistant turn not persisted; reply already sent"
            );
        }
        reply.outcome
    }

    async fn extract_input(&self, delivery: &InboundDelivery) -> Option<UserInput> {
        match delivery.payload_kind() {
            PayloadKind::Empty => None,
            PayloadKind::Text => Some(UserInput {
                content: delivery.body.trim().to_string(),
                expects_reply: true,
            }),
            PayloadKind::Media => Some(UserInput {
                content: MEDIA_PLACEHOLDER.to_string(),
                expects_reply: false,
            }),
            PayloadKind::Audio => {
                let content = self
                    .transcribe(delivery)
                    .await
                    .unwrap_or_else(|| AUDIO_PLACEHOLDER.to_string());
                Some(UserInput {
                    content,
                    expects_reply: true,
                })
            }
        }
    }

    async fn transcribe(&self, delivery: &InboundDelivery) -> Option<String> {
        let transcriber = self.transcriber.as_ref()?;
        let url = delivery.media_url.as_deref()?;
        let content_type = delivery
            .media
            .as_ref()
            .and_then(|m| m.content_type.as_deref())
            .unwrap_or("audio/ogg");
        let timeout = self.config.transcription_timeout;

        let result = self
            .breakers
            .execute(&self.config.transcription_service, || async move {
                match tokio::time::timeout(timeout, transcriber.transcribe(url, content_type)).await
                {
                    Ok(text) => text,
                    Err(_) => Err(DealerlineError::Timeout { duration: timeout }),
                }
            })
            .await
            .map_err(DealerlineError::from);

        match result {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!(
                    message_id = delivery.message_id.as_str(),
                    error = %e,
                    "transcription unavailable, storing placeholder"
                );
                None
            }
        }
    }

    async fn resolve_conversation(&self, sender: &str) -> Result<Conversation, DealerlineError> {
        if let Some(conversation) = self.storage.find_active_conversation(sender).await? {
            return Ok(conversation);
        }
        let conversation = Conversation::start(sender, Utc::now());
        self.storage.create_conversation(&conversation).await?;
        info!(
            conversation_id = conversation.id.as_str(),
            "conversation started"
        );
        Ok(conversation)
    }

    async fn load_history(&self, conversation_id: &str, latest: &str) -> Vec<HistoryEntry> {
        match self
            .storage
            .get_turns(conversation_id, Some(self.config.history_window))
            .await
        {
            Ok(turns) => turns.iter().map(HistoryEntry::from).collect(),
            Err(e) => {
                warn!(
                    conversation_id,
                    error = %e,
                    "failed to load history, continuing with the latest message only"
                );
                vec![HistoryEntry::User {
                    content: latest.to_string(),
                }]
            }
        }
    }

    /// Sends `body` to `to`. Failures are logged and counted, never raised.
    async fn dispatch(&self, to: &str, body: &str) -> bool {
        let message = OutboundMessage {
            to: to.to_string(),
            body: body.to_string(),
        };
        let timeout = self.config.dispatch_timeout;
        let channel = &self.channel;

        let result = self
            .breakers
            .execute(&self.config.channel_service, || async move {
                match tokio::time::timeout(timeout, channel.send(message)).await {
                    Ok(sent) => sent,
                    Err(_) => Err(DealerlineError::Timeout { duration: timeout }),
                }
            })
            .await
            .map_err(DealerlineError::from);

        match result {
            Ok(id) => {
                debug!(provider_id = id.0.as_str(), "reply dispatched");
                true
            }
            Err(e) => {
                error!(error = %e, "failed to dispatch reply");
                dealerline_prometheus::record_dispatch_failure();
                false
            }
        }
    }

    async fn abort(&self, sender: &str) -> IngestOutcome {
        let fallback = self
            .orchestrator
            .fallback(FallbackReason::PersistenceFailure, 0);
        self.dispatch(sender, &fallback.text).await;
        dealerline_prometheus::record_reply(fallback.outcome.label());
        IngestOutcome::Aborted
    }
}
