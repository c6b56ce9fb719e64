// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the conversation and lead store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DealerlineError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Conversation, ConversationFilter, Lead, Turn};

/// Builds the record to store from the lead already saved under the same phone.
pub type LeadMerge = Box<dyn FnOnce(Lead) -> Lead + Send>;

/// Persistence for conversations, turns, leads and the delivery ledger.
///
/// Implementations must apply each call atomically: `append_turn` updates the
/// conversation's counters and `awaiting_reply` flag in the same transaction
/// as the insert, and treats a repeated turn id as already appended.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connections).
    async fn initialize(&self) -> Result<(), DealerlineError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), DealerlineError>;

    // --- Conversations ---

    /// The active conversation for `sender`, if any.
    async fn find_active_conversation(
        &self,
        sender: &str,
    ) -> Result<Option<Conversation>, DealerlineError>;

    async fn create_conversation(&self, conversation: &Conversation)
    -> Result<(), DealerlineError>;

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, DealerlineError>;

    /// Conversations matching `filter`, most recently updated first.
    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
    ) -> Result<Vec<Conversation>, DealerlineError>;

    /// Conversations with a recorded user turn and no recorded reply.
    async fn list_awaiting_reply(&self) -> Result<Vec<Conversation>, DealerlineError>;

    async fn mark_appointment(&self, conversation_id: &str) -> Result<(), DealerlineError>;

    async fn link_lead(&self, conversation_id: &str, lead_id: &str)
    -> Result<(), DealerlineError>;

    async fn close_conversation(&self, conversation_id: &str) -> Result<(), DealerlineError>;

    // --- Turns ---

    /// Appends a turn, updates its conversation's counters and sets the
    /// conversation's `awaiting_reply` flag to `awaiting_reply`.
    async fn append_turn(&self, turn: &Turn, awaiting_reply: bool) -> Result<(), DealerlineError>;

    /// Turns in persisted order. With `last`, only the most recent `last` turns.
    async fn get_turns(
        &self,
        conversation_id: &str,
        last: Option<usize>,
    ) -> Result<Vec<Turn>, DealerlineError>;

    // --- Leads ---

    async fn find_lead_by_phone(&self, phone: &str) -> Result<Option<Lead>, DealerlineError>;

    async fn get_lead(&self, id: &str) -> Result<Option<Lead>, DealerlineError>;

    /// Inserts the lead, or replaces the row with the same id.
    async fn save_lead(&self, lead: &Lead) -> Result<(), DealerlineError>;

    /// Saves `candidate`, or the record `merge` builds when a lead with the
    /// same phone already exists. Lookup and write are one atomic step, so
    /// concurrent submissions for one phone resolve to a single lead.
    /// Returns the stored lead.
    async fn upsert_lead_by_phone(
        &self,
        candidate: Lead,
        merge: LeadMerge,
    ) -> Result<Lead, DealerlineError>;

    // --- Delivery ledger ---

    /// Records `message_id` as processed. Returns `false` if it already was.
    async fn claim_delivery(
        &self,
        message_id: &str,
        claimed_at: DateTime<Utc>,
    ) -> Result<bool, DealerlineError>;

    /// Removes ledger entries claimed before `cutoff`. Returns how many were removed.
    async fn purge_deliveries(&self, cutoff: DateTime<Utc>) -> Result<usize, DealerlineError>;
}
