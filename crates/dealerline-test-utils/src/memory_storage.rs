// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory `StorageAdapter` with failure injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use dealerline_core::DealerlineError;
use dealerline_core::traits::{LeadMerge, PluginAdapter, StorageAdapter};
use dealerline_core::types::{
    AdapterType, Conversation, ConversationFilter, ConversationStatus, Lead, Role, Turn,
};

#[derive(Default)]
struct State {
    conversations: HashMap<String, Conversation>,
    /// Insertion order doubles as the rowid tiebreak.
    turns: Vec<Turn>,
    leads: HashMap<String, Lead>,
    deliveries: HashMap<String, DateTime<Utc>>,
}

/// Mirrors the SQLite adapter's semantics without a database.
pub struct MemoryStorage {
    state: Mutex<State>,
    fail_user_turns: AtomicU32,
    fail_assistant_turns: AtomicU32,
    fail_claims: AtomicBool,
    claim_delay: Mutex<Option<Duration>>,
    append_calls: AtomicU32,
}

fn injected(what: &str) -> DealerlineError {
    DealerlineError::Storage {
        source: format!("injected {what} failure").into(),
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            fail_user_turns: AtomicU32::new(0),
            fail_assistant_turns: AtomicU32::new(0),
            fail_claims: AtomicBool::new(false),
            claim_delay: Mutex::new(None),
            append_calls: AtomicU32::new(0),
        }
    }

    /// The next `n` user-turn appends fail.
    pub fn fail_next_user_turns(&self, n: u32) {
        self.fail_user_turns.store(n, Ordering::SeqCst);
    }

    /// The next `n` assistant-turn appends fail.
    pub fn fail_next_assistant_turns(&self, n: u32) {
        self.fail_assistant_turns.store(n, Ordering::SeqCst);
    }

    /// Makes the delivery ledger unreachable.
    pub fn set_claims_failing(&self, failing: bool) {
        self.fail_claims.store(failing, Ordering::SeqCst);
    }

    /// Delays every ledger claim.
    pub async fn set_claim_delay(&self, delay: Option<Duration>) {
        *self.claim_delay.lock().await = delay;
    }

    /// Number of `append_turn` calls, failed ones included.
    pub fn append_calls(&self) -> u32 {
        self.append_calls.load(Ordering::SeqCst)
    }

    /// Every stored turn across all conversations, in insertion order.
    pub async fn all_turns(&self) -> Vec<Turn> {
        self.state.lock().await.turns.clone()
    }

    pub async fn conversation_count(&self) -> usize {
        self.state.lock().await.conversations.len()
    }

    pub async fn lead_count(&self) -> usize {
        self.state.lock().await.leads.len()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn initialize(&self) -> Result<(), DealerlineError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), DealerlineError> {
        Ok(())
    }

    async fn find_active_conversation(
        &self,
        sender: &str,
    ) -> Result<Option<Conversation>, DealerlineError> {
        let state = self.state.lock().await;
        Ok(state
            .conversations
            .values()
            .find(|c| c.sender == sender && c.status == ConversationStatus::Active)
            .cloned())
    }

    async fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<(), DealerlineError> {
        let mut state = self.state.lock().await;
        let duplicate_active = conversation.status == ConversationStatus::Active
            && state
                .conversations
                .values()
                .any(|c| c.sender == conversation.sender && c.status == ConversationStatus::Active);
        if duplicate_active || state.conversations.contains_key(&conversation.id) {
            return Err(DealerlineError::Storage {
                source: "UNIQUE constraint failed: conversations".into(),
            });
        }
        state
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, DealerlineError> {
        Ok(self.state.lock().await.conversations.get(id).cloned())
    }

    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
    ) -> Result<Vec<Conversation>, DealerlineError> {
        let state = self.state.lock().await;
        let mut out: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|c| filter.status.is_none_or(|s| c.status == s))
            .filter(|c| {
                filter
                    .resulted_in_appointment
                    .is_none_or(|a| c.resulted_in_appointment == a)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        let offset = filter.offset.unwrap_or(0) as usize;
        let limit = filter.limit.unwrap_or(50).clamp(1, 200) as usize;
        Ok(out.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_awaiting_reply(&self) -> Result<Vec<Conversation>, DealerlineError> {
        let state = self.state.lock().await;
        Ok(state
            .conversations
            .values()
            .filter(|c| c.awaiting_reply)
            .cloned()
            .collect())
    }

    async fn mark_appointment(&self, conversation_id: &str) -> Result<(), DealerlineError> {
        let mut state = self.state.lock().await;
        let c = state
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| not_found(conversation_id))?;
        c.resulted_in_appointment = true;
        c.updated_at = Utc::now();
        Ok(())
    }

    async fn link_lead(
        &self,
        conversation_id: &str,
        lead_id: &str,
    ) -> Result<(), DealerlineError> {
        let mut state = self.state.lock().await;
        let c = state
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| not_found(conversation_id))?;
        c.lead_id = Some(lead_id.to_string());
        c.updated_at = Utc::now();
        Ok(())
    }

    async fn close_conversation(&self, conversation_id: &str) -> Result<(), DealerlineError> {
        let mut state = self.state.lock().await;
        let c = state
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| not_found(conversation_id))?;
        c.status = ConversationStatus::Closed;
        c.updated_at = Utc::now();
        Ok(())
    }

    async fn append_turn(&self, turn: &Turn, awaiting_reply: bool) -> Result<(), DealerlineError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        let counter = match turn.role {
            Role::User => &self.fail_user_turns,
            Role::Assistant => &self.fail_assistant_turns,
        };
        if Self::take_failure(counter) {
            return Err(injected("turn write"));
        }

        let mut state = self.state.lock().await;
        if state.turns.iter().any(|t| t.id == turn.id) {
            return Ok(());
        }
        let c = state
            .conversations
            .get_mut(&turn.conversation_id)
            .ok_or_else(|| not_found(&turn.conversation_id))?;
        match turn.role {
            Role::User => c.user_turns += 1,
            Role::Assistant => c.assistant_turns += 1,
        }
        c.awaiting_reply = awaiting_reply;
        c.updated_at = turn.created_at;
        state.turns.push(turn.clone());
        Ok(())
    }

    async fn get_turns(
        &self,
        conversation_id: &str,
        last: Option<usize>,
    ) -> Result<Vec<Turn>, DealerlineError> {
        let state = self.state.lock().await;
        let mut turns: Vec<Turn> = state
            .turns
            .iter()
            .filter(|t| t.conversation_id == conversation_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        turns.sort_by_key(|t| t.created_at);
        if let Some(n) = last {
            let skip = turns.len().saturating_sub(n);
            turns.drain(..skip);
        }
        Ok(turns)
    }

    async fn find_lead_by_phone(&self, phone: &str) -> Result<Option<Lead>, DealerlineError> {
        let state = self.state.lock().await;
        Ok(state
            .leads
            .values()
            .find(|l| l.phone.as_deref() == Some(phone))
            .cloned())
    }

    async fn get_lead(&self, id: &str) -> Result<Option<Lead>, DealerlineError> {
        Ok(self.state.lock().await.leads.get(id).cloned())
    }

    async fn save_lead(&self, lead: &Lead) -> Result<(), DealerlineError> {
        let mut state = self.state.lock().await;
        let created_at = state
            .leads
            .get(&lead.id)
            .map(|existing| existing.created_at)
            .unwrap_or(lead.created_at);
        let mut stored = lead.clone();
        stored.created_at = created_at;
        state.leads.insert(lead.id.clone(), stored);
        Ok(())
    }

    async fn upsert_lead_by_phone(
        &self,
        candidate: Lead,
        merge: LeadMerge,
    ) -> Result<Lead, DealerlineError> {
        let mut state = self.state.lock().await;
        let existing = candidate.phone.as_deref().and_then(|phone| {
            state
                .leads
                .values()
                .find(|l| l.phone.as_deref() == Some(phone))
                .cloned()
        });
        let lead = match existing {
            Some(current) => {
                let created_at = current.created_at;
                let mut merged = merge(current);
                merged.created_at = created_at;
                merged
            }
            None => candidate,
        };
        state.leads.insert(lead.id.clone(), lead.clone());
        Ok(lead)
    }

    async fn claim_delivery(
        &self,
        message_id: &str,
        claimed_at: DateTime<Utc>,
    ) -> Result<bool, DealerlineError> {
        let delay = *self.claim_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_claims.load(Ordering::SeqCst) {
            return Err(injected("ledger"));
        }
        let mut state = self.state.lock().await;
        if state.deliveries.contains_key(message_id) {
            return Ok(false);
        }
        state.deliveries.insert(message_id.to_string(), claimed_at);
        Ok(true)
    }

    async fn purge_deliveries(&self, cutoff: DateTime<Utc>) -> Result<usize, DealerlineError> {
        let mut state = self.state.lock().await;
        let before = state.deliveries.len();
        state.deliveries.retain(|_, claimed| *claimed >= cutoff);
        Ok(before - state.deliveries.len())
    }
}

fn not_found(id: &str) -> DealerlineError {
    DealerlineError::NotFound {
        entity: "conversation".into(),
        id: id.to_string(),
    }
}
