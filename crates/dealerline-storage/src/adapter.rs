// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use dealerline_config::model::StorageConfig;
use dealerline_core::types::{Conversation, ConversationFilter, Lead, Turn};
use dealerline_core::{
    AdapterType, DealerlineError, HealthStatus, LeadMerge, PluginAdapter, StorageAdapter,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// The database is opened by [`StorageAdapter::initialize`]; every operation
/// afterwards is bounded by `storage.op_timeout_secs`.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// The database connection is not opened until `initialize` is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wraps an already-open database, e.g. an in-memory one in tests.
    pub fn with_database(config: StorageConfig, db: Database) -> Self {
        Self {
            config,
            db: OnceCell::new_with(Some(db)),
        }
    }

    fn db(&self) -> Result<&Database, DealerlineError> {
        self.db.get().ok_or_else(|| DealerlineError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, DealerlineError>>,
    ) -> Result<T, DealerlineError> {
        let duration = Duration::from_secs(self.config.op_timeout_secs.max(1));
        tokio::time::timeout(duration, op)
            .await
            .map_err(|_| DealerlineError::Timeout { duration })?
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, DealerlineError> {
        let Ok(db) = self.db() else {
            return Ok(HealthStatus::Unhealthy("not initialized".into()));
        };
        let ping = db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            });
        match self
            .bounded(async { ping.await.map_err(crate::database::map_tr_err) })
            .await
        {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), DealerlineError> {
        self.close().await
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), DealerlineError> {
        if self.db.initialized() {
            return Ok(());
        }
        let db = Database::open(&self.config.database_path).await?;
        self.db.set(db).map_err(|_| DealerlineError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), DealerlineError> {
        let Some(db) = self.db.get() else {
            return Ok(());
        };
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Conversations ---

    async fn find_active_conversation(
        &self,
        sender: &str,
    ) -> Result<Option<Conversation>, DealerlineError> {
        let db = self.db()?;
        self.bounded(queries::conversations::find_active(db, sender))
            .await
    }

    async fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<(), DealerlineError> {
        let db = self.db()?;
        self.bounded(queries::conversations::insert(db, conversation))
            .await
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, DealerlineError> {
        let db = self.db()?;
        self.bounded(queries::conversations::get(db, id)).await
    }

    async fn list_conversations(
        &self,
        filter: &ConversationFilter,
    ) -> Result<Vec<Conversation>, DealerlineError> {
        let db = self.db()?;
        self.bounded(queries::conversations::list(db, filter)).await
    }

    async fn list_awaiting_reply(&self) -> Result<Vec<Conversation>, DealerlineError> {
        let db = self.db()?;
        self.bounded(queries::conversations::list_awaiting_reply(db))
            .await
    }

    async fn mark_appointment(&self, conversation_id: &str) -> Result<(), DealerlineError> {
        let db = self.db()?;
        self.bounded(queries::conversations::mark_appointment(db, conversation_id))
            .await
    }

    async fn link_lead(
        &self,
        conversation_id: &str,
        lead_id: &str,
    ) -> Result<(), DealerlineError> {
        let db = self.db()?;
        self.bounded(queries::conversations::link_lead(db, conversation_id, lead_id))
            .await
    }

    async fn close_conversation(&self, conversation_id: &str) -> Result<(), DealerlineError> {
        let db = self.db()?;
        self.bounded(queries::conversations::close(db, conversation_id))
            .await
    }

    // --- Turns ---

    async fn append_turn(&self, turn: &Turn, awaiting_reply: bool) -> Result<(), DealerlineError> {
        let db = self.db()?;
        self.bounded(queries::turns::append(db, turn, awaiting_reply))
            .await
    }

    async fn get_turns(
        &self,
        conversation_id: &str,
        last: Option<usize>,
    ) -> Result<Vec<Turn>, DealerlineError> {
        let db = self.db()?;
        self.bounded(queries::turns::list(db, conversation_id, last))
            .await
    }

    // --- Leads ---

    async fn find_lead_by_phone(&self, phone: &str) -> Result<Option<Lead>, DealerlineError> {
        let db = self.db()?;
        self.bounded(queries::leads::find_by_phone(db, phone)).await
    }

    async fn get_lead(&self, id: &str) -> Result<Option<Lead>, DealerlineError> {
        let db = self.db()?;
        self.bounded(queries::leads::get(db, id)).await
    }

    async fn save_lead(&self, lead: &Lead) -> Result<(), DealerlineError> {
        let db = self.db()?;
        self.bounded(queries::leads::save(db, lead)).await
    }

    async fn upsert_lead_by_phone(
        &self,
        candidate: Lead,
        merge: LeadMerge,
    ) -> Result<Lead, DealerlineError> {
        let db = self.db()?;
        self.bounded(queries::leads::upsert_by_phone(db, candidate, merge))
            .await
    }

    // --- Delivery ledger ---

    async fn claim_delivery(
        &self,
        message_id: &str,
        claimed_at: DateTime<Utc>,
    ) -> Result<bool, DealerlineError> {
        let db = self.db()?;
        self.bounded(queries::deliveries::claim(db, message_id, claimed_at))
            .await
    }

    async fn purge_deliveries(&self, cutoff: DateTime<Utc>) -> Result<usize, DealerlineError> {
        let db = self.db()?;
        self.bounded(queries::deliveries::purge(db, cutoff)).await
    }
}
