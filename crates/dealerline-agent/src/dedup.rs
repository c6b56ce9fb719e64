// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery lock: exactly-once claim of provider message ids.
//!
//! The in-memory map is the authority within one process. An optional
//! durable ledger (the storage `processed_deliveries` table) extends the
//! guarantee across restarts. When the ledger cannot be reached in time the
//! lock fails open: the delivery is processed and the event is counted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::{debug, warn};

use dealerline_config::model::DedupConfig;
use dealerline_core::StorageAdapter;

/// Claims between opportunistic sweeps of expired entries.
const SWEEP_EVERY: u64 = 256;

pub struct DeliveryLock {
    claims: DashMap<String, Instant>,
    retention: Duration,
    ledger: Option<Arc<dyn StorageAdapter>>,
    ledger_timeout: Duration,
    acquisitions: AtomicU64,
}

impl DeliveryLock {
    /// Memory-only lock holding claims for `retention`.
    pub fn new(retention: Duration) -> Self {
        Self {
            claims: DashMap::new(),
            retention,
            ledger: None,
            ledger_timeout: Duration::from_millis(500),
            acquisitions: AtomicU64::new(0),
        }
    }

    /// Backs the in-memory claim with a durable ledger.
    pub fn with_ledger(mut self, ledger: Arc<dyn StorageAdapter>, timeout: Duration) -> Self {
        self.ledger = Some(ledger);
        self.ledger_timeout = timeout;
        self
    }

    /// Builds a lock from config; `storage` is used as the ledger when `durable` is set.
    pub fn from_config(config: &DedupConfig, storage: Arc<dyn StorageAdapter>) -> Self {
        let lock = Self::new(Duration::from_secs(config.retention_secs));
        if config.durable {
            lock.with_ledger(storage, Duration::from_millis(config.ledger_timeout_ms))
        } else {
            lock
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Number of ids currently held in memory, expired or not.
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Returns `true` exactly once per `message_id` within the retention window.
    pub async fn acquire(&self, message_id: &str) -> bool {
        if !self.claim_in_memory(message_id) {
            debug!(message_id, "duplicate delivery rejected");
            return false;
        }

        if self.acquisitions.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep_memory();
        }

        let Some(ledger) = &self.ledger else {
            return true;
        };

        let claim = ledger.claim_delivery(message_id, Utc::now());
        match tokio::time::timeout(self.ledger_timeout, claim).await {
            Ok(Ok(true)) => true,
            Ok(Ok(false)) => {
                debug!(message_id, "delivery already recorded in ledger");
                false
            }
            Ok(Err(e)) => {
                warn!(message_id, error = %e, "dedup ledger unavailable, processing delivery");
                dealerline_prometheus::record_dedup_fail_open();
                true
            }
            Err(_) => {
                warn!(
                    message_id,
                    timeout_ms = self.ledger_timeout.as_millis() as u64,
                    "dedup ledger timed out, processing delivery"
                );
                dealerline_prometheus::record_dedup_fail_open();
                true
            }
        }
    }

    /// Drops expired claims from memory and the ledger. Returns the number
    /// of in-memory entries removed.
    pub async fn purge_expired(&self) -> usize {
        let removed = self.sweep_memory();

        if let Some(ledger) = &self.ledger {
            let cutoff = chrono::Duration::from_std(self.retention)
                .map(|retention| Utc::now() - retention)
                .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
            match tokio::time::timeout(self.ledger_timeout, ledger.purge_deliveries(cutoff)).await
            {
                Ok(Ok(purged)) => debug!(purged, "purged expired ledger deliveries"),
                Ok(Err(e)) => warn!(error = %e, "failed to purge dedup ledger"),
                Err(_) => warn!("dedup ledger purge timed out"),
            }
        }

        removed
    }

    // The entry guard is a shard lock; it is released before any await.
    fn claim_in_memory(&self, message_id: &str) -> bool {
        let now = Instant::now();
        match self.claims.entry(message_id.to_string()) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) >= self.retention {
                    entry.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    fn sweep_memory(&self) -> usize {
        let now = Instant::now();
        let before = self.claims.len();
        self.claims
            .retain(|_, claimed| now.duration_since(*claimed) < self.retention);
        before.saturating_sub(self.claims.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealerline_test_utils::MemoryStorage;

    #[tokio::test]
    async fn first_claim_wins() {
        let lock = DeliveryLock::new(Duration::from_secs(60));
        assert!(lock.acquire("SM1").await);
        assert!(!lock.acquire("SM1").await);
        assert!(lock.acquire("SM2").await);
        assert_eq!(lock.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_claims_yield_exactly_one_winner() {
        let lock = Arc::new(DeliveryLock::new(Duration::from_secs(60)));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let lock = Arc::clone(&lock);
            handles.push(tokio::spawn(async move { lock.acquire("SMrace").await }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn claim_expires_after_retention() {
        let lock = DeliveryLock::new(Duration::from_secs(10));
        assert!(lock.acquire("SM1").await);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!lock.acquire("SM1").await);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(lock.acquire("SM1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired_entries() {
        let lock = DeliveryLock::new(Duration::from_secs(10));
        lock.acquire("old").await;
        tokio::time::advance(Duration::from_secs(11)).await;
        lock.acquire("fresh").await;

        assert_eq!(lock.purge_expired().await, 1);
        assert_eq!(lock.len(), 1);
        assert!(!lock.acquire("fresh").await);
    }

    #[tokio::test]
    async fn ledger_survives_a_new_lock_instance() {
        let storage = Arc::new(MemoryStorage::new());
        let first = DeliveryLock::new(Duration::from_secs(60))
            .with_ledger(storage.clone(), Duration::from_millis(500));
        assert!(first.acquire("SM1").await);

        let after_restart = DeliveryLock::new(Duration::from_secs(60))
            .with_ledger(storage, Duration::from_millis(500));
        assert!(!after_restart.acquire("SM1").await);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn unreachable_ledger_fails_open() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_claims_failing(true);
        let lock = DeliveryLock::new(Duration::from_secs(60))
            .with_ledger(storage, Duration::from_millis(500));

        assert!(lock.acquire("SM1").await);
        assert!(logs_contain("dedup ledger unavailable"));
        // The in-memory claim still dedups within this process.
        assert!(!lock.acquire("SM1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_ledger_fails_open() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_claim_delay(Some(Duration::from_secs(5))).await;
        let lock = DeliveryLock::new(Duration::from_secs(60))
            .with_ledger(storage, Duration::from_millis(100));

        assert!(lock.acquire("SM1").await);
    }

    #[tokio::test]
    async fn non_durable_config_skips_ledger() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_claims_failing(true);
        let config = DedupConfig {
            durable: false,
            ..DedupConfig::default()
        };
        let lock = DeliveryLock::from_config(&config, storage);
        assert!(lock.ledger.is_none());
        assert!(lock.acquire("SM1").await);
    }
}
