// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable ledger of processed provider message ids.

use chrono::{DateTime, Utc};
use dealerline_core::DealerlineError;
use dealerline_core::types::format_timestamp;
use rusqlite::params;

use crate::database::{Database, map_tr_err};

/// Claims `message_id`. Returns `true` only for the first claim.
pub async fn claim(
    db: &Database,
    message_id: &str,
    claimed_at: DateTime<Utc>,
) -> Result<bool, DealerlineError> {
    let message_id = message_id.to_string();
    let claimed_at = format_timestamp(&claimed_at);
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO processed_deliveries (message_id, claimed_at) VALUES (?1, ?2)",
                params![message_id, claimed_at],
            )?;
            Ok(inserted == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Deletes claims older than `cutoff`.
pub async fn purge(db: &Database, cutoff: DateTime<Utc>) -> Result<usize, DealerlineError> {
    let cutoff = format_timestamp(&cutoff);
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "DELETE FROM processed_deliveries WHERE claimed_at < ?1",
                params![cutoff],
            )
        })
        .await
        .map_err(map_tr_err)
}
