// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn persistence. Turns are append-only; read-back order is
//! `(created_at, rowid)`, so insertion order breaks timestamp ties.

use dealerline_core::DealerlineError;
use dealerline_core::types::{Role, Turn, format_timestamp, parse_timestamp};
use rusqlite::{Row, params};

use crate::database::{Database, map_tr_err};
use crate::queries::parse_column;

fn from_row(row: &Row<'_>) -> rusqlite::Result<Turn> {
    Ok(Turn {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: parse_column(2, row.get(2)?)?,
        content: row.get(3)?,
        tool_name: row.get(4)?,
        created_at: parse_timestamp(&row.get::<_, String>(5)?),
    })
}

/// Inserts a turn and updates the owning conversation's counters and
/// `awaiting_reply` flag in one transaction.
///
/// Appending a turn id that already exists is a no-op, so a write retried
/// after an ambiguous timeout cannot double-count.
pub async fn append(db: &Database, turn: &Turn, awaiting_reply: bool) -> Result<(), DealerlineError> {
    let t = turn.clone();
    let found = db
        .connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction()?;
            let (user_inc, assistant_inc) = match t.role {
                Role::User => (1, 0),
                Role::Assistant => (0, 1),
            };
            let created_at = format_timestamp(&t.created_at);
            let updated = tx.execute(
                "UPDATE conversations
                 SET user_turns = user_turns + ?2,
                     assistant_turns = assistant_turns + ?3,
                     awaiting_reply = ?4,
                     updated_at = ?5
                 WHERE id = ?1",
                params![t.conversation_id, user_inc, assistant_inc, awaiting_reply, created_at],
            )?;
            if updated == 0 {
                return Ok(false);
            }
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO turns (id, conversation_id, role, content, tool_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    t.id,
                    t.conversation_id,
                    t.role.to_string(),
                    t.content,
                    t.tool_name,
                    created_at,
                ],
            )?;
            if inserted == 1 {
                tx.commit()?;
            }
            // Dropping the transaction rolls back the counter update.
            Ok(true)
        })
        .await
        .map_err(map_tr_err)?;

    if !found {
        return Err(DealerlineError::NotFound {
            entity: "conversation".into(),
            id: turn.conversation_id.clone(),
        });
    }
    Ok(())
}

/// Turns of a conversation in persisted order; with `last`, only the most
/// recent `last` of them (still oldest first).
pub async fn list(
    db: &Database,
    conversation_id: &str,
    last: Option<usize>,
) -> Result<Vec<Turn>, DealerlineError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Turn>, rusqlite::Error> {
            let turns = match last {
                Some(n) => {
                    let mut stmt = conn.prepare(
                        "SELECT id, conversation_id, role, content, tool_name, created_at FROM (
                             SELECT id, conversation_id, role, content, tool_name, created_at, rowid AS seq
                             FROM turns WHERE conversation_id = ?1
                             ORDER BY created_at DESC, rowid DESC LIMIT ?2
                         ) ORDER BY created_at, seq",
                    )?;
                    let limit = i64::try_from(n).unwrap_or(i64::MAX);
                    stmt.query_map(params![conversation_id, limit], from_row)?
                        .collect::<Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT id, conversation_id, role, content, tool_name, created_at
                         FROM turns WHERE conversation_id = ?1
                         ORDER BY created_at, rowid",
                    )?;
                    stmt.query_map(params![conversation_id], from_row)?
                        .collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok(turns)
        })
        .await
        .map_err(map_tr_err)
}
