// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation CRUD operations.

use chrono::Utc;
use dealerline_core::DealerlineError;
use dealerline_core::types::{Conversation, ConversationFilter, format_timestamp, parse_timestamp};
use rusqlite::types::Value;
use rusqlite::{Row, params, params_from_iter};

use crate::database::{Database, map_tr_err};
use crate::queries::parse_column;

const COLUMNS: &str = "id, sender, lead_id, status, user_turns, assistant_turns, \
     resulted_in_appointment, awaiting_reply, created_at, updated_at";

/// Default and maximum page size for listings.
pub const DEFAULT_PAGE: u32 = 50;
pub const MAX_PAGE: u32 = 200;

fn from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        sender: row.get(1)?,
        lead_id: row.get(2)?,
        status: parse_column(3, row.get(3)?)?,
        user_turns: row.get(4)?,
        assistant_turns: row.get(5)?,
        resulted_in_appointment: row.get(6)?,
        awaiting_reply: row.get(7)?,
        created_at: parse_timestamp(&row.get::<_, String>(8)?),
        updated_at: parse_timestamp(&row.get::<_, String>(9)?),
    })
}

pub async fn insert(db: &Database, conversation: &Conversation) -> Result<(), DealerlineError> {
    let c = conversation.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!("INSERT INTO conversations ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
                params![
                    c.id,
                    c.sender,
                    c.lead_id,
                    c.status.to_string(),
                    c.user_turns,
                    c.assistant_turns,
                    c.resulted_in_appointment,
                    c.awaiting_reply,
                    format_timestamp(&c.created_at),
                    format_timestamp(&c.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: &str) -> Result<Option<Conversation>, DealerlineError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Conversation>, rusqlite::Error> {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM conversations WHERE id = ?1"))?;
            match stmt.query_row(params![id], from_row) {
                Ok(c) => Ok(Some(c)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// The active conversation for a sender, if one exists.
pub async fn find_active(
    db: &Database,
    sender: &str,
) -> Result<Option<Conversation>, DealerlineError> {
    let sender = sender.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Conversation>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM conversations WHERE sender = ?1 AND status = 'active'"
            ))?;
            match stmt.query_row(params![sender], from_row) {
                Ok(c) => Ok(Some(c)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Lists conversations, most recently updated first.
pub async fn list(
    db: &Database,
    filter: &ConversationFilter,
) -> Result<Vec<Conversation>, DealerlineError> {
    let mut clauses = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(status) = filter.status {
        values.push(Value::Text(status.to_string()));
        clauses.push(format!("status = ?{}", values.len()));
    }
    if let Some(appointment) = filter.resulted_in_appointment {
        values.push(Value::Integer(i64::from(appointment)));
        clauses.push(format!("resulted_in_appointment = ?{}", values.len()));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let limit = filter.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    values.push(Value::Integer(i64::from(limit)));
    values.push(Value::Integer(i64::from(filter.offset.unwrap_or(0))));
    let sql = format!(
        "SELECT {COLUMNS} FROM conversations {where_sql} \
         ORDER BY updated_at DESC, id LIMIT ?{} OFFSET ?{}",
        values.len() - 1,
        values.len()
    );

    db.connection()
        .call(move |conn| -> Result<Vec<Conversation>, rusqlite::Error> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_awaiting_reply(db: &Database) -> Result<Vec<Conversation>, DealerlineError> {
    db.connection()
        .call(|conn| -> Result<Vec<Conversation>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM conversations WHERE awaiting_reply = 1 ORDER BY updated_at"
            ))?;
            let rows = stmt.query_map([], from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Runs a single-row UPDATE; a missing row becomes `NotFound`.
async fn update_one(
    db: &Database,
    id: &str,
    sql: &'static str,
    extra: Option<String>,
) -> Result<(), DealerlineError> {
    let id_owned = id.to_string();
    let now = format_timestamp(&Utc::now());
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            match extra {
                Some(value) => conn.execute(sql, params![id_owned, now, value]),
                None => conn.execute(sql, params![id_owned, now]),
            }
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(DealerlineError::NotFound {
            entity: "conversation".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub async fn mark_appointment(db: &Database, id: &str) -> Result<(), DealerlineError> {
    update_one(
        db,
        id,
        "UPDATE conversations SET resulted_in_appointment = 1, updated_at = ?2 WHERE id = ?1",
        None,
    )
    .await
}

pub async fn link_lead(db: &Database, id: &str, lead_id: &str) -> Result<(), DealerlineError> {
    update_one(
        db,
        id,
        "UPDATE conversations SET lead_id = ?3, updated_at = ?2 WHERE id = ?1",
        Some(lead_id.to_string()),
    )
    .await
}

pub async fn close(db: &Database, id: &str) -> Result<(), DealerlineError> {
    update_one(
        db,
        id,
        "UPDATE conversations SET status = 'closed', updated_at = ?2 WHERE id = ?1",
        None,
    )
    .await
}
