// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead persistence.

use dealerline_core::{DealerlineError, LeadMerge};
use dealerline_core::types::{Attribution, Lead, format_timestamp, parse_timestamp};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};

use crate::database::{Database, map_tr_err};
use crate::queries::parse_column;

const COLUMNS: &str =
    "id, name, phone, email, interest, attribution, score, priority, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Lead> {
    let attribution_json: String = row.get(5)?;
    let attribution: Attribution = serde_json::from_str(&attribution_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    Ok(Lead {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        email: row.get(3)?,
        interest: row.get(4)?,
        attribution,
        score: row.get(6)?,
        priority: parse_column(7, row.get(7)?)?,
        created_at: parse_timestamp(&row.get::<_, String>(8)?),
        updated_at: parse_timestamp(&row.get::<_, String>(9)?),
    })
}

pub async fn find_by_phone(db: &Database, phone: &str) -> Result<Option<Lead>, DealerlineError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Lead>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM leads WHERE phone = ?1"))?;
            match stmt.query_row(params![phone], from_row) {
                Ok(lead) => Ok(Some(lead)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: &str) -> Result<Option<Lead>, DealerlineError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Lead>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM leads WHERE id = ?1"))?;
            match stmt.query_row(params![id], from_row) {
                Ok(lead) => Ok(Some(lead)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Inserts the lead or overwrites the row with the same id. `created_at`
/// of an existing row is never changed.
pub async fn save(db: &Database, lead: &Lead) -> Result<(), DealerlineError> {
    let lead = lead.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> { write(conn, &lead) })
        .await
        .map_err(map_tr_err)
}

/// Looks up the lead sharing `candidate`'s phone and writes either the
/// candidate or the merged record, in one transaction.
pub async fn upsert_by_phone(
    db: &Database,
    candidate: Lead,
    merge: LeadMerge,
) -> Result<Lead, DealerlineError> {
    db.connection()
        .call(move |conn| -> Result<Lead, rusqlite::Error> {
            let tx = conn.transaction()?;
            let existing = match candidate.phone.as_deref() {
                Some(phone) => {
                    let mut stmt =
                        tx.prepare(&format!("SELECT {COLUMNS} FROM leads WHERE phone = ?1"))?;
                    match stmt.query_row(params![phone], from_row) {
                        Ok(lead) => Some(lead),
                        Err(rusqlite::Error::QueryReturnedNoRows) => None,
                        Err(e) => return Err(e),
                    }
                }
                None => None,
            };
            let lead = match existing {
                Some(current) => merge(current),
                None => candidate,
            };
            write(&tx, &lead)?;
            tx.commit()?;
            Ok(lead)
        })
        .await
        .map_err(map_tr_err)
}

fn write(conn: &Connection, lead: &Lead) -> Result<(), rusqlite::Error> {
    let attribution = serde_json::to_string(&lead.attribution)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    conn.execute(
        &format!(
            "INSERT INTO leads ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 phone = excluded.phone,
                 email = excluded.email,
                 interest = excluded.interest,
                 attribution = excluded.attribution,
                 score = excluded.score,
                 priority = excluded.priority,
                 updated_at = excluded.updated_at"
        ),
        params![
            lead.id,
            lead.name,
            lead.phone,
            lead.email,
            lead.interest,
            attribution,
            lead.score,
            lead.priority.to_string(),
            format_timestamp(&lead.created_at),
            format_timestamp(&lead.updated_at),
        ],
    )?;
    Ok(())
}
