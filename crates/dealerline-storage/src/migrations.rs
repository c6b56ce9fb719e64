// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded refinery migrations, applied on every open.

use dealerline_core::DealerlineError;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Run all pending migrations against the given connection.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), DealerlineError> {
    embedded::migrations::runner()
        .run(conn)
        .map_err(DealerlineError::storage)?;
    Ok(())
}
