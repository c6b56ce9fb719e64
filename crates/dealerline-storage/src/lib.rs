// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the Dealerline pipeline.
//!
//! WAL-mode SQLite with embedded migrations, a single-writer model via
//! `tokio-rusqlite`, typed query modules, and the [`TurnWriter`] that
//! enforces the user-then-assistant write order of a reply cycle.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;
pub mod writer;

pub use adapter::SqliteStorage;
pub use database::Database;
pub use writer::{TurnWriter, WriterConfig};
