//! `SQLite`-backed implementations of [`ExecutionLedger`](crate::ExecutionLedger)
//! and [`ManifestTable`](crate::ManifestTable).
//!
//! Each client owns a single `Mutex<Connection>` for thread safety.

mod ledger;
mod manifest;

use std::path::Path;

use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;

use crate::error::{self, StateError};

pub use ledger::SqliteLedger;
pub use manifest::SqliteManifestTable;

/// `SQLite` datetime format (UTC, no timezone suffix).
const SQLITE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Open (creating parent directories) and initialize a database file.
fn open_with_schema(path: &Path, ddl: &str) -> error::Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path).map_err(|e| StateError::context("open", e))?;
    init_schema(&conn, ddl)?;
    Ok(conn)
}

/// Create and initialize an in-memory database.
fn in_memory_with_schema(ddl: &str) -> error::Result<Connection> {
    let conn = Connection::open_in_memory().map_err(|e| StateError::context("open", e))?;
    init_schema(&conn, ddl)?;
    Ok(conn)
}

fn init_schema(conn: &Connection, ddl: &str) -> error::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|e| StateError::context("init_schema: pragma", e))?;
    conn.execute_batch(ddl)
        .map_err(|e| StateError::context("init_schema: ddl", e))
}

/// Format current UTC time for `SQLite` storage.
fn now_sqlite() -> String {
    Utc::now().format(SQLITE_DATETIME_FMT).to_string()
}

/// Convert a `SQLite` datetime string to ISO-8601.
fn sqlite_to_iso8601(raw: &str) -> String {
    NaiveDateTime::parse_from_str(raw, SQLITE_DATETIME_FMT).map_or_else(
        |_| raw.to_string(),
        |ndt| format!("{}Z", ndt.format("%Y-%m-%dT%H:%M:%S")),
    )
}
