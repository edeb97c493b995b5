//! SQLite schema for Voxlog

use rusqlite::{Connection, Result};

/// Initialize the database with required tables
pub fn init_db(conn: &Connection) -> Result<()> {
    // One row per presence session. elapsed_ms is NULL while the session is open.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            scope TEXT NOT NULL,
            title TEXT,
            start_time TEXT NOT NULL,
            elapsed_ms INTEGER CHECK (elapsed_ms IS NULL OR elapsed_ms >= 0),
            opened_by TEXT NOT NULL CHECK (opened_by IN ('manual', 'automatic')),
            closed_by TEXT CHECK (closed_by IN ('manual', 'automatic')),
            created_at TEXT NOT NULL,
            closed_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_scope_start
            ON sessions(scope, start_time DESC)",
        [],
    )?;

    Ok(())
}
