// src/history/schema.rs

//! History database schema and migrations

use crate::error::Result;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version: Option<i32> = conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("History schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying history migration to version {}", version);
        match version {
            1 => migrate_v1(conn)?,
            2 => migrate_v2(conn)?,
            _ => unreachable!("no migration for version {}", version),
        }
        set_schema_version(conn, version)?;
    }

    Ok(())
}

/// Initial schema - Version 1
///
/// - transactions: one row per executed transaction
/// - transaction_items: every item, in execution order, with its outcome
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE transactions (
            id INTEGER PRIMARY KEY,
            start_epoch INTEGER NOT NULL,
            end_epoch INTEGER NOT NULL,
            state TEXT NOT NULL CHECK(state IN ('DONE', 'FAILED', 'CANCELED'))
        );

        CREATE TABLE transaction_items (
            transaction_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            arch TEXT NOT NULL,
            evr TEXT NOT NULL,
            repo TEXT NOT NULL,
            action TEXT NOT NULL,
            reason TEXT NOT NULL,
            outcome TEXT NOT NULL CHECK(outcome IN ('APPLIED', 'FAILED', 'UNATTEMPTED')),
            previous_evr TEXT,
            cause TEXT,
            PRIMARY KEY (transaction_id, position),
            FOREIGN KEY (transaction_id) REFERENCES transactions(id) ON DELETE CASCADE
        );
        ",
    )?;
    Ok(())
}

/// Schema Version 2: index for time-range queries and per-package lookups
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE INDEX idx_transactions_start ON transactions(start_epoch);
        CREATE INDEX idx_transaction_items_name ON transaction_items(name);
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'transaction%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }
}
