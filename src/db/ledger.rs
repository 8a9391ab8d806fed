//! Schema version ledger.
//!
//! `schema_version` is append-only: one row per applied migration, written
//! in the same transaction as the migration body. Failed steps are recorded
//! separately in `schema_version_skipped` so they are never retried
//! automatically.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use super::introspect::table_exists;
use super::DatabaseError;
use crate::models::TIMESTAMP_FORMAT;

pub fn ensure_ledger(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT (datetime('now'))
        );
        CREATE TABLE IF NOT EXISTS schema_version_skipped (
            version INTEGER PRIMARY KEY,
            failed_at TIMESTAMP NOT NULL DEFAULT (datetime('now')),
            reason TEXT NOT NULL
        );",
    )?;
    Ok(())
}

/// Highest applied version, 0 when nothing (or no ledger) exists yet. A
/// ledger that exists but cannot be read is an error.
pub fn current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    if !table_exists(conn, "schema_version")? {
        return Ok(0);
    }
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(version)
}

pub fn applied_versions(conn: &Connection) -> Result<Vec<i64>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT version FROM schema_version ORDER BY version")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(versions)
}

pub fn skipped_versions(conn: &Connection) -> Result<Vec<i64>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT version FROM schema_version_skipped ORDER BY version")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(versions)
}

pub fn record_applied(conn: &Connection, version: i64, at: NaiveDateTime) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        params![version, at.format(TIMESTAMP_FORMAT).to_string()],
    )?;
    Ok(())
}

pub fn record_skipped(
    conn: &Connection,
    version: i64,
    reason: &str,
    at: NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_version_skipped (version, failed_at, reason) VALUES (?1, ?2, ?3)",
        params![version, at.format(TIMESTAMP_FORMAT).to_string(), reason],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-03-01 09:00:00", TIMESTAMP_FORMAT).unwrap()
    }

    #[test]
    fn absent_ledger_reads_as_zero() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(current_version(&conn).unwrap(), 0);
    }

    #[test]
    fn unreadable_ledger_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE schema_version (applied TEXT)").unwrap();
        assert!(current_version(&conn).is_err());
    }

    #[test]
    fn versions_are_unique() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_ledger(&conn).unwrap();
        record_applied(&conn, 1, now()).unwrap();
        record_applied(&conn, 3, now()).unwrap();
        assert!(record_applied(&conn, 3, now()).is_err());
        assert_eq!(current_version(&conn).unwrap(), 3);
        assert_eq!(applied_versions(&conn).unwrap(), vec![1, 3]);
    }

    #[test]
    fn skipped_versions_are_recorded_once() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_ledger(&conn).unwrap();
        record_skipped(&conn, 2, "no such table", now()).unwrap();
        record_skipped(&conn, 2, "no such table", now()).unwrap();
        assert_eq!(skipped_versions(&conn).unwrap(), vec![2]);
        assert_eq!(current_version(&conn).unwrap(), 0);
    }
}
