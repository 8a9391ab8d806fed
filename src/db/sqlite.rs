//! Connection manager.
//!
//! Owns the single SQLite handle. Every (re)open applies the durability
//! pragmas; every exposed operation goes through `ensure_connection`, which
//! transparently reopens a closed or broken handle. Writes run in a
//! transaction and are followed by a WAL checkpoint before returning.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, Transaction};

use super::guard::SchemaGuard;
use super::schema::TableSpec;
use super::startup::{self, StartupReport};
use super::DatabaseError;

const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    File(PathBuf),
    /// Private in-memory database. Reopening it starts from an empty store.
    Memory,
}

pub struct Database {
    location: StorageLocation,
    conn: Option<Connection>,
    guard: SchemaGuard,
}

impl Database {
    /// Open (creating if needed) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_location(StorageLocation::File(path))
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::with_location(StorageLocation::Memory)
    }

    fn with_location(location: StorageLocation) -> Result<Self, DatabaseError> {
        let conn = open_connection(&location)?;
        Ok(Self {
            location,
            conn: Some(conn),
            guard: SchemaGuard::new(),
        })
    }

    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// `true` when a handle is open and answers a trivial query.
    pub fn is_healthy(&self) -> bool {
        self.conn
            .as_ref()
            .is_some_and(|c| c.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok())
    }

    /// Flush the WAL and release the handle. Later operations reopen it.
    pub fn close(&mut self) -> Result<(), DatabaseError> {
        self.guard.reset();
        if let Some(conn) = self.conn.take() {
            if let Err(e) = checkpoint(&conn) {
                tracing::warn!(error = %e, "Checkpoint before close failed");
            }
            conn.close().map_err(|(_, e)| DatabaseError::Sqlite(e))?;
            tracing::info!("Database closed");
        }
        Ok(())
    }

    /// Close and reopen the same location, re-applying pragmas.
    pub fn reinitialize(&mut self) -> Result<(), DatabaseError> {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Closing old handle failed during reinitialize");
        }
        self.conn = Some(open_connection(&self.location)?);
        tracing::info!(location = ?self.location, "Database reinitialized");
        Ok(())
    }

    /// The live handle, reopening it first if it is closed or unhealthy.
    pub fn ensure_connection(&mut self) -> Result<&mut Connection, DatabaseError> {
        if !self.is_healthy() {
            tracing::warn!("Database handle unavailable, reinitializing");
            self.reinitialize()?;
        }
        self.conn
            .as_mut()
            .ok_or_else(|| DatabaseError::ConnectionUnavailable("no open handle".into()))
    }

    /// Run migrations and drift repair. Problems are reported, not raised;
    /// only an unreachable database is an error.
    pub fn prepare_schema(&mut self) -> Result<StartupReport, DatabaseError> {
        let conn = self.ensure_connection()?;
        let report = startup::prepare_schema(conn);
        if let Err(e) = checkpoint(conn) {
            tracing::warn!(error = %e, "Checkpoint after schema preparation failed");
        }
        Ok(report)
    }

    /// Run a read against `tables`, creating any of them that are missing.
    pub fn read<T>(
        &mut self,
        tables: &[&'static TableSpec],
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        self.ensure_connection()?;
        let Self { conn, guard, .. } = self;
        let conn = conn
            .as_ref()
            .ok_or_else(|| DatabaseError::ConnectionUnavailable("no open handle".into()))?;
        guard.require(conn, tables)?;
        f(conn)
    }

    /// Run `f` inside a transaction touching `tables`. Commits on success and
    /// checkpoints; rolls back on error.
    pub fn write<T>(
        &mut self,
        tables: &[&'static TableSpec],
        f: impl FnOnce(&Transaction<'_>) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        self.ensure_connection()?;
        let Self { conn, guard, .. } = self;
        let conn = conn
            .as_mut()
            .ok_or_else(|| DatabaseError::ConnectionUnavailable("no open handle".into()))?;
        guard.require(conn, tables)?;

        let tx = conn.transaction()?;
        let value = match f(&tx) {
            Ok(value) => value,
            Err(e) => {
                if let Err(rb) = tx.rollback() {
                    tracing::error!(error = %rb, "Rollback failed");
                } else {
                    tracing::debug!(error = %e, "Write rolled back");
                }
                return Err(e);
            }
        };
        tx.commit()?;

        if let Err(e) = checkpoint(conn) {
            tracing::warn!(error = %e, "Checkpoint after write failed; data is committed");
        }
        Ok(value)
    }
}

/// Open a file database, run migrations and drift repair.
pub fn open_database(path: &Path) -> Result<(Database, StartupReport), DatabaseError> {
    let mut db = Database::open(path)?;
    let report = db.prepare_schema()?;
    Ok((db, report))
}

/// Open an in-memory database and prepare its schema (for testing).
pub fn open_memory_database() -> Result<(Database, StartupReport), DatabaseError> {
    let mut db = Database::open_in_memory()?;
    let report = db.prepare_schema()?;
    Ok((db, report))
}

/// A bare, fully migrated in-memory connection (for testing components).
pub fn open_memory_connection() -> Result<Connection, DatabaseError> {
    let conn = open_connection(&StorageLocation::Memory)?;
    startup::prepare_schema(&conn);
    Ok(conn)
}

fn open_connection(location: &StorageLocation) -> Result<Connection, DatabaseError> {
    let conn = match location {
        StorageLocation::File(path) => Connection::open(path),
        StorageLocation::Memory => Connection::open_in_memory(),
    }
    .map_err(|e| DatabaseError::ConnectionUnavailable(format!("{location:?}: {e}")))?;
    configure_pragmas(&conn)?;
    log_effective_pragmas(&conn);
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(
        "PRAGMA foreign_keys=ON;
         PRAGMA synchronous=FULL;",
    )?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    Ok(())
}

fn log_effective_pragmas(conn: &Connection) {
    let journal_mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .unwrap_or_else(|_| "unknown".into());
    let foreign_keys: i64 = conn
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .unwrap_or(-1);
    let sqlite_version: String = conn
        .query_row("SELECT sqlite_version()", [], |row| row.get(0))
        .unwrap_or_else(|_| "unknown".into());

    tracing::info!(%sqlite_version, %journal_mode, foreign_keys, "Database opened");
    if !journal_mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(%journal_mode, "journal_mode != WAL; running with reduced crash safety");
    }
}

/// Force the WAL into the main file so a crash right after a write cannot
/// lose it.
pub fn checkpoint(conn: &Connection) -> Result<(), DatabaseError> {
    let (busy, log_frames, checkpointed): (i64, i64, i64) = conn.query_row(
        "PRAGMA wal_checkpoint(TRUNCATE)",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    if busy != 0 {
        tracing::warn!(log_frames, checkpointed, "WAL checkpoint could not complete");
    }
    Ok(())
}
