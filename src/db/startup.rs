//! Startup schema preparation: migrations, then drift repair.
//!
//! Nothing here fails the caller. Every problem becomes an entry in the
//! [`StartupReport`], which is logged once when preparation finishes.

use rusqlite::Connection;

use super::drift::{self, RepairRecord};
use super::{ledger, migrations, DatabaseError};

#[derive(Debug, Default)]
pub struct StartupReport {
    /// Ledger maximum after preparation, `None` when the ledger could not be
    /// read.
    pub schema_version: Option<i64>,
    pub applied_migrations: Vec<i64>,
    pub repaired_tables: Vec<RepairRecord>,
    /// Non-fatal problems, in the order they happened.
    pub issues: Vec<DatabaseError>,
}

impl StartupReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    fn log(&self) {
        if self.issues.is_empty() {
            tracing::info!(
                schema_version = ?self.schema_version,
                applied = ?self.applied_migrations,
                repaired = self.repaired_tables.len(),
                "Database schema ready"
            );
            return;
        }
        for issue in &self.issues {
            tracing::warn!(error = %issue, "Startup schema step skipped");
        }
        tracing::warn!(
            schema_version = ?self.schema_version,
            applied = ?self.applied_migrations,
            repaired = self.repaired_tables.len(),
            issues = self.issues.len(),
            "Database schema ready with skipped steps"
        );
    }
}

/// Bring the schema up to date. Always returns; never panics or errors.
pub fn prepare_schema(conn: &Connection) -> StartupReport {
    let mut report = StartupReport::default();

    match migrations::run_migrations(conn) {
        Ok(outcome) => {
            report.applied_migrations = outcome.applied;
            report.issues.extend(outcome.failed);
        }
        Err(e) => report.issues.push(ledger_unavailable(e)),
    }

    let repairs = drift::repair_drift(conn);
    report.repaired_tables = repairs.repaired;
    report.issues.extend(repairs.failed);

    report.schema_version = match ledger::current_version(conn) {
        Ok(version) => Some(version),
        Err(e) => {
            report.issues.push(ledger_unavailable(e));
            None
        }
    };
    report.log();
    report
}

/// Version 0 stands for the ledger itself rather than a migration step.
fn ledger_unavailable(e: DatabaseError) -> DatabaseError {
    DatabaseError::MigrationFailed {
        version: 0,
        reason: format!("ledger unavailable: {e}"),
    }
}
