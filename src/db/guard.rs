//! Lazy table/column guard.
//!
//! Migrations only run once per process start, and some installations skipped
//! migrations entirely. Any access path that touches a late-added table asks
//! the guard first. Checks are idempotent and memoized for the lifetime of the
//! connection, so repeated calls cost a hash lookup.

use std::collections::HashSet;

use rusqlite::Connection;

use super::introspect::{column_exists, table_exists};
use super::schema::TableSpec;
use super::DatabaseError;

/// Create `table` with `ddl` unless it already exists. Returns `true` when the
/// table was created.
pub fn ensure_table_exists(conn: &Connection, table: &str, ddl: &str) -> Result<bool, DatabaseError> {
    if table_exists(conn, table)? {
        return Ok(false);
    }
    conn.execute_batch(ddl)?;
    tracing::info!(table, "Created missing table");
    Ok(true)
}

/// Add `column` to `table` unless it already exists. Returns `true` when the
/// column was added. A concurrent "duplicate column" is treated as success.
pub fn ensure_column_exists(
    conn: &Connection,
    table: &str,
    column: &str,
    decl: &str,
    default: Option<&str>,
) -> Result<bool, DatabaseError> {
    if column_exists(conn, table, column)? {
        return Ok(false);
    }
    let sql = match default {
        Some(value) => format!("ALTER TABLE {table} ADD COLUMN {column} {decl} DEFAULT {value}"),
        None => format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"),
    };
    match conn.execute_batch(&sql) {
        Ok(()) => {
            tracing::info!(table, column, "Added missing column");
            Ok(true)
        }
        Err(e) if e.to_string().contains("duplicate column name") => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Create a table from its spec, add any late columns and its indexes.
/// Returns `true` when anything was changed.
pub fn ensure_spec(conn: &Connection, spec: &TableSpec) -> Result<bool, DatabaseError> {
    let mut changed = ensure_table_exists(conn, spec.name, &spec.create_sql())?;
    for col in spec.late_columns {
        changed |= ensure_column_exists(conn, spec.name, col.name, col.decl, col.default)?;
    }
    for index in spec.indexes {
        conn.execute_batch(index)?;
    }
    Ok(changed)
}

/// Memoizing front for [`ensure_spec`].
#[derive(Debug, Default)]
pub struct SchemaGuard {
    ensured: HashSet<&'static str>,
}

impl SchemaGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure every table in `specs` exists in its current shape.
    pub fn require(&mut self, conn: &Connection, specs: &[&'static TableSpec]) -> Result<(), DatabaseError> {
        for spec in specs {
            if self.ensured.contains(spec.name) {
                continue;
            }
            ensure_spec(conn, spec)?;
            self.ensured.insert(spec.name);
        }
        Ok(())
    }

    pub fn is_ensured(&self, table: &str) -> bool {
        self.ensured.contains(table)
    }

    /// Forget everything; the next `require` re-inspects the schema.
    pub fn reset(&mut self) {
        self.ensured.clear();
    }
}
