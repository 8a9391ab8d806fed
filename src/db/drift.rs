//! Drift detection and structural repair.
//!
//! Some installations reached a table shape that the version ledger does not
//! explain (older code paths created tables directly with narrower `CHECK`
//! constraints, or widened a table with `ALTER TABLE` and never gained its
//! table-level constraints). Each [`DriftCheck`] looks for marker text of a
//! legacy definition, or for missing canonical constraint text, and when
//! found rebuilds the table into its canonical shape:
//! create replacement, copy rows (mapping retired enum values), drop the
//! original, rename the replacement into place. The rebuild is one
//! transaction with foreign-key enforcement suspended around it.

use rusqlite::{params, Connection};

use super::introspect::TableDescriptor;
use super::schema::{TableSpec, PAYMENTS, TOOTH_TREATMENTS};
use super::DatabaseError;

/// A retired enum value and its nearest valid successor.
#[derive(Debug, Clone, Copy)]
pub struct ValueMapping {
    pub column: &'static str,
    pub from: &'static str,
    pub to: &'static str,
}

#[derive(Debug)]
pub struct DriftCheck {
    pub spec: &'static TableSpec,
    /// Any of these (case/whitespace-insensitive) in the stored definition
    /// means the table still carries a legacy constraint.
    pub markers: &'static [&'static str],
    /// Constraint text the canonical definition carries. Missing any of it
    /// means the table was widened by `ALTER TABLE` and never rebuilt.
    pub required: &'static [&'static str],
    pub mappings: &'static [ValueMapping],
}

pub static DRIFT_CHECKS: &[DriftCheck] = &[
    DriftCheck {
        spec: &TOOTH_TREATMENTS,
        markers: &["between 11 and 48", "'done'", "'on_hold'"],
        required: &[],
        mappings: &[
            ValueMapping { column: "status", from: "pending", to: "planned" },
            ValueMapping { column: "status", from: "done", to: "completed" },
            ValueMapping { column: "status", from: "on_hold", to: "planned" },
        ],
    },
    DriftCheck {
        spec: &PAYMENTS,
        markers: &["'overdue'"],
        required: &["CHECK (tooth_treatment_id IS NULL OR lab_order_id IS NULL)"],
        mappings: &[
            ValueMapping { column: "status", from: "overdue", to: "pending" },
            ValueMapping { column: "status", from: "paid", to: "completed" },
        ],
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairRecord {
    pub table: String,
    pub rows_copied: usize,
}

#[derive(Debug, Default)]
pub struct DriftOutcome {
    pub repaired: Vec<RepairRecord>,
    /// One `RepairFailed` per table whose rebuild was rolled back.
    pub failed: Vec<DatabaseError>,
}

/// Returns the table's descriptor when it shows drift, `None` when the table
/// is absent or already in shape.
pub fn detect(conn: &Connection, check: &DriftCheck) -> Result<Option<TableDescriptor>, DatabaseError> {
    let Some(descriptor) = TableDescriptor::load(conn, check.spec.name)? else {
        return Ok(None);
    };
    let drifted = check.markers.iter().any(|m| descriptor.definition_contains(m))
        || check.required.iter().any(|r| !descriptor.definition_contains(r));
    Ok(drifted.then_some(descriptor))
}

/// Run every registered check. Never fails: problems are collected in the
/// outcome for the caller to report.
pub fn repair_drift(conn: &Connection) -> DriftOutcome {
    run_checks(conn, DRIFT_CHECKS)
}

pub(crate) fn run_checks(conn: &Connection, checks: &[DriftCheck]) -> DriftOutcome {
    let mut outcome = DriftOutcome::default();
    for check in checks {
        let table = check.spec.name;
        let descriptor = match detect(conn, check) {
            Ok(Some(d)) => d,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(table, error = %e, "Drift detection failed");
                outcome.failed.push(repair_failed(table, e));
                continue;
            }
        };

        tracing::warn!(table, "Legacy table definition detected, rebuilding");
        match rebuild_table(conn, check, &descriptor) {
            Ok(rows_copied) => {
                tracing::info!(table, rows_copied, "Rebuilt table into current shape");
                outcome.repaired.push(RepairRecord {
                    table: table.to_string(),
                    rows_copied,
                });
            }
            Err(e) => {
                tracing::error!(table, error = %e, "Table rebuild failed, left unchanged");
                outcome.failed.push(repair_failed(table, e));
            }
        }
    }
    outcome
}

fn repair_failed(table: &str, e: DatabaseError) -> DatabaseError {
    match e {
        DatabaseError::RepairFailed { .. } => e,
        other => DatabaseError::RepairFailed {
            table: table.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Rebuild `check.spec` from `descriptor`. Foreign keys are switched off for
/// the duration and restored to their previous setting on every path.
pub fn rebuild_table(
    conn: &Connection,
    check: &DriftCheck,
    descriptor: &TableDescriptor,
) -> Result<usize, DatabaseError> {
    let fk_was_on: bool = conn.query_row("PRAGMA foreign_keys", [], |row| row.get::<_, i64>(0))? != 0;
    // Has no effect inside a transaction, so it brackets the rebuild transaction.
    conn.pragma_update(None, "foreign_keys", false)?;
    let result = rebuild_in_transaction(conn, check, descriptor);
    let restored = conn.pragma_update(None, "foreign_keys", fk_was_on);

    let rows = result?;
    restored?;
    Ok(rows)
}

fn rebuild_in_transaction(
    conn: &Connection,
    check: &DriftCheck,
    descriptor: &TableDescriptor,
) -> Result<usize, DatabaseError> {
    let spec = check.spec;
    let table = spec.name;
    let replacement = format!("{table}__rebuild");

    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(&format!("DROP TABLE IF EXISTS {replacement}"))?;
    tx.execute_batch(&spec.create_sql_as(&replacement))?;

    let target = TableDescriptor::load(&tx, &replacement)?.ok_or_else(|| DatabaseError::RepairFailed {
        table: table.to_string(),
        reason: "replacement table was not created".into(),
    })?;
    let common: Vec<&str> = target
        .column_names()
        .into_iter()
        .filter(|c| descriptor.has_column(c))
        .collect();
    let select_list = common
        .iter()
        .map(|c| column_expr(c, check.mappings))
        .collect::<Vec<_>>()
        .join(", ");
    let insert_list = common
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");

    let copied = tx.execute(
        &format!("INSERT INTO {replacement} ({insert_list}) SELECT {select_list} FROM {table}"),
        [],
    )?;
    tx.execute_batch(&format!("DROP TABLE {table}"))?;
    tx.execute_batch(&format!("ALTER TABLE {replacement} RENAME TO {table}"))?;
    for index in spec.indexes {
        tx.execute_batch(index)?;
    }

    let violations: i64 = tx.query_row(
        "SELECT COUNT(*) FROM pragma_foreign_key_check(?1)",
        params![table],
        |row| row.get(0),
    )?;
    if violations > 0 {
        return Err(DatabaseError::RepairFailed {
            table: table.to_string(),
            reason: format!("{violations} rows would violate foreign keys"),
        });
    }

    tx.commit()?;
    Ok(copied)
}

/// Select expression for one column, translating retired values.
fn column_expr(column: &str, mappings: &[ValueMapping]) -> String {
    let arms: Vec<String> = mappings
        .iter()
        .filter(|m| m.column == column)
        .map(|m| format!("WHEN '{}' THEN '{}'", m.from, m.to))
        .collect();
    if arms.is_empty() {
        format!("\"{column}\"")
    } else {
        format!("CASE \"{column}\" {} ELSE \"{column}\" END", arms.join(" "))
    }
}
