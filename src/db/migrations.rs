//! Versioned migration steps and the runner that applies them.
//!
//! Version number is the only ordering key. Every step body tolerates partial
//! prior application: tables are created with `IF NOT EXISTS` and columns
//! are added only after an existence check, so re-running a step is a no-op.

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::guard::{ensure_column_exists, ensure_spec, ensure_table_exists};
use super::schema::{
    TableSpec, CLINIC_NEEDS, LAB_ORDERS, MEDICATIONS, PATIENTS, PAYMENTS, SMART_ALERTS,
    TOOTH_TREATMENTS,
};
use super::{ledger, DatabaseError};

pub struct MigrationStep {
    pub version: i64,
    pub name: &'static str,
    pub apply: fn(&Connection) -> Result<(), DatabaseError>,
}

pub static MIGRATIONS: &[MigrationStep] = &[
    MigrationStep { version: 1, name: "core_tables", apply: migrate_core_tables },
    MigrationStep { version: 2, name: "lab_orders", apply: migrate_lab_orders },
    MigrationStep { version: 3, name: "treatment_priority", apply: migrate_treatment_priority },
    MigrationStep { version: 4, name: "treatment_balances", apply: migrate_treatment_balances },
    MigrationStep { version: 5, name: "smart_alerts", apply: migrate_smart_alerts },
    MigrationStep { version: 6, name: "inventory", apply: migrate_inventory },
    MigrationStep { version: 7, name: "payment_indexes", apply: migrate_payment_indexes },
];

pub fn latest_version() -> i64 {
    MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
}

/// What a runner pass did.
#[derive(Debug, Default)]
pub struct MigrationOutcome {
    pub applied: Vec<i64>,
    /// One `MigrationFailed` per step that failed and was recorded as skipped.
    pub failed: Vec<DatabaseError>,
}

/// Apply every pending step in ascending version order.
///
/// A failing step is rolled back, recorded as skipped and reported in the
/// outcome; the runner then moves on. Only a failure to create or read the
/// ledger itself is returned as `Err`.
pub fn run_migrations(conn: &Connection) -> Result<MigrationOutcome, DatabaseError> {
    run_steps(conn, MIGRATIONS)
}

pub(crate) fn run_steps(conn: &Connection, steps: &[MigrationStep]) -> Result<MigrationOutcome, DatabaseError> {
    ledger::ensure_ledger(conn)?;
    let current = ledger::current_version(conn)?;
    let skipped = ledger::skipped_versions(conn)?;

    let mut pending: Vec<&MigrationStep> = steps
        .iter()
        .filter(|s| s.version > current && !skipped.contains(&s.version))
        .collect();
    pending.sort_by_key(|s| s.version);

    let mut outcome = MigrationOutcome::default();
    for step in pending {
        tracing::info!(version = step.version, name = step.name, "Running migration");
        match apply_step(conn, step) {
            Ok(()) => outcome.applied.push(step.version),
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(version = step.version, name = step.name, error = %reason, "Migration failed, skipping");
                let now = chrono::Local::now().naive_local();
                if let Err(record_err) = ledger::record_skipped(conn, step.version, &reason, now) {
                    tracing::error!(version = step.version, error = %record_err, "Could not record skipped migration");
                }
                outcome.failed.push(DatabaseError::MigrationFailed {
                    version: step.version,
                    reason,
                });
            }
        }
    }
    Ok(outcome)
}

fn apply_step(conn: &Connection, step: &MigrationStep) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    (step.apply)(&tx)?;
    ledger::record_applied(&tx, step.version, chrono::Local::now().naive_local())?;
    tx.commit()?;
    Ok(())
}

fn create_if_missing(conn: &Connection, spec: &TableSpec) -> Result<(), DatabaseError> {
    ensure_table_exists(conn, spec.name, &spec.create_sql())?;
    Ok(())
}

fn add_late_column(conn: &Connection, spec: &TableSpec, column: &str) -> Result<(), DatabaseError> {
    let col = spec
        .late_columns
        .iter()
        .find(|c| c.name == column)
        .ok_or_else(|| DatabaseError::MigrationFailed {
            version: 0,
            reason: format!("{}.{column} is not a declared late column", spec.name),
        })?;
    ensure_column_exists(conn, spec.name, col.name, col.decl, col.default)?;
    Ok(())
}

// ═══════════════════════════════════════════
// Steps
// ═══════════════════════════════════════════

fn migrate_core_tables(conn: &Connection) -> Result<(), DatabaseError> {
    create_if_missing(conn, &PATIENTS)?;
    create_if_missing(conn, &TOOTH_TREATMENTS)?;
    create_if_missing(conn, &PAYMENTS)?;
    for index in PATIENTS.indexes {
        conn.execute_batch(index)?;
    }
    Ok(())
}

fn migrate_lab_orders(conn: &Connection) -> Result<(), DatabaseError> {
    create_if_missing(conn, &LAB_ORDERS)?;
    add_late_column(conn, &PAYMENTS, "lab_order_id")?;
    for index in LAB_ORDERS.indexes {
        conn.execute_batch(index)?;
    }
    Ok(())
}

/// Adds `priority` and makes every (patient, tooth) group dense. Rows that
/// predate the column all start at 1 and are ranked by creation time.
fn migrate_treatment_priority(conn: &Connection) -> Result<(), DatabaseError> {
    add_late_column(conn, &TOOTH_TREATMENTS, "priority")?;
    conn.execute_batch(
        "UPDATE tooth_treatments SET priority = (
            SELECT ranked.rn FROM (
                SELECT id, ROW_NUMBER() OVER (
                    PARTITION BY patient_id, tooth_number
                    ORDER BY priority, created_at, id
                ) AS rn
                FROM tooth_treatments
            ) AS ranked
            WHERE ranked.id = tooth_treatments.id
        );",
    )?;
    for index in TOOTH_TREATMENTS.indexes {
        conn.execute_batch(index)?;
    }
    Ok(())
}

/// Adds the balance columns and backfills them from linked payments.
///
/// Legacy lab orders carried a hand-entered `paid_amount` with no payment
/// behind it; that amount is carried over as a real payment so that the
/// recomputed balance matches what the clinic saw before.
fn migrate_treatment_balances(conn: &Connection) -> Result<(), DatabaseError> {
    for column in ["total_paid", "remaining_balance", "payment_status"] {
        add_late_column(conn, &TOOTH_TREATMENTS, column)?;
    }
    for column in ["remaining_balance", "payment_status"] {
        add_late_column(conn, &LAB_ORDERS, column)?;
    }

    carry_over_lab_order_payments(conn)?;

    conn.execute_batch(
        "UPDATE tooth_treatments SET total_paid = COALESCE(
            (SELECT SUM(p.amount) FROM payments p WHERE p.tooth_treatment_id = tooth_treatments.id), 0);
         UPDATE tooth_treatments SET remaining_balance =
            CASE WHEN cost <= 0 THEN 0 ELSE MAX(0, cost - total_paid) END;
         UPDATE tooth_treatments SET payment_status =
            CASE WHEN remaining_balance = 0 THEN 'completed'
                 WHEN total_paid > 0 THEN 'partial'
                 ELSE 'pending' END;

         UPDATE lab_orders SET paid_amount = COALESCE(
            (SELECT SUM(p.amount) FROM payments p WHERE p.lab_order_id = lab_orders.id), 0);
         UPDATE lab_orders SET remaining_balance =
            CASE WHEN cost <= 0 THEN 0 ELSE MAX(0, cost - paid_amount) END;
         UPDATE lab_orders SET payment_status =
            CASE WHEN remaining_balance = 0 THEN 'completed'
                 WHEN paid_amount > 0 THEN 'partial'
                 ELSE 'pending' END;",
    )?;
    Ok(())
}

fn carry_over_lab_order_payments(conn: &Connection) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, paid_amount, order_date FROM lab_orders l
         WHERE paid_amount > 0 AND patient_id IS NOT NULL
         AND NOT EXISTS (SELECT 1 FROM payments p WHERE p.lab_order_id = l.id)",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);

    for (lab_order_id, patient_id, amount, order_date) in rows {
        conn.execute(
            "INSERT INTO payments (id, patient_id, lab_order_id, amount, payment_method, payment_date, description)
             VALUES (?1, ?2, ?3, ?4, 'other', ?5, 'Carried over from lab order')",
            params![Uuid::new_v4().to_string(), patient_id, lab_order_id, amount, order_date],
        )?;
        tracing::info!(lab_order_id = %lab_order_id, amount, "Carried over lab order payment");
    }
    Ok(())
}

fn migrate_smart_alerts(conn: &Connection) -> Result<(), DatabaseError> {
    ensure_spec(conn, &SMART_ALERTS)?;
    Ok(())
}

fn migrate_inventory(conn: &Connection) -> Result<(), DatabaseError> {
    ensure_spec(conn, &MEDICATIONS)?;
    ensure_spec(conn, &CLINIC_NEEDS)?;
    Ok(())
}

/// Adds the denormalised balance copy on payments and the lookup indexes.
/// Status is left alone here: legacy payment tables may still carry the old
/// status `CHECK`, which drift repair replaces after the runner finishes.
fn migrate_payment_indexes(conn: &Connection) -> Result<(), DatabaseError> {
    for column in ["total_amount_due", "amount_paid", "remaining_balance"] {
        add_late_column(conn, &PAYMENTS, column)?;
    }
    conn.execute_batch(
        "UPDATE payments SET
            total_amount_due = (SELECT t.cost FROM tooth_treatments t WHERE t.id = payments.tooth_treatment_id),
            amount_paid = (SELECT t.total_paid FROM tooth_treatments t WHERE t.id = payments.tooth_treatment_id),
            remaining_balance = (SELECT t.remaining_balance FROM tooth_treatments t WHERE t.id = payments.tooth_treatment_id)
         WHERE tooth_treatment_id IS NOT NULL
           AND EXISTS (SELECT 1 FROM tooth_treatments t WHERE t.id = payments.tooth_treatment_id);

         UPDATE payments SET
            total_amount_due = (SELECT l.cost FROM lab_orders l WHERE l.id = payments.lab_order_id),
            amount_paid = (SELECT l.paid_amount FROM lab_orders l WHERE l.id = payments.lab_order_id),
            remaining_balance = (SELECT l.remaining_balance FROM lab_orders l WHERE l.id = payments.lab_order_id)
         WHERE lab_order_id IS NOT NULL
           AND EXISTS (SELECT 1 FROM lab_orders l WHERE l.id = payments.lab_order_id);

         UPDATE payments SET total_amount_due = amount, amount_paid = amount, remaining_balance = 0
         WHERE tooth_treatment_id IS NULL AND lab_order_id IS NULL
           AND total_amount_due = 0 AND amount_paid = 0;",
    )?;
    for index in PAYMENTS.indexes {
        conn.execute_batch(index)?;
    }
    Ok(())
}
