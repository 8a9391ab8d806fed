use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_timestamp, parse_optional_uuid, parse_stored_date, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

const PAYMENT_COLUMNS: &str = "id, patient_id, tooth_treatment_id, lab_order_id, amount,
    payment_method, payment_date, description, status, total_amount_due, amount_paid,
    remaining_balance, receipt_number, notes, created_at, updated_at";

pub fn insert_payment(conn: &Connection, p: &Payment) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO payments ({PAYMENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
        ),
        params![
            p.id.to_string(),
            p.patient_id.to_string(),
            p.link.treatment_id().map(|id| id.to_string()),
            p.link.lab_order_id().map(|id| id.to_string()),
            p.amount.cents(),
            p.payment_method.as_str(),
            p.payment_date.to_string(),
            p.description,
            p.status.as_str(),
            p.total_amount_due.cents(),
            p.amount_paid.cents(),
            p.remaining_balance.cents(),
            p.receipt_number,
            p.notes,
            format_timestamp(p.created_at),
            format_timestamp(p.updated_at),
        ],
    )?;
    Ok(())
}

/// Rewrite every column of an existing payment except `created_at`.
pub fn update_payment_row(conn: &Connection, p: &Payment) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE payments SET patient_id = ?2, tooth_treatment_id = ?3, lab_order_id = ?4,
         amount = ?5, payment_method = ?6, payment_date = ?7, description = ?8, status = ?9,
         total_amount_due = ?10, amount_paid = ?11, remaining_balance = ?12,
         receipt_number = ?13, notes = ?14, updated_at = ?15
         WHERE id = ?1",
        params![
            p.id.to_string(),
            p.patient_id.to_string(),
            p.link.treatment_id().map(|id| id.to_string()),
            p.link.lab_order_id().map(|id| id.to_string()),
            p.amount.cents(),
            p.payment_method.as_str(),
            p.payment_date.to_string(),
            p.description,
            p.status.as_str(),
            p.total_amount_due.cents(),
            p.amount_paid.cents(),
            p.remaining_balance.cents(),
            p.receipt_number,
            p.notes,
            format_timestamp(p.updated_at),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("payment", p.id));
    }
    Ok(())
}

pub fn get_payment(conn: &Connection, id: &Uuid) -> Result<Option<Payment>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"),
            params![id.to_string()],
            payment_row_from_rusqlite,
        )
        .optional()?;
    row.map(payment_from_row).transpose()
}

pub fn list_payments_for_patient(conn: &Connection, patient_id: &Uuid) -> Result<Vec<Payment>, DatabaseError> {
    list_where(conn, "patient_id = ?1", patient_id)
}

pub fn list_payments_for_treatment(conn: &Connection, treatment_id: &Uuid) -> Result<Vec<Payment>, DatabaseError> {
    list_where(conn, "tooth_treatment_id = ?1", treatment_id)
}

pub fn list_payments_for_lab_order(conn: &Connection, lab_order_id: &Uuid) -> Result<Vec<Payment>, DatabaseError> {
    list_where(conn, "lab_order_id = ?1", lab_order_id)
}

fn list_where(conn: &Connection, filter: &str, id: &Uuid) -> Result<Vec<Payment>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE {filter}
         ORDER BY payment_date DESC, created_at DESC"
    ))?;
    let rows = stmt.query_map(params![id.to_string()], payment_row_from_rusqlite)?;

    let mut payments = Vec::new();
    for row in rows {
        payments.push(payment_from_row(row?)?);
    }
    Ok(payments)
}

/// Sum of amounts linked to a treatment.
pub fn sum_payments_for_treatment(conn: &Connection, treatment_id: &Uuid) -> Result<Money, DatabaseError> {
    let cents: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE tooth_treatment_id = ?1",
        params![treatment_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(Money::from_cents(cents))
}

/// Sum of amounts linked to a lab order.
pub fn sum_payments_for_lab_order(conn: &Connection, lab_order_id: &Uuid) -> Result<Money, DatabaseError> {
    let cents: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE lab_order_id = ?1",
        params![lab_order_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(Money::from_cents(cents))
}

/// Copy an entity's balance onto every payment linked to it.
pub fn set_linked_payment_balances(
    conn: &Connection,
    link: &PaymentLink,
    due: Money,
    paid: Money,
    remaining: Money,
    status: PaymentStatus,
) -> Result<usize, DatabaseError> {
    let (column, id) = match link {
        PaymentLink::Treatment { treatment_id } => ("tooth_treatment_id", treatment_id),
        PaymentLink::LabOrder { lab_order_id } => ("lab_order_id", lab_order_id),
        PaymentLink::General => return Ok(0),
    };
    let updated = conn.execute(
        &format!(
            "UPDATE payments SET total_amount_due = ?2, amount_paid = ?3, remaining_balance = ?4, status = ?5
             WHERE {column} = ?1"
        ),
        params![id.to_string(), due.cents(), paid.cents(), remaining.cents(), status.as_str()],
    )?;
    Ok(updated)
}

/// Delete the payments of a treatment and of every lab order under it.
pub fn delete_payments_for_treatment_tree(conn: &Connection, treatment_id: &Uuid) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM payments WHERE tooth_treatment_id = ?1
            OR lab_order_id IN (SELECT id FROM lab_orders WHERE tooth_treatment_id = ?1)",
        params![treatment_id.to_string()],
    )?;
    Ok(deleted)
}

pub fn delete_payments_for_lab_order(conn: &Connection, lab_order_id: &Uuid) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM payments WHERE lab_order_id = ?1",
        params![lab_order_id.to_string()],
    )?;
    Ok(deleted)
}

pub fn delete_payment_row(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let deleted = conn.execute("DELETE FROM payments WHERE id = ?1", params![id.to_string()])?;
    Ok(deleted > 0)
}

struct PaymentRow {
    id: String,
    patient_id: String,
    tooth_treatment_id: Option<String>,
    lab_order_id: Option<String>,
    amount: i64,
    payment_method: String,
    payment_date: String,
    description: Option<String>,
    status: String,
    total_amount_due: i64,
    amount_paid: i64,
    remaining_balance: i64,
    receipt_number: Option<String>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

fn payment_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<PaymentRow, rusqlite::Error> {
    Ok(PaymentRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        tooth_treatment_id: row.get(2)?,
        lab_order_id: row.get(3)?,
        amount: row.get(4)?,
        payment_method: row.get(5)?,
        payment_date: row.get(6)?,
        description: row.get(7)?,
        status: row.get(8)?,
        total_amount_due: row.get(9)?,
        amount_paid: row.get(10)?,
        remaining_balance: row.get(11)?,
        receipt_number: row.get(12)?,
        notes: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn payment_from_row(row: PaymentRow) -> Result<Payment, DatabaseError> {
    Ok(Payment {
        id: parse_uuid(&row.id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        link: PaymentLink::from_columns(
            parse_optional_uuid(row.tooth_treatment_id)?,
            parse_optional_uuid(row.lab_order_id)?,
        ),
        amount: Money::from_cents(row.amount),
        payment_method: PaymentMethod::from_str(&row.payment_method)?,
        payment_date: parse_stored_date(&row.payment_date)?,
        description: row.description,
        status: PaymentStatus::from_str(&row.status)?,
        total_amount_due: Money::from_cents(row.total_amount_due),
        amount_paid: Money::from_cents(row.amount_paid),
        remaining_balance: Money::from_cents(row.remaining_balance),
        receipt_number: row.receipt_number,
        notes: row.notes,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    })
}
