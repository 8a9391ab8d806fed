use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_timestamp, parse_date, parse_optional_uuid, parse_stored_date, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

const LAB_ORDER_COLUMNS: &str = "id, patient_id, tooth_treatment_id, lab_name, service_name, cost,
    paid_amount, remaining_balance, payment_status, status, order_date, expected_date,
    delivered_date, notes, created_at, updated_at";

pub fn insert_lab_order(conn: &Connection, o: &LabOrder) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO lab_orders ({LAB_ORDER_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
        ),
        params![
            o.id.to_string(),
            o.patient_id.map(|id| id.to_string()),
            o.treatment_id.map(|id| id.to_string()),
            o.lab_name,
            o.service_name,
            o.cost.cents(),
            o.paid_amount.cents(),
            o.remaining_balance.cents(),
            o.payment_status.as_str(),
            o.status.as_str(),
            o.order_date.to_string(),
            o.expected_date.map(|d| d.to_string()),
            o.delivered_date.map(|d| d.to_string()),
            o.notes,
            format_timestamp(o.created_at),
            format_timestamp(o.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_lab_order(conn: &Connection, id: &Uuid) -> Result<Option<LabOrder>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {LAB_ORDER_COLUMNS} FROM lab_orders WHERE id = ?1"),
            params![id.to_string()],
            lab_order_row_from_rusqlite,
        )
        .optional()?;
    row.map(lab_order_from_row).transpose()
}

pub fn list_lab_orders(conn: &Connection) -> Result<Vec<LabOrder>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LAB_ORDER_COLUMNS} FROM lab_orders ORDER BY order_date DESC, created_at DESC"
    ))?;
    let rows = stmt.query_map([], lab_order_row_from_rusqlite)?;
    collect_lab_orders(rows)
}

pub fn list_lab_orders_for_patient(conn: &Connection, patient_id: &Uuid) -> Result<Vec<LabOrder>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LAB_ORDER_COLUMNS} FROM lab_orders WHERE patient_id = ?1
         ORDER BY order_date DESC, created_at DESC"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], lab_order_row_from_rusqlite)?;
    collect_lab_orders(rows)
}

pub fn list_lab_orders_for_treatment(conn: &Connection, treatment_id: &Uuid) -> Result<Vec<LabOrder>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LAB_ORDER_COLUMNS} FROM lab_orders WHERE tooth_treatment_id = ?1
         ORDER BY order_date DESC, created_at DESC"
    ))?;
    let rows = stmt.query_map(params![treatment_id.to_string()], lab_order_row_from_rusqlite)?;
    collect_lab_orders(rows)
}

/// Write the caller-editable fields. Balance columns are untouched.
pub fn update_lab_order_fields(conn: &Connection, o: &LabOrder) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE lab_orders SET lab_name = ?2, service_name = ?3, cost = ?4, status = ?5,
         expected_date = ?6, delivered_date = ?7, notes = ?8, updated_at = ?9
         WHERE id = ?1",
        params![
            o.id.to_string(),
            o.lab_name,
            o.service_name,
            o.cost.cents(),
            o.status.as_str(),
            o.expected_date.map(|d| d.to_string()),
            o.delivered_date.map(|d| d.to_string()),
            o.notes,
            format_timestamp(o.updated_at),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("lab_order", o.id));
    }
    Ok(())
}

pub fn set_lab_order_balance(
    conn: &Connection,
    id: &Uuid,
    paid: Money,
    remaining: Money,
    status: PaymentStatus,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE lab_orders SET paid_amount = ?2, remaining_balance = ?3, payment_status = ?4
         WHERE id = ?1",
        params![id.to_string(), paid.cents(), remaining.cents(), status.as_str()],
    )?;
    Ok(())
}

pub fn delete_lab_order_row(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let deleted = conn.execute("DELETE FROM lab_orders WHERE id = ?1", params![id.to_string()])?;
    Ok(deleted > 0)
}

pub fn delete_lab_orders_for_treatment(conn: &Connection, treatment_id: &Uuid) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM lab_orders WHERE tooth_treatment_id = ?1",
        params![treatment_id.to_string()],
    )?;
    Ok(deleted)
}

struct LabOrderRow {
    id: String,
    patient_id: Option<String>,
    tooth_treatment_id: Option<String>,
    lab_name: String,
    service_name: String,
    cost: i64,
    paid_amount: i64,
    remaining_balance: i64,
    payment_status: String,
    status: String,
    order_date: String,
    expected_date: Option<String>,
    delivered_date: Option<String>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

fn lab_order_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<LabOrderRow, rusqlite::Error> {
    Ok(LabOrderRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        tooth_treatment_id: row.get(2)?,
        lab_name: row.get(3)?,
        service_name: row.get(4)?,
        cost: row.get(5)?,
        paid_amount: row.get(6)?,
        remaining_balance: row.get(7)?,
        payment_status: row.get(8)?,
        status: row.get(9)?,
        order_date: row.get(10)?,
        expected_date: row.get(11)?,
        delivered_date: row.get(12)?,
        notes: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn lab_order_from_row(row: LabOrderRow) -> Result<LabOrder, DatabaseError> {
    Ok(LabOrder {
        id: parse_uuid(&row.id)?,
        patient_id: parse_optional_uuid(row.patient_id)?,
        treatment_id: parse_optional_uuid(row.tooth_treatment_id)?,
        lab_name: row.lab_name,
        service_name: row.service_name,
        cost: Money::from_cents(row.cost),
        paid_amount: Money::from_cents(row.paid_amount),
        remaining_balance: Money::from_cents(row.remaining_balance),
        payment_status: PaymentStatus::from_str(&row.payment_status)?,
        status: LabOrderStatus::from_str(&row.status)?,
        order_date: parse_stored_date(&row.order_date)?,
        expected_date: parse_date(row.expected_date)?,
        delivered_date: parse_date(row.delivered_date)?,
        notes: row.notes,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    })
}

fn collect_lab_orders(
    rows: impl Iterator<Item = Result<LabOrderRow, rusqlite::Error>>,
) -> Result<Vec<LabOrder>, DatabaseError> {
    let mut orders = Vec::new();
    for row in rows {
        orders.push(lab_order_from_row(row?)?);
    }
    Ok(orders)
}
