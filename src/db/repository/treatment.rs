use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_timestamp, parse_date, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

const TREATMENT_COLUMNS: &str = "id, patient_id, tooth_number, treatment_type, treatment_category,
    status, priority, cost, total_paid, remaining_balance, payment_status, start_date,
    completion_date, notes, created_at, updated_at";

pub fn insert_treatment(conn: &Connection, t: &Treatment) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO tooth_treatments ({TREATMENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
        ),
        params![
            t.id.to_string(),
            t.patient_id.to_string(),
            t.tooth_number.get(),
            t.treatment_type,
            t.treatment_category,
            t.status.as_str(),
            t.priority,
            t.cost.cents(),
            t.total_paid.cents(),
            t.remaining_balance.cents(),
            t.payment_status.as_str(),
            t.start_date.map(|d| d.to_string()),
            t.completion_date.map(|d| d.to_string()),
            t.notes,
            format_timestamp(t.created_at),
            format_timestamp(t.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_treatment(conn: &Connection, id: &Uuid) -> Result<Option<Treatment>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {TREATMENT_COLUMNS} FROM tooth_treatments WHERE id = ?1"),
            params![id.to_string()],
            treatment_row_from_rusqlite,
        )
        .optional()?;
    row.map(treatment_from_row).transpose()
}

/// Treatments of one (patient, tooth) group in priority order.
pub fn list_treatments_for_tooth(
    conn: &Connection,
    group: &TreatmentGroup,
) -> Result<Vec<Treatment>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TREATMENT_COLUMNS} FROM tooth_treatments
         WHERE patient_id = ?1 AND tooth_number = ?2
         ORDER BY priority, created_at"
    ))?;
    let rows = stmt.query_map(
        params![group.patient_id.to_string(), group.tooth_number.get()],
        treatment_row_from_rusqlite,
    )?;
    collect_treatments(rows)
}

pub fn list_treatments_for_patient(conn: &Connection, patient_id: &Uuid) -> Result<Vec<Treatment>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TREATMENT_COLUMNS} FROM tooth_treatments
         WHERE patient_id = ?1
         ORDER BY tooth_number, priority"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], treatment_row_from_rusqlite)?;
    collect_treatments(rows)
}

/// Ids of a group in current priority order.
pub fn treatment_group_ids(conn: &Connection, group: &TreatmentGroup) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM tooth_treatments WHERE patient_id = ?1 AND tooth_number = ?2
         ORDER BY priority, created_at",
    )?;
    let rows = stmt.query_map(
        params![group.patient_id.to_string(), group.tooth_number.get()],
        |row| row.get::<_, String>(0),
    )?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(parse_uuid(&row?)?);
    }
    Ok(ids)
}

pub fn max_treatment_priority(conn: &Connection, group: &TreatmentGroup) -> Result<i64, DatabaseError> {
    let max: i64 = conn.query_row(
        "SELECT COALESCE(MAX(priority), 0) FROM tooth_treatments
         WHERE patient_id = ?1 AND tooth_number = ?2",
        params![group.patient_id.to_string(), group.tooth_number.get()],
        |row| row.get(0),
    )?;
    Ok(max)
}

pub fn set_treatment_priority(
    conn: &Connection,
    id: &Uuid,
    priority: i64,
    updated_at: NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE tooth_treatments SET priority = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), priority, format_timestamp(updated_at)],
    )?;
    Ok(())
}

/// Write the caller-editable fields. Balance and priority are untouched.
pub fn update_treatment_fields(conn: &Connection, t: &Treatment) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE tooth_treatments SET treatment_type = ?2, treatment_category = ?3, status = ?4,
         cost = ?5, start_date = ?6, completion_date = ?7, notes = ?8, updated_at = ?9
         WHERE id = ?1",
        params![
            t.id.to_string(),
            t.treatment_type,
            t.treatment_category,
            t.status.as_str(),
            t.cost.cents(),
            t.start_date.map(|d| d.to_string()),
            t.completion_date.map(|d| d.to_string()),
            t.notes,
            format_timestamp(t.updated_at),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("treatment", t.id));
    }
    Ok(())
}

pub fn set_treatment_balance(
    conn: &Connection,
    id: &Uuid,
    total_paid: Money,
    remaining: Money,
    status: PaymentStatus,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE tooth_treatments SET total_paid = ?2, remaining_balance = ?3, payment_status = ?4
         WHERE id = ?1",
        params![id.to_string(), total_paid.cents(), remaining.cents(), status.as_str()],
    )?;
    Ok(())
}

pub fn delete_treatment_row(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let deleted = conn.execute("DELETE FROM tooth_treatments WHERE id = ?1", params![id.to_string()])?;
    Ok(deleted > 0)
}

struct TreatmentRow {
    id: String,
    patient_id: String,
    tooth_number: i64,
    treatment_type: String,
    treatment_category: Option<String>,
    status: String,
    priority: i64,
    cost: i64,
    total_paid: i64,
    remaining_balance: i64,
    payment_status: String,
    start_date: Option<String>,
    completion_date: Option<String>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

fn treatment_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<TreatmentRow, rusqlite::Error> {
    Ok(TreatmentRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        tooth_number: row.get(2)?,
        treatment_type: row.get(3)?,
        treatment_category: row.get(4)?,
        status: row.get(5)?,
        priority: row.get(6)?,
        cost: row.get(7)?,
        total_paid: row.get(8)?,
        remaining_balance: row.get(9)?,
        payment_status: row.get(10)?,
        start_date: row.get(11)?,
        completion_date: row.get(12)?,
        notes: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn treatment_from_row(row: TreatmentRow) -> Result<Treatment, DatabaseError> {
    Ok(Treatment {
        id: parse_uuid(&row.id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        tooth_number: ToothNumber::from_stored(row.tooth_number)?,
        treatment_type: row.treatment_type,
        treatment_category: row.treatment_category,
        status: TreatmentStatus::from_str(&row.status)?,
        priority: row.priority,
        cost: Money::from_cents(row.cost),
        total_paid: Money::from_cents(row.total_paid),
        remaining_balance: Money::from_cents(row.remaining_balance),
        payment_status: PaymentStatus::from_str(&row.payment_status)?,
        start_date: parse_date(row.start_date)?,
        completion_date: parse_date(row.completion_date)?,
        notes: row.notes,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    })
}

fn collect_treatments(
    rows: impl Iterator<Item = Result<TreatmentRow, rusqlite::Error>>,
) -> Result<Vec<Treatment>, DatabaseError> {
    let mut treatments = Vec::new();
    for row in rows {
        treatments.push(treatment_from_row(row?)?);
    }
    Ok(treatments)
}
