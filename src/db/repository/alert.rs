use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_timestamp, parse_date, parse_optional_timestamp, parse_optional_uuid, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

const ALERT_COLUMNS: &str = "id, alert_type, subject_id, patient_id, priority, title, description,
    action_required, due_date, is_read, is_dismissed, snooze_until, created_at, updated_at";

pub fn insert_alert(conn: &Connection, alert: &Alert) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO smart_alerts ({ALERT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ),
        params![
            alert.id.to_string(),
            alert.kind.alert_type().as_str(),
            alert.kind.subject_id(),
            alert.kind.patient_id().map(|id| id.to_string()),
            alert.priority.as_str(),
            alert.title,
            alert.description,
            alert.action_required as i32,
            alert.due_date.map(|d| d.to_string()),
            alert.is_read as i32,
            alert.is_dismissed as i32,
            alert.snooze_until.map(format_timestamp),
            format_timestamp(alert.created_at),
            format_timestamp(alert.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_alert(conn: &Connection, id: &Uuid) -> Result<Option<Alert>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {ALERT_COLUMNS} FROM smart_alerts WHERE id = ?1"),
            params![id.to_string()],
            alert_row_from_rusqlite,
        )
        .optional()?;
    row.map(alert_from_row).transpose()
}

/// Oldest alert with the same (type, subject, title) that still blocks a new
/// one: not dismissed, and either never snoozed or snoozed into the future.
pub fn find_blocking_alert(
    conn: &Connection,
    alert_type: AlertType,
    subject_id: &str,
    title: &str,
    now: NaiveDateTime,
) -> Result<Option<Alert>, DatabaseError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {ALERT_COLUMNS} FROM smart_alerts
                 WHERE alert_type = ?1 AND subject_id = ?2 AND title = ?3
                   AND is_dismissed = 0
                   AND (snooze_until IS NULL OR snooze_until > ?4)
                 ORDER BY created_at, id
                 LIMIT 1"
            ),
            params![alert_type.as_str(), subject_id, title, format_timestamp(now)],
            alert_row_from_rusqlite,
        )
        .optional()?;
    row.map(alert_from_row).transpose()
}

/// Clear every snooze that has elapsed at `now`. Returns how many were cleared.
pub fn clear_elapsed_snoozes(conn: &Connection, now: NaiveDateTime) -> Result<usize, DatabaseError> {
    let now = format_timestamp(now);
    let cleared = conn.execute(
        "UPDATE smart_alerts SET snooze_until = NULL, updated_at = ?1
         WHERE snooze_until IS NOT NULL AND snooze_until <= ?1",
        params![now],
    )?;
    Ok(cleared)
}

/// Non-dismissed alerts that are not snoozed past `now`: high before low
/// priority, unread before read, newest first.
pub fn list_visible_alerts(conn: &Connection, now: NaiveDateTime) -> Result<Vec<Alert>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ALERT_COLUMNS} FROM smart_alerts
         WHERE is_dismissed = 0 AND (snooze_until IS NULL OR snooze_until <= ?1)
         ORDER BY CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END,
                  is_read,
                  created_at DESC,
                  id"
    ))?;
    let rows = stmt.query_map(params![format_timestamp(now)], alert_row_from_rusqlite)?;

    let mut alerts = Vec::new();
    for row in rows {
        alerts.push(alert_from_row(row?)?);
    }
    Ok(alerts)
}

pub fn set_alert_read(conn: &Connection, id: &Uuid, now: NaiveDateTime) -> Result<(), DatabaseError> {
    update_one(
        conn,
        id,
        "UPDATE smart_alerts SET is_read = 1, updated_at = ?2 WHERE id = ?1",
        format_timestamp(now),
    )
}

pub fn set_alert_dismissed(conn: &Connection, id: &Uuid, now: NaiveDateTime) -> Result<(), DatabaseError> {
    update_one(
        conn,
        id,
        "UPDATE smart_alerts SET is_dismissed = 1, updated_at = ?2 WHERE id = ?1",
        format_timestamp(now),
    )
}

pub fn set_alert_snooze(
    conn: &Connection,
    id: &Uuid,
    until: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE smart_alerts SET snooze_until = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), format_timestamp(until), format_timestamp(now)],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("alert", id));
    }
    Ok(())
}

pub fn delete_alert_row(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let deleted = conn.execute("DELETE FROM smart_alerts WHERE id = ?1", params![id.to_string()])?;
    Ok(deleted > 0)
}

fn update_one(conn: &Connection, id: &Uuid, sql: &str, now: String) -> Result<(), DatabaseError> {
    let changed = conn.execute(sql, params![id.to_string(), now])?;
    if changed == 0 {
        return Err(DatabaseError::not_found("alert", id));
    }
    Ok(())
}

struct AlertRow {
    id: String,
    alert_type: String,
    subject_id: String,
    patient_id: Option<String>,
    priority: String,
    title: String,
    description: Option<String>,
    action_required: i32,
    due_date: Option<String>,
    is_read: i32,
    is_dismissed: i32,
    snooze_until: Option<String>,
    created_at: String,
    updated_at: String,
}

fn alert_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<AlertRow, rusqlite::Error> {
    Ok(AlertRow {
        id: row.get(0)?,
        alert_type: row.get(1)?,
        subject_id: row.get(2)?,
        patient_id: row.get(3)?,
        priority: row.get(4)?,
        title: row.get(5)?,
        description: row.get(6)?,
        action_required: row.get(7)?,
        due_date: row.get(8)?,
        is_read: row.get(9)?,
        is_dismissed: row.get(10)?,
        snooze_until: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn alert_from_row(row: AlertRow) -> Result<Alert, DatabaseError> {
    let alert_type = AlertType::from_str(&row.alert_type)?;
    let patient_id = parse_optional_uuid(row.patient_id)?;
    Ok(Alert {
        id: parse_uuid(&row.id)?,
        kind: AlertKind::from_columns(alert_type, &row.subject_id, patient_id)?,
        priority: AlertPriority::from_str(&row.priority)?,
        title: row.title,
        description: row.description,
        action_required: row.action_required != 0,
        due_date: parse_date(row.due_date)?,
        is_read: row.is_read != 0,
        is_dismissed: row.is_dismissed != 0,
        snooze_until: parse_optional_timestamp(row.snooze_until)?,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    })
}
