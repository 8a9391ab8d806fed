//! Smart alerts with deduplication.
//!
//! At most one alert per (type, subject, title) is live at a time. An alert
//! stops blocking new duplicates once it is dismissed or its snooze elapses.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::repository::*;
use crate::db::DatabaseError;
use crate::models::*;

/// Create an alert unless an equivalent one is still live, in which case the
/// existing alert is returned unchanged. Re-submitting an existing id is also
/// a no-op.
pub fn create_alert(conn: &Connection, new: &NewAlert, now: NaiveDateTime) -> Result<Alert, DatabaseError> {
    let title = new.title.trim();
    if title.is_empty() {
        return Err(DatabaseError::ConstraintViolation("alert title is required".into()));
    }

    if let Some(id) = &new.id {
        if let Some(existing) = get_alert(conn, id)? {
            tracing::debug!(alert_id = %id, "Alert id already exists");
            return Ok(existing);
        }
    }

    let alert_type = new.kind.alert_type();
    let subject_id = new.kind.subject_id();
    if let Some(existing) = find_blocking_alert(conn, alert_type, &subject_id, title, now)? {
        tracing::debug!(
            alert_id = %existing.id,
            alert_type = alert_type.as_str(),
            %subject_id,
            "Duplicate alert suppressed"
        );
        return Ok(existing);
    }

    let alert = Alert {
        id: new.id.unwrap_or_else(Uuid::new_v4),
        kind: new.kind,
        priority: new.priority,
        title: title.to_string(),
        description: new.description.clone(),
        action_required: new.action_required,
        due_date: new.due_date,
        is_read: false,
        is_dismissed: false,
        snooze_until: None,
        created_at: now,
        updated_at: now,
    };
    insert_alert(conn, &alert)?;
    tracing::info!(alert_id = %alert.id, alert_type = alert_type.as_str(), "Alert created");
    Ok(alert)
}

/// Clear elapsed snoozes, then return every live alert: high priority first,
/// unread before read, newest first.
pub fn list_active(conn: &Connection, now: NaiveDateTime) -> Result<Vec<Alert>, DatabaseError> {
    let woken = clear_elapsed_snoozes(conn, now)?;
    if woken > 0 {
        tracing::debug!(woken, "Snoozed alerts reactivated");
    }
    list_visible_alerts(conn, now)
}

pub fn mark_read(conn: &Connection, id: &Uuid, now: NaiveDateTime) -> Result<(), DatabaseError> {
    set_alert_read(conn, id, now)
}

pub fn dismiss(conn: &Connection, id: &Uuid, now: NaiveDateTime) -> Result<(), DatabaseError> {
    set_alert_dismissed(conn, id, now)?;
    tracing::info!(alert_id = %id, "Alert dismissed");
    Ok(())
}

pub fn snooze(conn: &Connection, id: &Uuid, until: NaiveDateTime, now: NaiveDateTime) -> Result<(), DatabaseError> {
    if until <= now {
        return Err(DatabaseError::ConstraintViolation("snooze time must be in the future".into()));
    }
    set_alert_snooze(conn, id, until, now)
}

pub fn delete_alert(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    if !delete_alert_row(conn, id)? {
        return Err(DatabaseError::not_found("alert", id));
    }
    Ok(())
}
