use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

const NEED_COLUMNS: &str = "id, need_name, quantity, price, supplier, category, priority, status,
    notes, created_at, updated_at";

pub fn insert_clinic_need(conn: &Connection, need: &ClinicNeed) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO clinic_needs ({NEED_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            need.id.to_string(),
            need.need_name,
            need.quantity,
            need.price.cents(),
            need.supplier,
            need.category,
            need.priority.as_str(),
            need.status.as_str(),
            need.notes,
            format_timestamp(need.created_at),
            format_timestamp(need.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_clinic_need(conn: &Connection, id: &Uuid) -> Result<Option<ClinicNeed>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {NEED_COLUMNS} FROM clinic_needs WHERE id = ?1"),
            params![id.to_string()],
            need_row_from_rusqlite,
        )
        .optional()?;
    row.map(need_from_row).transpose()
}

/// Open needs first (urgent to low), then everything already handled.
pub fn list_clinic_needs(conn: &Connection) -> Result<Vec<ClinicNeed>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {NEED_COLUMNS} FROM clinic_needs
         ORDER BY CASE status WHEN 'pending' THEN 0 WHEN 'ordered' THEN 1 ELSE 2 END,
                  CASE priority WHEN 'urgent' THEN 0 WHEN 'high' THEN 1 WHEN 'medium' THEN 2 ELSE 3 END,
                  created_at DESC"
    ))?;
    let rows = stmt.query_map([], need_row_from_rusqlite)?;

    let mut needs = Vec::new();
    for row in rows {
        needs.push(need_from_row(row?)?);
    }
    Ok(needs)
}

pub fn set_clinic_need_status(
    conn: &Connection,
    id: &Uuid,
    status: NeedStatus,
    now: NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE clinic_needs SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), status.as_str(), format_timestamp(now)],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("clinic_need", id));
    }
    Ok(())
}

pub fn delete_clinic_need(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let deleted = conn.execute("DELETE FROM clinic_needs WHERE id = ?1", params![id.to_string()])?;
    Ok(deleted > 0)
}

struct NeedRow {
    id: String,
    need_name: String,
    quantity: i64,
    price: i64,
    supplier: Option<String>,
    category: Option<String>,
    priority: String,
    status: String,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

fn need_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<NeedRow, rusqlite::Error> {
    Ok(NeedRow {
        id: row.get(0)?,
        need_name: row.get(1)?,
        quantity: row.get(2)?,
        price: row.get(3)?,
        supplier: row.get(4)?,
        category: row.get(5)?,
        priority: row.get(6)?,
        status: row.get(7)?,
        notes: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn need_from_row(row: NeedRow) -> Result<ClinicNeed, DatabaseError> {
    Ok(ClinicNeed {
        id: parse_uuid(&row.id)?,
        need_name: row.need_name,
        quantity: row.quantity,
        price: Money::from_cents(row.price),
        supplier: row.supplier,
        category: row.category,
        priority: NeedPriority::from_str(&row.priority)?,
        status: NeedStatus::from_str(&row.status)?,
        notes: row.notes,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::at;
    use crate::db::sqlite::open_memory_connection;

    fn need(name: &str, priority: NeedPriority) -> ClinicNeed {
        let now = at("2025-01-10 09:00:00");
        ClinicNeed {
            id: Uuid::new_v4(),
            need_name: name.into(),
            quantity: 10,
            price: Money::from_cents(250),
            supplier: None,
            category: Some("consumables".into()),
            priority,
            status: NeedStatus::Pending,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn open_urgent_needs_come_first() {
        let conn = open_memory_connection().unwrap();
        let gloves = need("gloves", NeedPriority::Low);
        let anesthetic = need("anesthetic", NeedPriority::Urgent);
        let bibs = need("bibs", NeedPriority::Urgent);
        for n in [&gloves, &anesthetic, &bibs] {
            insert_clinic_need(&conn, n).unwrap();
        }
        set_clinic_need_status(&conn, &bibs.id, NeedStatus::Received, at("2025-01-11 09:00:00")).unwrap();

        let names: Vec<_> = list_clinic_needs(&conn).unwrap().into_iter().map(|n| n.need_name).collect();
        assert_eq!(names, vec!["anesthetic", "gloves", "bibs"]);
    }

    #[test]
    fn status_update_on_missing_need_is_not_found() {
        let conn = open_memory_connection().unwrap();
        let err = set_clinic_need_status(&conn, &Uuid::new_v4(), NeedStatus::Ordered, at("2025-01-11 09:00:00"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::db::ErrorKind::NotFound);
        assert!(get_clinic_need(&conn, &Uuid::new_v4()).unwrap().is_none());
    }
}
