use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_medication(conn: &Connection, med: &Medication) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medications (id, name, dosage_form, strength, instructions, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            med.id.to_string(),
            med.name,
            med.dosage_form,
            med.strength,
            med.instructions,
            format_timestamp(med.created_at),
            format_timestamp(med.updated_at),
        ],
    )?;
    Ok(())
}

pub fn list_medications(conn: &Connection) -> Result<Vec<Medication>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, dosage_form, strength, instructions, created_at, updated_at
         FROM medications ORDER BY name COLLATE NOCASE",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;

    let mut meds = Vec::new();
    for row in rows {
        let (id, name, dosage_form, strength, instructions, created_at, updated_at) = row?;
        meds.push(Medication {
            id: parse_uuid(&id)?,
            name,
            dosage_form,
            strength,
            instructions,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        });
    }
    Ok(meds)
}

pub fn delete_medication(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let deleted = conn.execute("DELETE FROM medications WHERE id = ?1", params![id.to_string()])?;
    Ok(deleted > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::at;
    use crate::db::sqlite::open_memory_connection;

    fn med(name: &str) -> Medication {
        let now = at("2025-01-10 09:00:00");
        Medication {
            id: Uuid::new_v4(),
            name: name.into(),
            dosage_form: Some("tablet".into()),
            strength: Some("500 mg".into()),
            instructions: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn catalogue_is_sorted_by_name() {
        let conn = open_memory_connection().unwrap();
        insert_medication(&conn, &med("ibuprofen")).unwrap();
        insert_medication(&conn, &med("Amoxicillin")).unwrap();
        let names: Vec<_> = list_medications(&conn).unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["Amoxicillin", "ibuprofen"]);
    }

    #[test]
    fn delete_reports_missing_rows() {
        let conn = open_memory_connection().unwrap();
        let m = med("Paracetamol");
        insert_medication(&conn, &m).unwrap();
        assert!(delete_medication(&conn, &m.id).unwrap());
        assert!(!delete_medication(&conn, &m.id).unwrap());
    }
}
