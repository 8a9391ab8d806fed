//! Repository layer — entity-scoped row operations.
//!
//! Plain reads and writes of one table each. Invariants that span tables
//! (balances, priorities, dedup) live in the domain modules that call these.

mod alert;
mod clinic_need;
mod lab_order;
mod medication;
mod patient;
mod payment;
mod treatment;

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use super::DatabaseError;
use crate::models::{DATE_FORMAT, TIMESTAMP_FORMAT};

pub use alert::*;
pub use clinic_need::*;
pub use lab_order::*;
pub use medication::*;
pub use patient::*;
pub use payment::*;
pub use treatment::*;

pub(crate) fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_timestamp(value: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("unreadable timestamp '{value}': {e}")))
}

pub(crate) fn parse_optional_timestamp(value: Option<String>) -> Result<Option<NaiveDateTime>, DatabaseError> {
    value.as_deref().map(parse_timestamp).transpose()
}

pub(crate) fn parse_stored_date(value: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("unreadable date '{value}': {e}")))
}

pub(crate) fn parse_date(value: Option<String>) -> Result<Option<NaiveDate>, DatabaseError> {
    value.as_deref().map(parse_stored_date).transpose()
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn parse_optional_uuid(value: Option<String>) -> Result<Option<Uuid>, DatabaseError> {
    value.as_deref().map(parse_uuid).transpose()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ErrorKind;

    #[test]
    fn timestamps_round_trip_storage_format() {
        let at = NaiveDateTime::parse_from_str("2025-02-03 04:05:06", TIMESTAMP_FORMAT).unwrap();
        assert_eq!(format_timestamp(at), "2025-02-03 04:05:06");
        assert_eq!(parse_timestamp("2025-02-03 04:05:06").unwrap(), at);
        assert_eq!(parse_optional_timestamp(None).unwrap(), None);
        assert_eq!(parse_date(Some("2024-12-31".into())).unwrap(), NaiveDate::from_ymd_opt(2024, 12, 31));
    }

    #[test]
    fn unreadable_values_are_errors() {
        assert_eq!(parse_timestamp("garbage").unwrap_err().kind(), ErrorKind::ConstraintViolation);
        assert!(parse_optional_timestamp(Some("2025-13-01 00:00:00".into())).is_err());
        assert!(parse_stored_date("").is_err());
        assert!(parse_date(Some("31/12/2024".into())).is_err());
        assert!(parse_uuid("not-a-uuid").is_err());
        assert_eq!(parse_optional_uuid(None).unwrap(), None);
    }

    #[test]
    fn corrupt_stored_timestamp_fails_the_read() {
        let conn = crate::db::sqlite::open_memory_connection().unwrap();
        let id = fixtures::make_patient(&conn, "Ada");
        conn.execute("UPDATE patients SET created_at = 'garbage' WHERE id = ?1", [id.to_string()])
            .unwrap();

        let err = get_patient(&conn, &id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        assert!(list_patients(&conn).is_err());
    }
}
