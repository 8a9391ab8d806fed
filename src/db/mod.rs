pub mod drift;
pub mod guard;
pub mod introspect;
pub mod ledger;
pub mod migrations;
pub mod repository;
pub mod schema;
pub mod sqlite;
pub mod startup;

pub use sqlite::*;
pub use repository::*;

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database connection unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Structural repair of {table} failed: {reason}")]
    RepairFailed { table: String, reason: String },

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("Malformed reorder for patient {patient_id}, tooth {tooth_number}: {reason}")]
    MalformedReorder {
        patient_id: String,
        tooth_number: u8,
        reason: String,
    },
}

/// Coarse error classes exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A migration or repair step failed; startup carried on.
    StartupNonFatal,
    ConstraintViolation,
    NotFound,
    MalformedReorder,
    IoFailure,
}

impl DatabaseError {
    pub fn not_found(entity_type: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MigrationFailed { .. } | Self::RepairFailed { .. } => ErrorKind::StartupNonFatal,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::MalformedReorder { .. } => ErrorKind::MalformedReorder,
            Self::ConstraintViolation(_) | Self::InvalidEnum { .. } => ErrorKind::ConstraintViolation,
            Self::Sqlite(e) if sqlite_code(e) == Some(ErrorCode::ConstraintViolation) => {
                ErrorKind::ConstraintViolation
            }
            Self::Sqlite(rusqlite::Error::QueryReturnedNoRows) => ErrorKind::NotFound,
            Self::Sqlite(_) | Self::Io(_) | Self::ConnectionUnavailable(_) => ErrorKind::IoFailure,
        }
    }

    /// Message suitable for showing to the person entering the data.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { entity_type, .. } => {
                format!("The {} you are editing no longer exists. Refresh and try again.", entity_type.replace('_', " "))
            }
            Self::MalformedReorder { .. } => {
                "The treatment list changed while you were reordering it. Refresh and try again.".into()
            }
            Self::ConstraintViolation(reason) => format!("This change was rejected: {reason}."),
            Self::InvalidEnum { field, value } => format!("'{value}' is not a valid {field}."),
            Self::Sqlite(e) if sqlite_code(e) == Some(ErrorCode::ConstraintViolation) => {
                let text = e.to_string();
                if text.contains("UNIQUE") {
                    "A conflicting record already exists. Change the conflicting details and save again.".into()
                } else if text.contains("FOREIGN KEY") {
                    "This record refers to something that no longer exists. Refresh and try again.".into()
                } else {
                    "Some of the entered values are out of range. Check the form and save again.".into()
                }
            }
            Self::MigrationFailed { .. } | Self::RepairFailed { .. } => {
                "A database maintenance step was skipped. Your data is safe.".into()
            }
            Self::Sqlite(_) | Self::Io(_) | Self::ConnectionUnavailable(_) => {
                "The clinic database could not be reached. Check the disk and try again.".into()
            }
        }
    }
}

fn sqlite_code(e: &rusqlite::Error) -> Option<ErrorCode> {
    match e {
        rusqlite::Error::SqliteFailure(inner, _) => Some(inner.code),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_classifies_as_constraint() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT UNIQUE); INSERT INTO t (v) VALUES ('a');")
            .unwrap();
        let err: DatabaseError = conn
            .execute("INSERT INTO t (v) VALUES ('a')", [])
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        assert!(err.user_message().contains("conflicting record already exists"));
    }

    #[test]
    fn startup_errors_are_non_fatal_kind() {
        let err = DatabaseError::MigrationFailed { version: 3, reason: "boom".into() };
        assert_eq!(err.kind(), ErrorKind::StartupNonFatal);
        let err = DatabaseError::RepairFailed { table: "payments".into(), reason: "boom".into() };
        assert_eq!(err.kind(), ErrorKind::StartupNonFatal);
    }

    #[test]
    fn not_found_message_names_entity() {
        let err = DatabaseError::not_found("tooth_treatment", "abc");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.user_message().contains("tooth treatment"));
        assert_eq!(err.to_string(), "Entity not found: tooth_treatment with id abc");
    }

    #[test]
    fn io_errors_classify_as_io_failure() {
        let err = DatabaseError::ConnectionUnavailable("closed".into());
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }
}
