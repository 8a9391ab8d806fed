use std::fmt;

use serde::{Deserialize, Serialize};

use crate::db::DatabaseError;

/// FDI two-digit tooth code.
///
/// Permanent teeth use quadrants 1-4 with positions 1-8, primary teeth use
/// quadrants 5-8 with positions 1-5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ToothNumber(u8);

impl ToothNumber {
    pub fn new(code: u8) -> Result<Self, DatabaseError> {
        let (quadrant, position) = (code / 10, code % 10);
        let valid = match quadrant {
            1..=4 => (1..=8).contains(&position),
            5..=8 => (1..=5).contains(&position),
            _ => false,
        };
        if valid {
            Ok(Self(code))
        } else {
            Err(DatabaseError::ConstraintViolation(format!(
                "{code} is not a valid FDI tooth number"
            )))
        }
    }

    /// Read a stored column value.
    pub fn from_stored(value: i64) -> Result<Self, DatabaseError> {
        u8::try_from(value)
            .map_err(|_| DatabaseError::ConstraintViolation(format!("{value} is not a valid FDI tooth number")))
            .and_then(Self::new)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn quadrant(self) -> u8 {
        self.0 / 10
    }

    pub fn position(self) -> u8 {
        self.0 % 10
    }

    pub fn is_primary(self) -> bool {
        self.quadrant() >= 5
    }
}

impl TryFrom<u8> for ToothNumber {
    type Error = DatabaseError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::new(code)
    }
}

impl From<ToothNumber> for u8 {
    fn from(tooth: ToothNumber) -> u8 {
        tooth.0
    }
}

impl fmt::Display for ToothNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
