use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AlertPriority, AlertType};
use crate::db::DatabaseError;

/// What an alert is about. Each kind carries the foreign keys it refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertKind {
    PaymentOverdue { patient_id: Uuid, payment_id: Uuid },
    TreatmentFollowUp { patient_id: Uuid, treatment_id: Uuid },
    LabOrderDue { patient_id: Option<Uuid>, lab_order_id: Uuid },
    LowStock { need_id: Uuid },
    Reminder { patient_id: Option<Uuid> },
}

impl AlertKind {
    pub fn alert_type(&self) -> AlertType {
        match self {
            Self::PaymentOverdue { .. } => AlertType::PaymentOverdue,
            Self::TreatmentFollowUp { .. } => AlertType::TreatmentFollowUp,
            Self::LabOrderDue { .. } => AlertType::LabOrderDue,
            Self::LowStock { .. } => AlertType::LowStock,
            Self::Reminder { .. } => AlertType::Reminder,
        }
    }

    /// Dedup subject: the entity the alert is about, `""` for a reminder
    /// with no patient.
    pub fn subject_id(&self) -> String {
        match self {
            Self::PaymentOverdue { payment_id, .. } => payment_id.to_string(),
            Self::TreatmentFollowUp { treatment_id, .. } => treatment_id.to_string(),
            Self::LabOrderDue { lab_order_id, .. } => lab_order_id.to_string(),
            Self::LowStock { need_id } => need_id.to_string(),
            Self::Reminder { patient_id } => patient_id.map(|id| id.to_string()).unwrap_or_default(),
        }
    }

    pub fn patient_id(&self) -> Option<Uuid> {
        match self {
            Self::PaymentOverdue { patient_id, .. } | Self::TreatmentFollowUp { patient_id, .. } => {
                Some(*patient_id)
            }
            Self::LabOrderDue { patient_id, .. } | Self::Reminder { patient_id } => *patient_id,
            Self::LowStock { .. } => None,
        }
    }

    /// Rebuild from the stored `(alert_type, subject_id, patient_id)` columns.
    pub fn from_columns(
        alert_type: AlertType,
        subject_id: &str,
        patient_id: Option<Uuid>,
    ) -> Result<Self, DatabaseError> {
        let subject = || {
            Uuid::parse_str(subject_id).map_err(|e| {
                DatabaseError::ConstraintViolation(format!("alert subject '{subject_id}': {e}"))
            })
        };
        let patient = || {
            patient_id.ok_or_else(|| {
                DatabaseError::ConstraintViolation(format!("{} alert without patient", alert_type.as_str()))
            })
        };
        Ok(match alert_type {
            AlertType::PaymentOverdue => Self::PaymentOverdue {
                patient_id: patient()?,
                payment_id: subject()?,
            },
            AlertType::TreatmentFollowUp => Self::TreatmentFollowUp {
                patient_id: patient()?,
                treatment_id: subject()?,
            },
            AlertType::LabOrderDue => Self::LabOrderDue {
                patient_id,
                lab_order_id: subject()?,
            },
            AlertType::LowStock => Self::LowStock { need_id: subject()? },
            AlertType::Reminder => Self::Reminder { patient_id },
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub priority: AlertPriority,
    pub title: String,
    pub description: Option<String>,
    pub action_required: bool,
    pub due_date: Option<NaiveDate>,
    pub is_read: bool,
    pub is_dismissed: bool,
    pub snooze_until: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlert {
    /// Caller-chosen id. Creating an alert whose id already exists succeeds
    /// without changing it.
    pub id: Option<Uuid>,
    pub kind: AlertKind,
    #[serde(default)]
    pub priority: AlertPriority,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub action_required: bool,
    pub due_date: Option<NaiveDate>,
}
