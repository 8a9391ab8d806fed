use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{PaymentStatus, TreatmentStatus};
use super::money::Money;
use super::tooth::ToothNumber;

/// A treatment planned or performed on one tooth.
///
/// `total_paid`, `remaining_balance` and `payment_status` are derived from
/// linked payments and only ever written by balance reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Treatment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub tooth_number: ToothNumber,
    pub treatment_type: String,
    pub treatment_category: Option<String>,
    pub status: TreatmentStatus,
    /// 1-based position within the (patient, tooth) group.
    pub priority: i64,
    pub cost: Money,
    pub total_paid: Money,
    pub remaining_balance: Money,
    pub payment_status: PaymentStatus,
    pub start_date: Option<NaiveDate>,
    pub completion_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Treatment {
    pub fn group(&self) -> TreatmentGroup {
        TreatmentGroup {
            patient_id: self.patient_id,
            tooth_number: self.tooth_number,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTreatment {
    pub patient_id: Uuid,
    pub tooth_number: ToothNumber,
    pub treatment_type: String,
    pub treatment_category: Option<String>,
    #[serde(default)]
    pub status: TreatmentStatus,
    pub cost: Money,
    pub start_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Partial update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreatmentUpdate {
    pub treatment_type: Option<String>,
    pub treatment_category: Option<String>,
    pub status: Option<TreatmentStatus>,
    pub cost: Option<Money>,
    pub start_date: Option<NaiveDate>,
    pub completion_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// The ordering scope: all treatments of one patient on one tooth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreatmentGroup {
    pub patient_id: Uuid,
    pub tooth_number: ToothNumber,
}

/// What a treatment delete removed along with it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentDeletion {
    pub payments_removed: usize,
    pub lab_orders_removed: usize,
}
