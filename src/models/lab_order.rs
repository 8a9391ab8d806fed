use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{LabOrderStatus, PaymentStatus};
use super::money::Money;

/// Work sent to an external dental lab. Billable like a treatment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabOrder {
    pub id: Uuid,
    pub patient_id: Option<Uuid>,
    pub treatment_id: Option<Uuid>,
    pub lab_name: String,
    pub service_name: String,
    pub cost: Money,
    pub paid_amount: Money,
    pub remaining_balance: Money,
    pub payment_status: PaymentStatus,
    pub status: LabOrderStatus,
    pub order_date: NaiveDate,
    pub expected_date: Option<NaiveDate>,
    pub delivered_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLabOrder {
    /// Taken from the treatment when omitted and `treatment_id` is set.
    pub patient_id: Option<Uuid>,
    pub treatment_id: Option<Uuid>,
    pub lab_name: String,
    pub service_name: String,
    pub cost: Money,
    pub order_date: NaiveDate,
    pub expected_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabOrderUpdate {
    pub lab_name: Option<String>,
    pub service_name: Option<String>,
    pub cost: Option<Money>,
    pub status: Option<LabOrderStatus>,
    pub expected_date: Option<NaiveDate>,
    pub delivered_date: Option<NaiveDate>,
    pub notes: Option<String>,
}
