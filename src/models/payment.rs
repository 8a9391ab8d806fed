use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{PaymentMethod, PaymentStatus};
use super::money::Money;

/// What a payment pays for. A payment links to at most one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentLink {
    General,
    Treatment { treatment_id: Uuid },
    LabOrder { lab_order_id: Uuid },
}

impl PaymentLink {
    pub fn from_columns(treatment_id: Option<Uuid>, lab_order_id: Option<Uuid>) -> Self {
        match (treatment_id, lab_order_id) {
            (Some(treatment_id), _) => Self::Treatment { treatment_id },
            (None, Some(lab_order_id)) => Self::LabOrder { lab_order_id },
            (None, None) => Self::General,
        }
    }

    pub fn treatment_id(&self) -> Option<Uuid> {
        match self {
            Self::Treatment { treatment_id } => Some(*treatment_id),
            _ => None,
        }
    }

    pub fn lab_order_id(&self) -> Option<Uuid> {
        match self {
            Self::LabOrder { lab_order_id } => Some(*lab_order_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub link: PaymentLink,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    pub payment_date: NaiveDate,
    pub description: Option<String>,
    pub status: PaymentStatus,
    /// Denormalised copy of the linked entity's (or the payment's own) balance.
    pub total_amount_due: Money,
    pub amount_paid: Money,
    pub remaining_balance: Money,
    pub receipt_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
    pub patient_id: Uuid,
    pub link: PaymentLink,
    pub amount: Money,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    pub payment_date: NaiveDate,
    pub description: Option<String>,
    pub receipt_number: Option<String>,
    pub notes: Option<String>,
    /// General payments only: amount owed, defaults to `amount`.
    pub total_amount_due: Option<Money>,
    /// General payments only: amount settled, defaults to `amount`.
    pub amount_paid: Option<Money>,
}

/// Partial update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentUpdate {
    pub link: Option<PaymentLink>,
    pub amount: Option<Money>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub receipt_number: Option<String>,
    pub notes: Option<String>,
    pub total_amount_due: Option<Money>,
    pub amount_paid: Option<Money>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_serializes_tagged() {
        let id = Uuid::nil();
        let json = serde_json::to_value(PaymentLink::LabOrder { lab_order_id: id }).unwrap();
        assert_eq!(json["kind"], "lab_order");
        assert_eq!(json["lab_order_id"], id.to_string());
        let general = serde_json::to_value(PaymentLink::General).unwrap();
        assert_eq!(general["kind"], "general");
    }

    #[test]
    fn link_from_columns() {
        let id = Uuid::new_v4();
        assert_eq!(PaymentLink::from_columns(None, None), PaymentLink::General);
        assert_eq!(PaymentLink::from_columns(Some(id), None).treatment_id(), Some(id));
        assert_eq!(PaymentLink::from_columns(None, Some(id)).lab_order_id(), Some(id));
    }
}
