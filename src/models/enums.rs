use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(TreatmentStatus {
    Planned => "planned",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

str_enum!(PaymentStatus {
    Pending => "pending",
    Partial => "partial",
    Completed => "completed",
});

str_enum!(PaymentMethod {
    Cash => "cash",
    Card => "card",
    BankTransfer => "bank_transfer",
    Insurance => "insurance",
    Other => "other",
});

str_enum!(LabOrderStatus {
    Ordered => "ordered",
    InProgress => "in_progress",
    Ready => "ready",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

str_enum!(AlertType {
    PaymentOverdue => "payment_overdue",
    TreatmentFollowUp => "treatment_follow_up",
    LabOrderDue => "lab_order_due",
    LowStock => "low_stock",
    Reminder => "reminder",
});

str_enum!(AlertPriority {
    High => "high",
    Medium => "medium",
    Low => "low",
});

str_enum!(NeedPriority {
    Urgent => "urgent",
    High => "high",
    Medium => "medium",
    Low => "low",
});

str_enum!(NeedStatus {
    Pending => "pending",
    Ordered => "ordered",
    Received => "received",
    Cancelled => "cancelled",
});

impl Default for TreatmentStatus {
    fn default() -> Self {
        Self::Planned
    }
}

impl Default for PaymentMethod {
    fn default() -> Self {
        Self::Cash
    }
}

impl Default for AlertPriority {
    fn default() -> Self {
        Self::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn treatment_status_round_trip() {
        for (variant, s) in [
            (TreatmentStatus::Planned, "planned"),
            (TreatmentStatus::InProgress, "in_progress"),
            (TreatmentStatus::Completed, "completed"),
            (TreatmentStatus::Cancelled, "cancelled"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(TreatmentStatus::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn alert_type_round_trip() {
        for (variant, s) in [
            (AlertType::PaymentOverdue, "payment_overdue"),
            (AlertType::TreatmentFollowUp, "treatment_follow_up"),
            (AlertType::LabOrderDue, "lab_order_due"),
            (AlertType::LowStock, "low_stock"),
            (AlertType::Reminder, "reminder"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(AlertType::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn serde_uses_storage_names() {
        let json = serde_json::to_string(&PaymentMethod::BankTransfer).unwrap();
        assert_eq!(json, "\"bank_transfer\"");
        let back: LabOrderStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(back, LabOrderStatus::InProgress);
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(TreatmentStatus::from_str("done").is_err());
        assert!(PaymentStatus::from_str("overdue").is_err());
        assert!(AlertPriority::from_str("").is_err());
    }
}
