use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{NeedPriority, NeedStatus};
use super::money::Money;

/// A supply the clinic needs to order or restock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicNeed {
    pub id: Uuid,
    pub need_name: String,
    pub quantity: i64,
    /// Unit price.
    pub price: Money,
    pub supplier: Option<String>,
    pub category: Option<String>,
    pub priority: NeedPriority,
    pub status: NeedStatus,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClinicNeed {
    pub need_name: String,
    pub quantity: i64,
    pub price: Money,
    pub supplier: Option<String>,
    pub category: Option<String>,
    pub priority: NeedPriority,
    pub notes: Option<String>,
}
