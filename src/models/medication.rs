use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entry in the clinic's prescribing catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medication {
    pub id: Uuid,
    pub name: String,
    pub dosage_form: Option<String>,
    pub strength: Option<String>,
    pub instructions: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMedication {
    pub name: String,
    pub dosage_form: Option<String>,
    pub strength: Option<String>,
    pub instructions: Option<String>,
}
