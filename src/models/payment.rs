use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub reference: String,
    pub amount: f64,
    pub status: PaymentStatus,
    pub authorization_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The operator's cut of one completed payment. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commission {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub delivery_id: Uuid,
    pub amount: f64,
    pub rate: f64,
    pub created_at: DateTime<Utc>,
}
