use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::Location;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Accepted,
    InTransit,
    Paid,
    Delivered,
    Cancelled,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 6] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Accepted,
        DeliveryStatus::InTransit,
        DeliveryStatus::Paid,
        DeliveryStatus::Delivered,
        DeliveryStatus::Cancelled,
    ];

    /// The only edges of the delivery state machine.
    pub fn can_transition_to(self, to: DeliveryStatus) -> bool {
        use DeliveryStatus::*;

        matches!(
            (self, to),
            (Pending, Accepted)
                | (Pending, Cancelled)
                | (Accepted, InTransit)
                | (InTransit, Paid)
                | (Paid, Delivered)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::Accepted => "ACCEPTED",
            DeliveryStatus::InTransit => "IN_TRANSIT",
            DeliveryStatus::Paid => "PAID",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub description: String,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub pickup: Location,
    pub dropoff: Location,
    pub item_details: ItemDetails,
    pub distance_km: f64,
    pub price: f64,
    pub estimated_minutes: u32,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.customer_id == user_id || self.agent_id == Some(user_id)
    }
}

/// A priced delivery that has not been persisted yet. The store assigns
/// identity, timestamps and the initial `PENDING` status.
#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub customer_id: Uuid,
    pub pickup: Location,
    pub dropoff: Location,
    pub item_details: ItemDetails,
    pub distance_km: f64,
    pub price: f64,
    pub estimated_minutes: u32,
}
