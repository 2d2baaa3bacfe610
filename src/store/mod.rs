//! Record Store port.
//!
//! The store owns durability and identity assignment. Every cross-request
//! coordination goes through its conditional updates: a status change is
//! applied only if the record still holds the expected prior status.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::agent::{Agent, VerificationStatus};
use crate::models::delivery::{Delivery, DeliveryStatus, NewDelivery};
use crate::models::payment::{Commission, Payment, PaymentStatus};
use crate::models::push::PushSubscription;

pub use memory::InMemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Storage(err.to_string())
    }
}

/// Result of a status-guarded update.
#[derive(Debug, Clone)]
pub enum Conditional<T> {
    /// The guard held and the write happened; carries the new record.
    Applied(T),
    /// The guard failed; carries the record as it currently is.
    Rejected(T),
    Missing,
}

/// Field changes applied together with a delivery status change.
#[derive(Debug, Clone, Copy)]
pub struct StatusUpdate {
    pub expected: DeliveryStatus,
    pub to: DeliveryStatus,
    pub assign_agent: Option<Uuid>,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_delivery(&self, new: NewDelivery) -> Result<Delivery, StoreError>;

    async fn get_delivery(&self, id: Uuid) -> Result<Option<Delivery>, StoreError>;

    /// Newest first.
    async fn deliveries_for_customer(&self, customer_id: Uuid)
    -> Result<Vec<Delivery>, StoreError>;

    /// Oldest first.
    async fn deliveries_with_status(
        &self,
        status: DeliveryStatus,
    ) -> Result<Vec<Delivery>, StoreError>;

    /// Compare-and-set on `status`. `assign_agent` is written only when the
    /// record has no agent yet.
    async fn update_delivery_status(
        &self,
        id: Uuid,
        update: StatusUpdate,
    ) -> Result<Conditional<Delivery>, StoreError>;

    async fn count_deliveries(&self) -> Result<usize, StoreError>;

    async fn upsert_agent(&self, agent: Agent) -> Result<Agent, StoreError>;

    async fn get_agent(&self, id: Uuid) -> Result<Option<Agent>, StoreError>;

    async fn agents_with_verification(
        &self,
        status: Option<VerificationStatus>,
    ) -> Result<Vec<Agent>, StoreError>;

    /// Replaces an existing subscription with the same user and endpoint.
    async fn save_subscription(
        &self,
        subscription: PushSubscription,
    ) -> Result<PushSubscription, StoreError>;

    async fn subscriptions_for(&self, user_id: Uuid) -> Result<Vec<PushSubscription>, StoreError>;

    /// Inserts unless the delivery already has a payment that is not
    /// `FAILED`; that payment comes back as `Rejected`. Fails with
    /// `Duplicate` if the reference is taken.
    async fn insert_payment(&self, payment: Payment) -> Result<Conditional<Payment>, StoreError>;

    /// The delivery's pending or completed payment, if any.
    async fn open_payment_for_delivery(
        &self,
        delivery_id: Uuid,
    ) -> Result<Option<Payment>, StoreError>;

    async fn payment_by_reference(&self, reference: &str) -> Result<Option<Payment>, StoreError>;

    /// Compare-and-set on payment `status`.
    async fn update_payment_status(
        &self,
        reference: &str,
        expected: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<Conditional<Payment>, StoreError>;

    /// Inserts unless a commission for the same payment exists. Returns
    /// `false` when one already did.
    async fn insert_commission(&self, commission: Commission) -> Result<bool, StoreError>;

    async fn commission_for_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<Commission>, StoreError>;

    async fn commissions(&self) -> Result<Vec<Commission>, StoreError>;
}
