use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::agent::{Agent, VerificationStatus};
use crate::models::delivery::{Delivery, DeliveryStatus, NewDelivery};
use crate::models::payment::{Commission, Payment, PaymentStatus};
use crate::models::push::PushSubscription;
use crate::store::{Conditional, RecordStore, StatusUpdate, StoreError};

/// Process-local record store.
///
/// Conditional updates run under the shard write lock taken by
/// `DashMap::get_mut`, so the status check and the write are one step.
#[derive(Default)]
pub struct InMemoryStore {
    deliveries: DashMap<Uuid, Delivery>,
    agents: DashMap<Uuid, Agent>,
    subscriptions: DashMap<Uuid, Vec<PushSubscription>>,
    payments: DashMap<String, Payment>,
    /// Delivery id to the reference of its latest payment.
    delivery_payments: DashMap<Uuid, String>,
    commissions: DashMap<Uuid, Commission>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn insert_delivery(&self, new: NewDelivery) -> Result<Delivery, StoreError> {
        let now = Utc::now();
        let delivery = Delivery {
            id: Uuid::new_v4(),
            customer_id: new.customer_id,
            agent_id: None,
            pickup: new.pickup,
            dropoff: new.dropoff,
            item_details: new.item_details,
            distance_km: new.distance_km,
            price: new.price,
            estimated_minutes: new.estimated_minutes,
            status: DeliveryStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        self.deliveries.insert(delivery.id, delivery.clone());
        Ok(delivery)
    }

    async fn get_delivery(&self, id: Uuid) -> Result<Option<Delivery>, StoreError> {
        Ok(self.deliveries.get(&id).map(|entry| entry.value().clone()))
    }

    async fn deliveries_for_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<Delivery>, StoreError> {
        let mut deliveries: Vec<Delivery> = self
            .deliveries
            .iter()
            .filter(|entry| entry.customer_id == customer_id)
            .map(|entry| entry.value().clone())
            .collect();

        deliveries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(deliveries)
    }

    async fn deliveries_with_status(
        &self,
        status: DeliveryStatus,
    ) -> Result<Vec<Delivery>, StoreError> {
        let mut deliveries: Vec<Delivery> = self
            .deliveries
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| entry.value().clone())
            .collect();

        deliveries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(deliveries)
    }

    async fn update_delivery_status(
        &self,
        id: Uuid,
        update: StatusUpdate,
    ) -> Result<Conditional<Delivery>, StoreError> {
        let Some(mut delivery) = self.deliveries.get_mut(&id) else {
            return Ok(Conditional::Missing);
        };

        if delivery.status != update.expected {
            return Ok(Conditional::Rejected(delivery.clone()));
        }

        if let Some(agent_id) = update.assign_agent {
            if delivery.agent_id.is_some() {
                return Ok(Conditional::Rejected(delivery.clone()));
            }
            delivery.agent_id = Some(agent_id);
        }

        delivery.status = update.to;
        delivery.updated_at = Utc::now();
        Ok(Conditional::Applied(delivery.clone()))
    }

    async fn count_deliveries(&self) -> Result<usize, StoreError> {
        Ok(self.deliveries.len())
    }

    async fn upsert_agent(&self, agent: Agent) -> Result<Agent, StoreError> {
        self.agents.insert(agent.id, agent.clone());
        Ok(agent)
    }

    async fn get_agent(&self, id: Uuid) -> Result<Option<Agent>, StoreError> {
        Ok(self.agents.get(&id).map(|entry| entry.value().clone()))
    }

    async fn agents_with_verification(
        &self,
        status: Option<VerificationStatus>,
    ) -> Result<Vec<Agent>, StoreError> {
        let mut agents: Vec<Agent> = self
            .agents
            .iter()
            .filter(|entry| status.is_none_or(|wanted| entry.verification == wanted))
            .map(|entry| entry.value().clone())
            .collect();

        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(agents)
    }

    async fn save_subscription(
        &self,
        subscription: PushSubscription,
    ) -> Result<PushSubscription, StoreError> {
        let mut subscriptions = self.subscriptions.entry(subscription.user_id).or_default();

        match subscriptions
            .iter_mut()
            .find(|existing| existing.endpoint == subscription.endpoint)
        {
            Some(existing) => {
                existing.keys = subscription.keys;
                Ok(existing.clone())
            }
            None => {
                subscriptions.push(subscription.clone());
                Ok(subscription)
            }
        }
    }

    async fn subscriptions_for(&self, user_id: Uuid) -> Result<Vec<PushSubscription>, StoreError> {
        Ok(self
            .subscriptions
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn insert_payment(&self, payment: Payment) -> Result<Conditional<Payment>, StoreError> {
        // The delivery slot stays locked until the new reference is recorded.
        let mut slot = self
            .delivery_payments
            .entry(payment.delivery_id)
            .or_default();

        let open = self
            .payments
            .get(slot.value().as_str())
            .map(|entry| entry.value().clone())
            .filter(|existing| existing.status != PaymentStatus::Failed);
        if let Some(existing) = open {
            return Ok(Conditional::Rejected(existing));
        }

        match self.payments.entry(payment.reference.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!(
                "payment reference {}",
                payment.reference
            ))),
            Entry::Vacant(vacant) => {
                vacant.insert(payment.clone());
                *slot.value_mut() = payment.reference.clone();
                Ok(Conditional::Applied(payment))
            }
        }
    }

    async fn open_payment_for_delivery(
        &self,
        delivery_id: Uuid,
    ) -> Result<Option<Payment>, StoreError> {
        let Some(reference) = self
            .delivery_payments
            .get(&delivery_id)
            .map(|entry| entry.value().clone())
        else {
            return Ok(None);
        };

        Ok(self
            .payments
            .get(&reference)
            .map(|entry| entry.value().clone())
            .filter(|payment| payment.status != PaymentStatus::Failed))
    }

    async fn payment_by_reference(&self, reference: &str) -> Result<Option<Payment>, StoreError> {
        Ok(self.payments.get(reference).map(|entry| entry.value().clone()))
    }

    async fn update_payment_status(
        &self,
        reference: &str,
        expected: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<Conditional<Payment>, StoreError> {
        let Some(mut payment) = self.payments.get_mut(reference) else {
            return Ok(Conditional::Missing);
        };

        if payment.status != expected {
            return Ok(Conditional::Rejected(payment.clone()));
        }

        payment.status = to;
        payment.updated_at = Utc::now();
        Ok(Conditional::Applied(payment.clone()))
    }

    async fn insert_commission(&self, commission: Commission) -> Result<bool, StoreError> {
        match self.commissions.entry(commission.payment_id) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(commission);
                Ok(true)
            }
        }
    }

    async fn commission_for_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<Commission>, StoreError> {
        Ok(self
            .commissions
            .get(&payment_id)
            .map(|entry| entry.value().clone()))
    }

    async fn commissions(&self) -> Result<Vec<Commission>, StoreError> {
        let mut commissions: Vec<Commission> = self
            .commissions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        commissions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(commissions)
    }
}
