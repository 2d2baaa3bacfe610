use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{Role, UserIdentity};
use crate::engine::pricing;
use crate::engine::queue::DispatchQueue;
use crate::error::{AddressField, AppError};
use crate::geo::cache::GeoCache;
use crate::geo::{GeoError, GeoService};
use crate::models::delivery::{Delivery, DeliveryStatus, ItemDetails, NewDelivery};
use crate::models::location::Location;
use crate::observability::metrics::Metrics;
use crate::store::{Conditional, RecordStore, StatusUpdate};

/// Who is asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Customer(Uuid),
    Agent(Uuid),
    PaymentProcessor,
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::Customer(id) => write!(f, "customer {id}"),
            Actor::Agent(id) => write!(f, "agent {id}"),
            Actor::PaymentProcessor => f.write_str("payment processor"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryRequest {
    pub pickup_address: String,
    pub dropoff_address: String,
    pub item_details: ItemDetails,
}

/// Owns the delivery state machine. Nothing else writes `status` or
/// `agent_id`; every write is a conditional update on the status read before.
pub struct DeliveryLifecycle {
    store: Arc<dyn RecordStore>,
    geo: Arc<dyn GeoService>,
    geo_cache: Arc<GeoCache>,
    dispatch: DispatchQueue,
    metrics: Metrics,
}

impl DeliveryLifecycle {
    pub fn new(
        store: Arc<dyn RecordStore>,
        geo: Arc<dyn GeoService>,
        geo_cache: Arc<GeoCache>,
        dispatch: DispatchQueue,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            geo,
            geo_cache,
            dispatch,
            metrics,
        }
    }

    /// Geocodes, prices and persists a new `PENDING` delivery, then hands it
    /// to the dispatch queue. Dispatch problems never reach the caller.
    pub async fn create_delivery(
        &self,
        customer_id: Uuid,
        request: DeliveryRequest,
    ) -> Result<Delivery, AppError> {
        let (pickup, dropoff) = tokio::join!(
            self.geo.geocode(&request.pickup_address),
            self.geo.geocode(&request.dropoff_address),
        );
        let pickup = pickup
            .map_err(|err| address_not_found(AddressField::Pickup, &request.pickup_address, err))?;
        let dropoff = dropoff.map_err(|err| {
            address_not_found(AddressField::Dropoff, &request.dropoff_address, err)
        })?;

        let route = self
            .geo_cache
            .route(self.geo.as_ref(), pickup, dropoff)
            .await?;
        let price = pricing::quote(route.distance_km, &request.item_details);

        let delivery = self
            .store
            .insert_delivery(NewDelivery {
                customer_id,
                pickup: Location::new(request.pickup_address, pickup),
                dropoff: Location::new(request.dropoff_address, dropoff),
                item_details: request.item_details,
                distance_km: route.distance_km,
                price,
                estimated_minutes: route.duration_minutes.max(0.0).round() as u32,
            })
            .await?;

        self.metrics.deliveries_created_total.inc();
        info!(
            delivery_id = %delivery.id,
            %customer_id,
            distance_km = delivery.distance_km,
            price = delivery.price,
            "delivery created"
        );

        self.dispatch.submit(delivery.clone());

        Ok(delivery)
    }

    pub async fn cancel_delivery(
        &self,
        delivery_id: Uuid,
        requester_id: Uuid,
    ) -> Result<Delivery, AppError> {
        let delivery = self.load(delivery_id).await?;

        if delivery.customer_id != requester_id {
            return Err(AppError::Unauthorized(
                "only the customer who requested this delivery can cancel it".to_string(),
            ));
        }

        self.transition(&delivery, DeliveryStatus::Cancelled).await
    }

    /// Claims a pending delivery. Concurrent claims resolve in the store: the
    /// first conditional write wins and everyone else sees `AlreadyAccepted`.
    pub async fn accept_delivery(
        &self,
        delivery_id: Uuid,
        agent_id: Uuid,
    ) -> Result<Delivery, AppError> {
        let approved = self
            .store
            .get_agent(agent_id)
            .await?
            .is_some_and(|agent| agent.is_approved());
        if !approved {
            return Err(AppError::Unauthorized(
                "agent is not approved to accept deliveries".to_string(),
            ));
        }

        let update = StatusUpdate {
            expected: DeliveryStatus::Pending,
            to: DeliveryStatus::Accepted,
            assign_agent: Some(agent_id),
        };

        match self.store.update_delivery_status(delivery_id, update).await? {
            Conditional::Applied(delivery) => {
                self.record_transition(&delivery, DeliveryStatus::Pending);
                Ok(delivery)
            }
            Conditional::Rejected(current)
                if current.agent_id.is_some() && !current.status.is_terminal() =>
            {
                Err(AppError::AlreadyAccepted)
            }
            Conditional::Rejected(current) => Err(AppError::InvalidTransition {
                from: current.status,
                to: DeliveryStatus::Accepted,
            }),
            Conditional::Missing => Err(not_found(delivery_id)),
        }
    }

    /// Generic transition entry point. The edge is checked before the actor:
    /// an edge outside the table is always `InvalidTransition`.
    pub async fn advance(
        &self,
        delivery_id: Uuid,
        to: DeliveryStatus,
        actor: Actor,
    ) -> Result<Delivery, AppError> {
        let delivery = self.load(delivery_id).await?;

        if !delivery.status.can_transition_to(to) {
            return Err(AppError::InvalidTransition {
                from: delivery.status,
                to,
            });
        }

        match (to, actor) {
            (DeliveryStatus::Accepted, Actor::Agent(agent_id)) => {
                self.accept_delivery(delivery_id, agent_id).await
            }
            (DeliveryStatus::Cancelled, Actor::Customer(customer_id)) => {
                self.cancel_delivery(delivery_id, customer_id).await
            }
            (DeliveryStatus::InTransit | DeliveryStatus::Delivered, Actor::Agent(agent_id))
                if delivery.agent_id == Some(agent_id) =>
            {
                self.transition(&delivery, to).await
            }
            (DeliveryStatus::Paid, Actor::PaymentProcessor) => self.transition(&delivery, to).await,
            _ => Err(AppError::Unauthorized(format!(
                "{actor} may not move delivery {delivery_id} to {to}"
            ))),
        }
    }

    pub async fn load(&self, delivery_id: Uuid) -> Result<Delivery, AppError> {
        self.store
            .get_delivery(delivery_id)
            .await?
            .ok_or_else(|| not_found(delivery_id))
    }

    /// Visible to the customer, the assigned agent and admins.
    pub async fn get_delivery(
        &self,
        delivery_id: Uuid,
        viewer: &UserIdentity,
    ) -> Result<Delivery, AppError> {
        let delivery = self.load(delivery_id).await?;

        if viewer.role == Role::Admin || delivery.is_party(viewer.id) {
            Ok(delivery)
        } else {
            Err(AppError::Unauthorized(format!(
                "no access to delivery {delivery_id}"
            )))
        }
    }

    pub async fn list_for_customer(&self, customer_id: Uuid) -> Result<Vec<Delivery>, AppError> {
        Ok(self.store.deliveries_for_customer(customer_id).await?)
    }

    pub async fn list_available(&self) -> Result<Vec<Delivery>, AppError> {
        Ok(self
            .store
            .deliveries_with_status(DeliveryStatus::Pending)
            .await?)
    }

    async fn transition(
        &self,
        delivery: &Delivery,
        to: DeliveryStatus,
    ) -> Result<Delivery, AppError> {
        let from = delivery.status;
        if !from.can_transition_to(to) {
            return Err(AppError::InvalidTransition { from, to });
        }

        let update = StatusUpdate {
            expected: from,
            to,
            assign_agent: None,
        };

        match self.store.update_delivery_status(delivery.id, update).await? {
            Conditional::Applied(updated) => {
                self.record_transition(&updated, from);
                Ok(updated)
            }
            Conditional::Rejected(current) => Err(AppError::InvalidTransition {
                from: current.status,
                to,
            }),
            Conditional::Missing => Err(not_found(delivery.id)),
        }
    }

    fn record_transition(&self, delivery: &Delivery, from: DeliveryStatus) {
        self.metrics
            .delivery_transitions_total
            .with_label_values(&[delivery.status.as_str()])
            .inc();
        info!(
            delivery_id = %delivery.id,
            %from,
            to = %delivery.status,
            agent_id = ?delivery.agent_id,
            "delivery status changed"
        );
    }
}

fn address_not_found(field: AddressField, address: &str, err: GeoError) -> AppError {
    warn!(%field, address, error = %err, "geocoding failed");
    AppError::AddressNotFound {
        field,
        address: address.to_string(),
    }
}

fn not_found(delivery_id: Uuid) -> AppError {
    AppError::NotFound(format!("delivery {delivery_id} not found"))
}
