use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::agent::{Agent, VerificationStatus};
use crate::models::delivery::Delivery;
use crate::models::location::Location;
use crate::models::push::Notification;
use crate::observability::metrics::Metrics;
use crate::push::PushTransport;
use crate::store::RecordStore;

const NEW_DELIVERY_TITLE: &str = "New Delivery Request";
const NEW_DELIVERY_BODY: &str = "A new delivery is available near your location";

/// Real-time event for connected agent clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum DeliveryEvent {
    NewDelivery {
        delivery_id: Uuid,
        pickup: Location,
        price: f64,
    },
}

/// Decides which agents hear about a new delivery.
#[async_trait]
pub trait EligibilityPolicy: Send + Sync {
    async fn eligible_agents(&self, delivery: &Delivery) -> Result<Vec<Agent>, AppError>;
}

/// Every approved agent, regardless of distance to the pickup.
pub struct ApprovedAgentsPolicy {
    store: Arc<dyn RecordStore>,
}

impl ApprovedAgentsPolicy {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EligibilityPolicy for ApprovedAgentsPolicy {
    async fn eligible_agents(&self, _delivery: &Delivery) -> Result<Vec<Agent>, AppError> {
        Ok(self
            .store
            .agents_with_verification(Some(VerificationStatus::Approved))
            .await?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FanOutReport {
    pub delivery_id: Uuid,
    pub agents: usize,
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Agents whose subscriptions could not be loaded.
    pub lookup_failures: usize,
}

#[derive(Default)]
struct AgentOutcome {
    attempted: usize,
    delivered: usize,
    failed: usize,
    lookup_failed: bool,
}

pub struct DispatchNotifier {
    store: Arc<dyn RecordStore>,
    policy: Arc<dyn EligibilityPolicy>,
    transport: Arc<dyn PushTransport>,
    events_tx: broadcast::Sender<DeliveryEvent>,
    metrics: Metrics,
}

impl DispatchNotifier {
    pub fn new(
        store: Arc<dyn RecordStore>,
        policy: Arc<dyn EligibilityPolicy>,
        transport: Arc<dyn PushTransport>,
        events_tx: broadcast::Sender<DeliveryEvent>,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            policy,
            transport,
            events_tx,
            metrics,
        }
    }

    /// Notifies every eligible agent on every endpoint, then broadcasts the
    /// real-time event. Endpoint failures are counted, never propagated; only
    /// a failed eligibility lookup fails the whole fan-out.
    pub async fn fan_out(&self, delivery: &Delivery) -> Result<FanOutReport, AppError> {
        let agents = self.policy.eligible_agents(delivery).await?;

        let notification = Notification {
            title: NEW_DELIVERY_TITLE.to_string(),
            body: NEW_DELIVERY_BODY.to_string(),
            delivery_id: delivery.id,
        };

        let outcomes = join_all(
            agents
                .iter()
                .map(|agent| self.notify_agent(agent.id, &notification)),
        )
        .await;

        let mut report = FanOutReport {
            delivery_id: delivery.id,
            agents: agents.len(),
            ..FanOutReport::default()
        };
        for outcome in outcomes {
            report.attempted += outcome.attempted;
            report.delivered += outcome.delivered;
            report.failed += outcome.failed;
            report.lookup_failures += usize::from(outcome.lookup_failed);
        }

        self.broadcast(delivery);

        Ok(report)
    }

    async fn notify_agent(&self, agent_id: Uuid, notification: &Notification) -> AgentOutcome {
        let subscriptions = match self.store.subscriptions_for(agent_id).await {
            Ok(subscriptions) => subscriptions,
            Err(err) => {
                warn!(%agent_id, error = %err, "failed to load push subscriptions");
                return AgentOutcome {
                    lookup_failed: true,
                    ..AgentOutcome::default()
                };
            }
        };

        let results = join_all(
            subscriptions
                .iter()
                .map(|subscription| self.transport.send(subscription, notification)),
        )
        .await;

        let mut outcome = AgentOutcome {
            attempted: subscriptions.len(),
            ..AgentOutcome::default()
        };
        for (subscription, result) in subscriptions.iter().zip(results) {
            match result {
                Ok(()) => {
                    outcome.delivered += 1;
                    self.metrics
                        .notifications_total
                        .with_label_values(&["delivered"])
                        .inc();
                }
                Err(err) => {
                    outcome.failed += 1;
                    self.metrics
                        .notifications_total
                        .with_label_values(&["failed"])
                        .inc();
                    warn!(
                        %agent_id,
                        endpoint = %subscription.endpoint,
                        error = %err,
                        "push notification failed"
                    );
                }
            }
        }

        outcome
    }

    fn broadcast(&self, delivery: &Delivery) {
        let event = DeliveryEvent::NewDelivery {
            delivery_id: delivery.id,
            pickup: delivery.pickup.clone(),
            price: delivery.price,
        };

        match self.events_tx.send(event) {
            Ok(receivers) => debug!(delivery_id = %delivery.id, receivers, "new-delivery broadcast"),
            Err(_) => debug!(delivery_id = %delivery.id, "no live listeners for new-delivery event"),
        }
    }

    /// Runs one fan-out and absorbs its failure.
    pub async fn dispatch(&self, delivery: Delivery) -> Option<FanOutReport> {
        let start = Instant::now();
        let result = self.fan_out(&delivery).await;
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(report) => {
                self.metrics
                    .fanout_latency_seconds
                    .with_label_values(&["success"])
                    .observe(elapsed);
                info!(
                    delivery_id = %report.delivery_id,
                    agents = report.agents,
                    delivered = report.delivered,
                    failed = report.failed,
                    "delivery fan-out finished"
                );
                Some(report)
            }
            Err(err) => {
                self.metrics
                    .fanout_latency_seconds
                    .with_label_values(&["error"])
                    .observe(elapsed);
                error!(delivery_id = %delivery.id, error = %err, "delivery fan-out failed");
                None
            }
        }
    }
}

/// Drains the dispatch queue, running each fan-out as its own task.
pub async fn run_dispatch_worker(
    notifier: Arc<DispatchNotifier>,
    mut delivery_rx: mpsc::Receiver<Delivery>,
) {
    info!("dispatch worker started");

    while let Some(delivery) = delivery_rx.recv().await {
        notifier.metrics.dispatch_queue_depth.dec();

        let notifier = notifier.clone();
        tokio::spawn(async move {
            notifier.dispatch(delivery).await;
        });
    }

    warn!("dispatch worker stopped: queue channel closed");
}
