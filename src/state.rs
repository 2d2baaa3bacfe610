use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Duration;
use tracing::{info, warn};

use crate::auth::{IdentityProvider, StaticTokenProvider};
use crate::config::Config;
use crate::engine::dispatch::{
    ApprovedAgentsPolicy, DeliveryEvent, DispatchNotifier, EligibilityPolicy,
};
use crate::engine::ledger::CommissionLedger;
use crate::engine::lifecycle::DeliveryLifecycle;
use crate::engine::payments::PaymentService;
use crate::engine::queue::DispatchQueue;
use crate::error::AppError;
use crate::geo::cache::GeoCache;
use crate::geo::google::GoogleMapsClient;
use crate::geo::{GeoService, StaticGeoService};
use crate::models::delivery::Delivery;
use crate::observability::metrics::Metrics;
use crate::payment::{DisabledPaymentGateway, PaymentGateway, PaystackGateway};
use crate::push::{DisabledPushTransport, HttpPushRelay, PushTransport};
use crate::store::{InMemoryStore, RecordStore};

/// External systems the engine talks to.
pub struct Collaborators {
    pub store: Arc<dyn RecordStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub geo: Arc<dyn GeoService>,
    pub push: Arc<dyn PushTransport>,
    pub payments: Arc<dyn PaymentGateway>,
}

impl Collaborators {
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let identity = StaticTokenProvider::parse(&config.api_tokens)
            .map_err(|err| AppError::Internal(format!("invalid API_TOKENS: {err}")))?;
        if identity.is_empty() {
            warn!("API_TOKENS is empty; every authenticated route will answer 401");
        }

        let geo: Arc<dyn GeoService> = match &config.google_maps_api_key {
            Some(key) => Arc::new(GoogleMapsClient::new(key.clone())),
            None => {
                let gazetteer = StaticGeoService::new(config.geo_gazetteer.clone());
                info!(addresses = gazetteer.len(), "using static gazetteer for geocoding");
                Arc::new(gazetteer)
            }
        };

        let push: Arc<dyn PushTransport> = match &config.push_relay_url {
            Some(url) => Arc::new(HttpPushRelay::new(url.clone())),
            None => {
                warn!("PUSH_RELAY_URL not set; push notifications are disabled");
                Arc::new(DisabledPushTransport)
            }
        };

        let payments: Arc<dyn PaymentGateway> = match &config.paystack_secret_key {
            Some(secret) => Arc::new(PaystackGateway::new(
                secret.clone(),
                config.paystack_base_url.clone(),
                config.payment_callback_url.clone(),
            )),
            None => {
                warn!("PAYSTACK_SECRET_KEY not set; payments are disabled");
                Arc::new(DisabledPaymentGateway)
            }
        };

        Ok(Self {
            store: Arc::new(InMemoryStore::new()),
            identity: Arc::new(identity),
            geo,
            push,
            payments,
        })
    }
}

pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub lifecycle: Arc<DeliveryLifecycle>,
    pub payments: PaymentService,
    pub notifier: Arc<DispatchNotifier>,
    pub geo_cache: Arc<GeoCache>,
    pub delivery_events_tx: broadcast::Sender<DeliveryEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config, collaborators: Collaborators) -> (Self, mpsc::Receiver<Delivery>) {
        let policy = Arc::new(ApprovedAgentsPolicy::new(collaborators.store.clone()));
        Self::with_policy(config, collaborators, policy)
    }

    pub fn with_policy(
        config: &Config,
        collaborators: Collaborators,
        policy: Arc<dyn EligibilityPolicy>,
    ) -> (Self, mpsc::Receiver<Delivery>) {
        let metrics = Metrics::new();
        let (dispatch, delivery_rx) =
            DispatchQueue::channel(config.dispatch_queue_size, metrics.clone());
        let (delivery_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size.max(1));

        let geo_cache = Arc::new(GeoCache::new(
            Duration::from_secs(config.geo_cache_ttl_secs),
            metrics.clone(),
        ));

        let lifecycle = Arc::new(DeliveryLifecycle::new(
            collaborators.store.clone(),
            collaborators.geo,
            geo_cache.clone(),
            dispatch,
            metrics.clone(),
        ));

        let notifier = Arc::new(DispatchNotifier::new(
            collaborators.store.clone(),
            policy,
            collaborators.push,
            delivery_events_tx.clone(),
            metrics.clone(),
        ));

        let payments = PaymentService::new(
            collaborators.store.clone(),
            collaborators.payments,
            lifecycle.clone(),
            CommissionLedger::new(
                collaborators.store.clone(),
                config.commission_rate,
                metrics.clone(),
            ),
        );

        (
            Self {
                store: collaborators.store,
                identity: collaborators.identity,
                lifecycle,
                payments,
                notifier,
                geo_cache,
                delivery_events_tx,
                metrics,
            },
            delivery_rx,
        )
    }
}
