#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use delivery_engine::auth::{Role, StaticTokenProvider, UserIdentity};
use delivery_engine::config::Config;
use delivery_engine::geo::{GeoError, GeoService, RouteEstimate};
use delivery_engine::models::agent::{Agent, VerificationStatus};
use delivery_engine::models::delivery::{Delivery, ItemDetails};
use delivery_engine::models::location::GeoPoint;
use delivery_engine::models::push::{Notification, PushSubscription, SubscriptionKeys};
use delivery_engine::payment::{PaymentError, PaymentGateway, PaymentRequest, PaymentVerdict};
use delivery_engine::push::{PushError, PushTransport};
use delivery_engine::state::{AppState, Collaborators};
use delivery_engine::store::{InMemoryStore, RecordStore};

pub const CUSTOMER_TOKEN: &str = "customer-token";
pub const OTHER_CUSTOMER_TOKEN: &str = "other-customer-token";
pub const AGENT_TOKEN: &str = "agent-token";
pub const SECOND_AGENT_TOKEN: &str = "second-agent-token";
pub const ADMIN_TOKEN: &str = "admin-token";

pub const PICKUP: &str = "A";
pub const DROPOFF: &str = "B";

/// Geo service with a fixed address book and one fixed route.
pub struct FakeGeo {
    points: HashMap<String, GeoPoint>,
    route: RouteEstimate,
    pub geocode_calls: AtomicUsize,
    pub route_calls: AtomicUsize,
}

impl FakeGeo {
    pub fn new() -> Self {
        Self {
            points: HashMap::from([
                (PICKUP.to_string(), GeoPoint { lat: 6.5244, lng: 3.3792 }),
                (DROPOFF.to_string(), GeoPoint { lat: 6.4550, lng: 3.3941 }),
                ("C".to_string(), GeoPoint { lat: 6.6018, lng: 3.3515 }),
            ]),
            route: RouteEstimate {
                distance_km: 5.2,
                duration_minutes: 14.6,
            },
            geocode_calls: AtomicUsize::new(0),
            route_calls: AtomicUsize::new(0),
        }
    }

    pub fn route_calls(&self) -> usize {
        self.route_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeoService for FakeGeo {
    async fn geocode(&self, address: &str) -> Result<GeoPoint, GeoError> {
        self.geocode_calls.fetch_add(1, Ordering::SeqCst);
        self.points
            .get(address)
            .copied()
            .ok_or_else(|| GeoError::NotFound(address.to_string()))
    }

    async fn route_distance(
        &self,
        _origin: GeoPoint,
        _destination: GeoPoint,
    ) -> Result<RouteEstimate, GeoError> {
        self.route_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.route)
    }
}

/// Push transport that records every attempt and fails chosen endpoints.
#[derive(Default)]
pub struct RecordingPush {
    failing: HashSet<String>,
    fail_all: bool,
    pub attempts: Mutex<Vec<(String, Notification)>>,
}

impl RecordingPush {
    pub fn failing(endpoints: &[&str]) -> Self {
        Self {
            failing: endpoints.iter().map(|e| e.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing_everything() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn attempted_endpoints(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = self
            .attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(endpoint, _)| endpoint.clone())
            .collect();
        endpoints.sort();
        endpoints
    }
}

#[async_trait]
impl PushTransport for RecordingPush {
    async fn send(
        &self,
        subscription: &PushSubscription,
        notification: &Notification,
    ) -> Result<(), PushError> {
        self.attempts
            .lock()
            .unwrap()
            .push((subscription.endpoint.clone(), notification.clone()));

        if self.fail_all || self.failing.contains(&subscription.endpoint) {
            Err(PushError::Unavailable("endpoint unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Gateway that approves or declines every verification.
pub struct FakeGateway {
    decline_reason: Option<String>,
    amounts: Mutex<HashMap<String, f64>>,
    pub verify_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn approving() -> Self {
        Self {
            decline_reason: None,
            amounts: Mutex::new(HashMap::new()),
            verify_calls: AtomicUsize::new(0),
        }
    }

    pub fn declining(reason: &str) -> Self {
        Self {
            decline_reason: Some(reason.to_string()),
            ..Self::approving()
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initialize(&self, request: &PaymentRequest) -> Result<String, PaymentError> {
        self.amounts
            .lock()
            .unwrap()
            .insert(request.reference.clone(), request.amount);
        Ok(format!("https://checkout.test/{}", request.reference))
    }

    async fn verify(&self, reference: &str) -> Result<PaymentVerdict, PaymentError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = &self.decline_reason {
            return Ok(PaymentVerdict::Declined {
                reason: reason.clone(),
            });
        }

        let amount = self
            .amounts
            .lock()
            .unwrap()
            .get(reference)
            .copied()
            .ok_or_else(|| PaymentError::Rejected(format!("unknown reference {reference}")))?;
        Ok(PaymentVerdict::Succeeded { amount })
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub delivery_rx: mpsc::Receiver<Delivery>,
    pub store: Arc<InMemoryStore>,
    pub geo: Arc<FakeGeo>,
    pub push: Arc<RecordingPush>,
    pub gateway: Arc<FakeGateway>,
    pub customer: UserIdentity,
    pub other_customer: UserIdentity,
    pub agent: UserIdentity,
    pub second_agent: UserIdentity,
    pub admin: UserIdentity,
}

fn identity(seed: u128, role: Role) -> UserIdentity {
    UserIdentity {
        id: Uuid::from_u128(seed),
        role,
        email: Some(format!("user{seed}@example.com")),
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::build(RecordingPush::default(), FakeGateway::approving())
    }

    pub fn with_push(push: RecordingPush) -> Self {
        Self::build(push, FakeGateway::approving())
    }

    pub fn with_gateway(gateway: FakeGateway) -> Self {
        Self::build(RecordingPush::default(), gateway)
    }

    fn build(push: RecordingPush, gateway: FakeGateway) -> Self {
        let customer = identity(1, Role::Customer);
        let other_customer = identity(2, Role::Customer);
        let agent = identity(10, Role::Agent);
        let second_agent = identity(11, Role::Agent);
        let admin = identity(99, Role::Admin);

        let tokens = StaticTokenProvider::new()
            .with_token(CUSTOMER_TOKEN, customer.clone())
            .with_token(OTHER_CUSTOMER_TOKEN, other_customer.clone())
            .with_token(AGENT_TOKEN, agent.clone())
            .with_token(SECOND_AGENT_TOKEN, second_agent.clone())
            .with_token(ADMIN_TOKEN, admin.clone());

        let store = Arc::new(InMemoryStore::new());
        let geo = Arc::new(FakeGeo::new());
        let push = Arc::new(push);
        let gateway = Arc::new(gateway);

        let (state, delivery_rx) = AppState::new(
            &Config::default(),
            Collaborators {
                store: store.clone(),
                identity: Arc::new(tokens),
                geo: geo.clone(),
                push: push.clone(),
                payments: gateway.clone(),
            },
        );

        Self {
            state: Arc::new(state),
            delivery_rx,
            store,
            geo,
            push,
            gateway,
            customer,
            other_customer,
            agent,
            second_agent,
            admin,
        }
    }

    pub fn router(&self) -> axum::Router {
        delivery_engine::api::rest::router(self.state.clone())
    }

    pub async fn add_agent(&self, id: Uuid, verification: VerificationStatus) {
        let now = Utc::now();
        self.store
            .upsert_agent(Agent {
                id,
                name: format!("agent-{id}"),
                phone: None,
                verification,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }

    pub async fn subscribe(&self, user_id: Uuid, endpoint: &str) {
        self.store
            .save_subscription(PushSubscription {
                id: Uuid::new_v4(),
                user_id,
                endpoint: endpoint.to_string(),
                keys: SubscriptionKeys {
                    p256dh: "BNcRdreALRFXTkOOUHK1EtK2wtaz5Ry4YfYCA".to_string(),
                    auth: "tBHItJI5svbpez7KI4CCXg".to_string(),
                },
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    /// Delivery from A to B created by the default customer.
    pub async fn create_delivery(&self, item: ItemDetails) -> Delivery {
        self.state
            .lifecycle
            .create_delivery(
                self.customer.id,
                delivery_engine::engine::lifecycle::DeliveryRequest {
                    pickup_address: PICKUP.to_string(),
                    dropoff_address: DROPOFF.to_string(),
                    item_details: item,
                },
            )
            .await
            .unwrap()
    }
}

pub fn parcel() -> ItemDetails {
    ItemDetails {
        description: "documents".to_string(),
        weight: None,
        value: None,
    }
}

pub fn authed_json(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

pub fn authed(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
