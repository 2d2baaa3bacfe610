use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::extract::CurrentUser;
use crate::error::AppError;
use crate::models::push::{PushSubscription, SubscriptionKeys};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/push/subscriptions", post(register_subscription))
}

#[derive(Deserialize)]
pub struct SubscriptionRequest {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

async fn register_subscription(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(payload): Json<SubscriptionRequest>,
) -> Result<StatusCode, AppError> {
    let endpoint = payload.endpoint.trim();
    if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
        return Err(AppError::BadRequest(
            "endpoint must be an http(s) URL".to_string(),
        ));
    }
    if payload.keys.p256dh.is_empty() || payload.keys.auth.is_empty() {
        return Err(AppError::BadRequest(
            "keys.p256dh and keys.auth are required".to_string(),
        ));
    }

    state
        .store
        .save_subscription(PushSubscription {
            id: Uuid::new_v4(),
            user_id: user.0.id,
            endpoint: endpoint.to_string(),
            keys: payload.keys,
            created_at: Utc::now(),
        })
        .await?;

    Ok(StatusCode::CREATED)
}
