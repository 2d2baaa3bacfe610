use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::extract::CurrentUser;
use crate::auth::Role;
use crate::engine::lifecycle::{Actor, DeliveryRequest};
use crate::error::AppError;
use crate::models::delivery::{Delivery, DeliveryStatus, ItemDetails};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(create_delivery).get(list_deliveries))
        .route("/deliveries/available", get(list_available))
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/cancel", post(cancel_delivery))
        .route("/deliveries/:id/accept", post(accept_delivery))
        .route("/deliveries/:id/status", post(advance_delivery))
}

#[derive(Deserialize)]
pub struct AdvanceRequest {
    pub status: DeliveryStatus,
}

fn validate(request: &DeliveryRequest) -> Result<(), AppError> {
    if request.pickup_address.trim().is_empty() {
        return Err(AppError::BadRequest("pickup_address cannot be empty".to_string()));
    }
    if request.dropoff_address.trim().is_empty() {
        return Err(AppError::BadRequest("dropoff_address cannot be empty".to_string()));
    }

    let ItemDetails {
        description,
        weight,
        value,
    } = &request.item_details;

    if description.trim().is_empty() {
        return Err(AppError::BadRequest(
            "item_details.description cannot be empty".to_string(),
        ));
    }
    for (field, amount) in [("weight", weight), ("value", value)] {
        if amount.is_some_and(|amount| !amount.is_finite() || amount < 0.0) {
            return Err(AppError::BadRequest(format!(
                "item_details.{field} must be a non-negative number"
            )));
        }
    }

    Ok(())
}

async fn create_delivery(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(payload): Json<DeliveryRequest>,
) -> Result<Json<Delivery>, AppError> {
    let customer = user.require(Role::Customer)?;
    validate(&payload)?;

    let delivery = state.lifecycle.create_delivery(customer.id, payload).await?;
    Ok(Json(delivery))
}

async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<Vec<Delivery>>, AppError> {
    let customer = user.require(Role::Customer)?;
    Ok(Json(state.lifecycle.list_for_customer(customer.id).await?))
}

async fn list_available(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<Vec<Delivery>>, AppError> {
    user.require(Role::Agent)?;
    Ok(Json(state.lifecycle.list_available().await?))
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    user: CurrentUser,
) -> Result<Json<Delivery>, AppError> {
    Ok(Json(state.lifecycle.get_delivery(id, &user.0).await?))
}

async fn cancel_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    user: CurrentUser,
) -> Result<Json<Delivery>, AppError> {
    let customer = user.require(Role::Customer)?;
    Ok(Json(state.lifecycle.cancel_delivery(id, customer.id).await?))
}

async fn accept_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    user: CurrentUser,
) -> Result<Json<Delivery>, AppError> {
    let agent = user.require(Role::Agent)?;
    Ok(Json(state.lifecycle.accept_delivery(id, agent.id).await?))
}

async fn advance_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    user: CurrentUser,
    Json(payload): Json<AdvanceRequest>,
) -> Result<Json<Delivery>, AppError> {
    let actor = match user.0.role {
        Role::Customer => Actor::Customer(user.0.id),
        Role::Agent => Actor::Agent(user.0.id),
        Role::Admin => {
            return Err(AppError::Unauthorized(
                "admins cannot drive delivery status".to_string(),
            ));
        }
    };

    Ok(Json(state.lifecycle.advance(id, payload.status, actor).await?))
}
