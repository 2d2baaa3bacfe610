use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::api::rest::extract::CurrentUser;
use crate::auth::Role;
use crate::engine::payments::PaymentCompletion;
use crate::error::AppError;
use crate::models::payment::Payment;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries/:id/payments", post(initialize_payment))
        .route("/payments/:reference/verify", post(verify_payment))
}

async fn initialize_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    user: CurrentUser,
) -> Result<Json<Payment>, AppError> {
    let customer = user.require(Role::Customer)?;
    Ok(Json(state.payments.initialize(id, customer).await?))
}

async fn verify_payment(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
    _user: CurrentUser,
) -> Result<Json<PaymentCompletion>, AppError> {
    Ok(Json(state.payments.complete(&reference).await?))
}
