use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Serialize;
use tracing::info;

use crate::api::rest::extract::CurrentUser;
use crate::auth::Role;
use crate::error::AppError;
use crate::models::payment::Commission;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/commissions", get(list_commissions))
        .route("/admin/geo-cache/clear", post(clear_geo_cache))
}

#[derive(Serialize)]
struct ClearResponse {
    cleared: usize,
}

async fn list_commissions(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<Vec<Commission>>, AppError> {
    user.require(Role::Admin)?;
    Ok(Json(state.payments.ledger().entries().await?))
}

async fn clear_geo_cache(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<ClearResponse>, AppError> {
    user.require(Role::Admin)?;

    let cleared = state.geo_cache.clear();
    info!(cleared, "geo cache cleared");
    Ok(Json(ClearResponse { cleared }))
}
