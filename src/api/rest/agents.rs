use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::extract::CurrentUser;
use crate::auth::Role;
use crate::error::AppError;
use crate::models::agent::{Agent, VerificationStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/agents", post(register_agent).get(list_agents))
        .route("/agents/:id/verification", patch(update_verification))
}

#[derive(Deserialize)]
pub struct RegisterAgentRequest {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Deserialize)]
pub struct AgentFilter {
    pub verification: Option<VerificationStatus>,
}

#[derive(Deserialize)]
pub struct VerificationRequest {
    pub status: VerificationStatus,
}

async fn register_agent(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(payload): Json<RegisterAgentRequest>,
) -> Result<Json<Agent>, AppError> {
    user.require(Role::Admin)?;

    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if state.store.get_agent(payload.id).await?.is_some() {
        return Err(AppError::BadRequest(format!(
            "agent {} is already registered",
            payload.id
        )));
    }

    let now = Utc::now();
    let agent = Agent {
        id: payload.id,
        name: payload.name.trim().to_string(),
        phone: payload.phone,
        verification: VerificationStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    Ok(Json(state.store.upsert_agent(agent).await?))
}

async fn list_agents(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(filter): Query<AgentFilter>,
) -> Result<Json<Vec<Agent>>, AppError> {
    user.require(Role::Admin)?;
    Ok(Json(
        state
            .store
            .agents_with_verification(filter.verification)
            .await?,
    ))
}

async fn update_verification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    user: CurrentUser,
    Json(payload): Json<VerificationRequest>,
) -> Result<Json<Agent>, AppError> {
    user.require(Role::Admin)?;

    let mut agent = state
        .store
        .get_agent(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("agent {} not found", id)))?;

    agent.verification = payload.status;
    agent.updated_at = Utc::now();

    tracing::info!(agent_id = %id, verification = ?agent.verification, "agent verification updated");
    Ok(Json(state.store.upsert_agent(agent).await?))
}
