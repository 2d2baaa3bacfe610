use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{Credentials, Role};
use crate::error::AppError;
use crate::state::AppState;

/// Browsers cannot set headers on an upgrade request, so the bearer token
/// travels in the query string.
#[derive(Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
) -> Result<impl IntoResponse, AppError> {
    let token = params
        .token
        .filter(|token| !token.trim().is_empty())
        .ok_or(AppError::Unauthenticated)?;

    let identity = state
        .identity
        .authenticate(&Credentials::Bearer(token))
        .await?;
    if identity.role != Role::Agent {
        return Err(AppError::Unauthorized(
            "only agents receive delivery events".to_string(),
        ));
    }

    Ok(ws.on_upgrade(move |socket| stream_events(socket, state, identity.id)))
}

/// Streams new-delivery events until either side hangs up. Slow clients
/// skip missed events rather than stalling the broadcast.
async fn stream_events(socket: WebSocket, state: Arc<AppState>, agent_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.delivery_events_tx.subscribe();

    info!(%agent_id, "agent event stream opened");

    let forward = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%agent_id, skipped, "agent event stream lagging");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(error = %err, "failed to encode delivery event");
                    continue;
                }
            };

            if sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    // Inbound frames are ignored; the loop only detects disconnects.
    let drain = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    first_to_finish(forward, drain).await;

    info!(%agent_id, "agent event stream closed");
}

/// Waits for either task, then aborts the other and waits for it to stop so
/// its broadcast receiver is released.
async fn first_to_finish(mut a: JoinHandle<()>, mut b: JoinHandle<()>) {
    let straggler = tokio::select! {
        _ = &mut a => b,
        _ = &mut b => a,
    };

    straggler.abort();
    let _ = straggler.await;
}
