use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::auth::{Credentials, Role, UserIdentity};
use crate::error::AppError;
use crate::state::AppState;

/// Caller resolved from `Authorization: Bearer <token>`.
pub struct CurrentUser(pub UserIdentity);

impl CurrentUser {
    pub fn require(&self, role: Role) -> Result<&UserIdentity, AppError> {
        if self.0.role == role {
            Ok(&self.0)
        } else {
            Err(AppError::Unauthorized(format!(
                "this action requires the {role:?} role"
            )))
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AppError::Unauthenticated)?;

        let identity = state
            .identity
            .authenticate(&Credentials::Bearer(token.to_string()))
            .await?;

        Ok(CurrentUser(identity))
    }
}
