use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Agent,
    Admin,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CUSTOMER" => Ok(Role::Customer),
            "AGENT" => Ok(Role::Agent),
            "ADMIN" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: Uuid,
    pub role: Role,
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Credentials {
    Bearer(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => AppError::Unauthenticated,
            AuthError::Unavailable(msg) => AppError::UpstreamUnavailable(msg),
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<UserIdentity, AuthError>;
}

/// Fixed bearer-token table.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    tokens: HashMap<String, UserIdentity>,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, identity: UserIdentity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }

    /// Parses `token:uuid:ROLE[:email]` entries separated by commas.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut provider = Self::new();

        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.splitn(4, ':');
            let (Some(token), Some(id), Some(role)) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(format!("malformed token entry: {entry}"));
            };

            let id = Uuid::parse_str(id).map_err(|err| format!("invalid user id {id}: {err}"))?;
            let role = role.parse::<Role>()?;
            let email = parts.next().map(str::to_string);

            provider = provider.with_token(token, UserIdentity { id, role, email });
        }

        Ok(provider)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn authenticate(&self, credentials: &Credentials) -> Result<UserIdentity, AuthError> {
        match credentials {
            Credentials::Bearer(token) => self
                .tokens
                .get(token)
                .cloned()
                .ok_or(AuthError::InvalidCredentials),
        }
    }
}
