use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::models::push::{Notification, PushSubscription, SubscriptionKeys};

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push transport is not configured")]
    Disabled,

    #[error("push endpoint rejected notification: {0}")]
    Rejected(String),

    #[error("push transport unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(
        &self,
        subscription: &PushSubscription,
        notification: &Notification,
    ) -> Result<(), PushError>;
}

/// Transport used when no relay is configured. Every send fails, which the
/// fan-out records as a failed endpoint.
pub struct DisabledPushTransport;

#[async_trait]
impl PushTransport for DisabledPushTransport {
    async fn send(
        &self,
        _subscription: &PushSubscription,
        _notification: &Notification,
    ) -> Result<(), PushError> {
        Err(PushError::Disabled)
    }
}

#[derive(Serialize)]
struct RelaySubscription<'a> {
    endpoint: &'a str,
    keys: &'a SubscriptionKeys,
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    subscription: RelaySubscription<'a>,
    payload: &'a Notification,
}

/// Hands notifications to a web-push relay over HTTP. The relay owns VAPID
/// signing and payload encryption.
pub struct HttpPushRelay {
    http: reqwest::Client,
    url: String,
}

impl HttpPushRelay {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl PushTransport for HttpPushRelay {
    async fn send(
        &self,
        subscription: &PushSubscription,
        notification: &Notification,
    ) -> Result<(), PushError> {
        let request = RelayRequest {
            subscription: RelaySubscription {
                endpoint: &subscription.endpoint,
                keys: &subscription.keys,
            },
            payload: notification,
        };

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|err| PushError::Unavailable(err.to_string()))?;

        relay_outcome(response.status())
    }
}

fn relay_outcome(status: StatusCode) -> Result<(), PushError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(PushError::Rejected(format!("relay returned {status}")))
    }
}
