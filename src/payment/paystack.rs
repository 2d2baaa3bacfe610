use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::payment::{PaymentError, PaymentGateway, PaymentRequest, PaymentVerdict};

/// Amounts go over the wire in the currency's minor unit.
const MINOR_UNITS: f64 = 100.0;

pub struct PaystackGateway {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
    callback_url: Option<String>,
}

impl PaystackGateway {
    pub fn new(
        secret_key: impl Into<String>,
        base_url: impl Into<String>,
        callback_url: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            callback_url,
        }
    }
}

#[derive(Serialize)]
struct InitializeBody<'a> {
    email: &'a str,
    amount: u64,
    reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Deserialize)]
struct InitializeData {
    authorization_url: String,
}

#[derive(Deserialize)]
struct VerifyData {
    status: String,
    amount: u64,
    #[serde(default)]
    gateway_response: Option<String>,
}

fn unavailable(err: reqwest::Error) -> PaymentError {
    PaymentError::Unavailable(err.to_string())
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    async fn initialize(&self, request: &PaymentRequest) -> Result<String, PaymentError> {
        let email = request
            .customer_email
            .as_deref()
            .ok_or_else(|| PaymentError::Rejected("customer email is required".to_string()))?;

        let body = InitializeBody {
            email,
            amount: to_minor_units(request.amount),
            reference: &request.reference,
            callback_url: self.callback_url.as_deref(),
        };

        let envelope: Envelope<InitializeData> = self
            .http
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)?;

        initialize_outcome(envelope)
    }

    async fn verify(&self, reference: &str) -> Result<PaymentVerdict, PaymentError> {
        let envelope: Envelope<VerifyData> = self
            .http
            .get(format!("{}/transaction/verify/{reference}", self.base_url))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)?;

        verify_outcome(envelope)
    }
}

fn to_minor_units(amount: f64) -> u64 {
    (amount * MINOR_UNITS).round() as u64
}

fn from_minor_units(amount: u64) -> f64 {
    amount as f64 / MINOR_UNITS
}

fn initialize_outcome(envelope: Envelope<InitializeData>) -> Result<String, PaymentError> {
    match envelope {
        Envelope {
            status: true,
            data: Some(data),
            ..
        } => Ok(data.authorization_url),
        Envelope { message, .. } => Err(PaymentError::Rejected(message)),
    }
}

fn verify_outcome(envelope: Envelope<VerifyData>) -> Result<PaymentVerdict, PaymentError> {
    let data = match envelope {
        Envelope {
            status: true,
            data: Some(data),
            ..
        } => data,
        Envelope { message, .. } => return Err(PaymentError::Rejected(message)),
    };

    if data.status == "success" {
        Ok(PaymentVerdict::Succeeded {
            amount: from_minor_units(data.amount),
        })
    } else {
        Ok(PaymentVerdict::Declined {
            reason: data.gateway_response.unwrap_or(data.status),
        })
    }
}
