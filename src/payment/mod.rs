pub mod paystack;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::AppError;

pub use paystack::PaystackGateway;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment gateway is not configured")]
    Disabled,

    #[error("payment gateway rejected request: {0}")]
    Rejected(String),

    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        AppError::UpstreamUnavailable(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub amount: f64,
    pub reference: String,
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentVerdict {
    Succeeded { amount: f64 },
    Declined { reason: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Starts a transaction and returns the URL the customer is sent to.
    async fn initialize(&self, request: &PaymentRequest) -> Result<String, PaymentError>;

    async fn verify(&self, reference: &str) -> Result<PaymentVerdict, PaymentError>;
}

pub struct DisabledPaymentGateway;

#[async_trait]
impl PaymentGateway for DisabledPaymentGateway {
    async fn initialize(&self, _request: &PaymentRequest) -> Result<String, PaymentError> {
        Err(PaymentError::Disabled)
    }

    async fn verify(&self, _reference: &str) -> Result<PaymentVerdict, PaymentError> {
        Err(PaymentError::Disabled)
    }
}
