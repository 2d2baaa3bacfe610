use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::payment::{Commission, Payment, PaymentStatus};
use crate::observability::metrics::Metrics;
use crate::store::RecordStore;

/// Operator cut, rounded to the currency's minor unit.
pub fn commission_amount(payment_amount: f64, rate: f64) -> f64 {
    (payment_amount * rate * 100.0).round() / 100.0
}

pub struct CommissionLedger {
    store: Arc<dyn RecordStore>,
    rate: f64,
    metrics: Metrics,
}

impl CommissionLedger {
    pub fn new(store: Arc<dyn RecordStore>, rate: f64, metrics: Metrics) -> Self {
        Self {
            store,
            rate,
            metrics,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Records the commission for a completed payment. Repeated calls for the
    /// same payment return the entry written by the first.
    pub async fn record(&self, payment: &Payment) -> Result<Commission, AppError> {
        if payment.status != PaymentStatus::Completed {
            return Err(AppError::Internal(format!(
                "commission requested for payment {} in status {:?}",
                payment.reference, payment.status
            )));
        }

        let commission = Commission {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            delivery_id: payment.delivery_id,
            amount: commission_amount(payment.amount, self.rate),
            rate: self.rate,
            created_at: Utc::now(),
        };

        if self.store.insert_commission(commission.clone()).await? {
            self.metrics.commissions_recorded_total.inc();
            info!(
                payment_id = %commission.payment_id,
                delivery_id = %commission.delivery_id,
                amount = commission.amount,
                "commission recorded"
            );
            return Ok(commission);
        }

        self.store
            .commission_for_payment(payment.id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!("commission for payment {} vanished", payment.id))
            })
    }

    pub async fn entries(&self) -> Result<Vec<Commission>, AppError> {
        Ok(self.store.commissions().await?)
    }
}
