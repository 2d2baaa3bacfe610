use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::UserIdentity;
use crate::engine::ledger::CommissionLedger;
use crate::engine::lifecycle::{Actor, DeliveryLifecycle};
use crate::error::AppError;
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::payment::{Commission, Payment, PaymentStatus};
use crate::payment::{PaymentGateway, PaymentRequest, PaymentVerdict};
use crate::store::{Conditional, RecordStore};

/// Largest gap tolerated between the charged and the quoted amount.
const AMOUNT_TOLERANCE: f64 = 0.005;

#[derive(Debug, Clone, Serialize)]
pub struct PaymentCompletion {
    pub payment: Payment,
    pub delivery: Delivery,
    pub commission: Commission,
}

/// Payment capture for in-transit deliveries. Completion is the only path
/// into `PAID`, and it records the commission for the same payment.
pub struct PaymentService {
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn PaymentGateway>,
    lifecycle: Arc<DeliveryLifecycle>,
    ledger: CommissionLedger,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        gateway: Arc<dyn PaymentGateway>,
        lifecycle: Arc<DeliveryLifecycle>,
        ledger: CommissionLedger,
    ) -> Self {
        Self {
            store,
            gateway,
            lifecycle,
            ledger,
        }
    }

    pub fn ledger(&self) -> &CommissionLedger {
        &self.ledger
    }

    pub async fn initialize(
        &self,
        delivery_id: Uuid,
        customer: &UserIdentity,
    ) -> Result<Payment, AppError> {
        let delivery = self.lifecycle.load(delivery_id).await?;

        if delivery.customer_id != customer.id {
            return Err(AppError::Unauthorized(
                "only the customer who requested this delivery can pay for it".to_string(),
            ));
        }
        if delivery.status != DeliveryStatus::InTransit {
            return Err(AppError::InvalidTransition {
                from: delivery.status,
                to: DeliveryStatus::Paid,
            });
        }

        if let Some(existing) = self.store.open_payment_for_delivery(delivery_id).await? {
            return reuse_open_payment(existing);
        }

        let reference = format!("DLV-{}", Uuid::new_v4().simple());
        let authorization_url = self
            .gateway
            .initialize(&PaymentRequest {
                amount: delivery.price,
                reference: reference.clone(),
                customer_email: customer.email.clone(),
            })
            .await?;

        let now = Utc::now();
        let inserted = self
            .store
            .insert_payment(Payment {
                id: Uuid::new_v4(),
                delivery_id,
                reference,
                amount: delivery.price,
                status: PaymentStatus::Pending,
                authorization_url,
                created_at: now,
                updated_at: now,
            })
            .await?;

        let payment = match inserted {
            Conditional::Applied(payment) => payment,
            // A concurrent initialize stored its payment first.
            Conditional::Rejected(existing) => return reuse_open_payment(existing),
            Conditional::Missing => {
                return Err(AppError::Internal(format!(
                    "payment for delivery {delivery_id} vanished on insert"
                )));
            }
        };

        info!(
            %delivery_id,
            reference = %payment.reference,
            amount = payment.amount,
            "payment initialized"
        );
        Ok(payment)
    }

    /// Verifies the payment with the gateway and settles it. Safe to call
    /// repeatedly: a completed payment settles to the same result.
    pub async fn complete(&self, reference: &str) -> Result<PaymentCompletion, AppError> {
        let payment = self
            .store
            .payment_by_reference(reference)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("payment {reference} not found")))?;

        match payment.status {
            PaymentStatus::Completed => return self.settle(payment).await,
            PaymentStatus::Failed => {
                return Err(AppError::PaymentDeclined(format!(
                    "payment {reference} already failed"
                )));
            }
            PaymentStatus::Pending => {}
        }

        match self.gateway.verify(reference).await? {
            PaymentVerdict::Succeeded { amount } if (amount - payment.amount).abs() <= AMOUNT_TOLERANCE => {}
            PaymentVerdict::Succeeded { amount } => {
                return self
                    .decline(
                        reference,
                        format!("charged {amount} but delivery costs {}", payment.amount),
                    )
                    .await;
            }
            PaymentVerdict::Declined { reason } => return self.decline(reference, reason).await,
        }

        match self
            .store
            .update_payment_status(reference, PaymentStatus::Pending, PaymentStatus::Completed)
            .await?
        {
            Conditional::Applied(payment) => {
                info!(reference, delivery_id = %payment.delivery_id, "payment completed");
                self.settle(payment).await
            }
            Conditional::Rejected(payment) if payment.status == PaymentStatus::Completed => {
                self.settle(payment).await
            }
            Conditional::Rejected(_) => Err(AppError::PaymentDeclined(format!(
                "payment {reference} already failed"
            ))),
            Conditional::Missing => Err(AppError::NotFound(format!("payment {reference} not found"))),
        }
    }

    async fn decline(
        &self,
        reference: &str,
        reason: String,
    ) -> Result<PaymentCompletion, AppError> {
        warn!(reference, reason = %reason, "payment declined");
        self.store
            .update_payment_status(reference, PaymentStatus::Pending, PaymentStatus::Failed)
            .await?;
        Err(AppError::PaymentDeclined(reason))
    }

    /// Moves the delivery to `PAID` if it is still in transit and makes sure
    /// the commission exists. Only the payment that won the `PAID` edge, or
    /// the delivery's open payment on a repeat, records a commission.
    async fn settle(&self, payment: Payment) -> Result<PaymentCompletion, AppError> {
        let delivery = self.lifecycle.load(payment.delivery_id).await?;

        let (delivery, won_transition) = if delivery.status == DeliveryStatus::InTransit {
            match self
                .lifecycle
                .advance(delivery.id, DeliveryStatus::Paid, Actor::PaymentProcessor)
                .await
            {
                Ok(delivery) => (delivery, true),
                // A concurrent settle got there first.
                Err(AppError::InvalidTransition { .. }) => {
                    (self.lifecycle.load(payment.delivery_id).await?, false)
                }
                Err(err) => return Err(err),
            }
        } else {
            (delivery, false)
        };

        if !won_transition {
            let settled_by = self
                .store
                .open_payment_for_delivery(payment.delivery_id)
                .await?
                .map(|open| open.id);
            if settled_by != Some(payment.id) {
                warn!(
                    reference = %payment.reference,
                    delivery_id = %payment.delivery_id,
                    status = %delivery.status,
                    "completed payment does not own this delivery; no commission recorded"
                );
                return Err(AppError::DuplicatePayment(format!(
                    "delivery {} was settled by another payment",
                    payment.delivery_id
                )));
            }
        }

        let commission = self.ledger.record(&payment).await?;

        Ok(PaymentCompletion {
            payment,
            delivery,
            commission,
        })
    }
}

fn reuse_open_payment(existing: Payment) -> Result<Payment, AppError> {
    match existing.status {
        PaymentStatus::Pending => {
            info!(reference = %existing.reference, "reusing pending payment");
            Ok(existing)
        }
        _ => Err(AppError::DuplicatePayment(format!(
            "delivery {} is covered by payment {}",
            existing.delivery_id, existing.reference
        ))),
    }
}
