mod common;

use std::sync::atomic::Ordering;

use uuid::Uuid;

use common::{parcel, FakeGateway, Harness};
use delivery_engine::engine::lifecycle::Actor;
use delivery_engine::error::AppError;
use delivery_engine::models::agent::VerificationStatus;
use delivery_engine::models::delivery::{Delivery, DeliveryStatus};
use delivery_engine::models::payment::PaymentStatus;
use delivery_engine::store::RecordStore;

async fn in_transit(h: &Harness) -> Delivery {
    h.add_agent(h.agent.id, VerificationStatus::Approved).await;
    let delivery = h.create_delivery(parcel()).await;
    let lifecycle = &h.state.lifecycle;

    lifecycle
        .accept_delivery(delivery.id, h.agent.id)
        .await
        .unwrap();
    lifecycle
        .advance(delivery.id, DeliveryStatus::InTransit, Actor::Agent(h.agent.id))
        .await
        .unwrap()
}

#[tokio::test]
async fn completed_payment_marks_delivery_paid_and_records_commission() {
    let h = Harness::new();
    let delivery = in_transit(&h).await;

    let payment = h
        .state
        .payments
        .initialize(delivery.id, &h.customer)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount, delivery.price);
    assert!(payment.reference.starts_with("DLV-"));
    assert!(payment.authorization_url.ends_with(&payment.reference));

    let completion = h.state.payments.complete(&payment.reference).await.unwrap();
    assert_eq!(completion.payment.status, PaymentStatus::Completed);
    assert_eq!(completion.delivery.status, DeliveryStatus::Paid);
    assert_eq!(completion.commission.payment_id, payment.id);
    assert_eq!(completion.commission.delivery_id, delivery.id);
    assert_eq!(completion.commission.rate, 0.10);
    assert!((completion.commission.amount - delivery.price * 0.10).abs() < 0.005);
}

#[tokio::test]
async fn repeated_completion_is_idempotent() {
    let h = Harness::new();
    let delivery = in_transit(&h).await;
    let payment = h
        .state
        .payments
        .initialize(delivery.id, &h.customer)
        .await
        .unwrap();

    let first = h.state.payments.complete(&payment.reference).await.unwrap();
    let second = h.state.payments.complete(&payment.reference).await.unwrap();

    assert_eq!(first.commission.id, second.commission.id);
    assert_eq!(second.delivery.status, DeliveryStatus::Paid);
    assert_eq!(h.gateway.verify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.store.commissions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_completions_record_one_commission() {
    let h = Harness::new();
    let delivery = in_transit(&h).await;
    let payment = h
        .state
        .payments
        .initialize(delivery.id, &h.customer)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        h.state.payments.complete(&payment.reference),
        h.state.payments.complete(&payment.reference),
    );

    let a = a.unwrap();
    let b = b.unwrap();
    assert_eq!(a.commission.id, b.commission.id);
    assert_eq!(h.store.commissions().await.unwrap().len(), 1);

    let stored = h.state.lifecycle.load(delivery.id).await.unwrap();
    assert_eq!(stored.status, DeliveryStatus::Paid);
}

#[tokio::test]
async fn declined_payment_leaves_delivery_in_transit() {
    let h = Harness::with_gateway(FakeGateway::declining("insufficient funds"));
    let delivery = in_transit(&h).await;
    let payment = h
        .state
        .payments
        .initialize(delivery.id, &h.customer)
        .await
        .unwrap();

    let err = h.state.payments.complete(&payment.reference).await.unwrap_err();
    assert!(matches!(err, AppError::PaymentDeclined(ref reason) if reason == "insufficient funds"));

    let stored_payment = h
        .store
        .payment_by_reference(&payment.reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored_payment.status, PaymentStatus::Failed);

    let stored = h.state.lifecycle.load(delivery.id).await.unwrap();
    assert_eq!(stored.status, DeliveryStatus::InTransit);
    assert!(h.store.commissions().await.unwrap().is_empty());

    let retry = h.state.payments.complete(&payment.reference).await.unwrap_err();
    assert!(matches!(retry, AppError::PaymentDeclined(_)));
    assert_eq!(h.gateway.verify_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn payment_requires_delivery_in_transit() {
    let h = Harness::new();
    h.add_agent(h.agent.id, VerificationStatus::Approved).await;
    let delivery = h.create_delivery(parcel()).await;

    let pending = h
        .state
        .payments
        .initialize(delivery.id, &h.customer)
        .await
        .unwrap_err();
    assert!(matches!(
        pending,
        AppError::InvalidTransition {
            from: DeliveryStatus::Pending,
            to: DeliveryStatus::Paid
        }
    ));

    h.state
        .lifecycle
        .accept_delivery(delivery.id, h.agent.id)
        .await
        .unwrap();
    let accepted = h
        .state
        .payments
        .initialize(delivery.id, &h.customer)
        .await
        .unwrap_err();
    assert!(matches!(
        accepted,
        AppError::InvalidTransition {
            from: DeliveryStatus::Accepted,
            to: DeliveryStatus::Paid
        }
    ));
}

#[tokio::test]
async fn only_the_owner_can_pay() {
    let h = Harness::new();
    let delivery = in_transit(&h).await;

    let err = h
        .state
        .payments
        .initialize(delivery.id, &h.other_customer)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
}

#[tokio::test]
async fn unknown_references_and_deliveries_are_not_found() {
    let h = Harness::new();

    let missing_payment = h.state.payments.complete("DLV-missing").await.unwrap_err();
    assert!(matches!(missing_payment, AppError::NotFound(_)));

    let missing_delivery = h
        .state
        .payments
        .initialize(Uuid::new_v4(), &h.customer)
        .await
        .unwrap_err();
    assert!(matches!(missing_delivery, AppError::NotFound(_)));
}

#[tokio::test]
async fn paid_delivery_can_still_be_delivered() {
    let h = Harness::new();
    let delivery = in_transit(&h).await;
    let payment = h
        .state
        .payments
        .initialize(delivery.id, &h.customer)
        .await
        .unwrap();
    h.state.payments.complete(&payment.reference).await.unwrap();

    let delivered = h
        .state
        .lifecycle
        .advance(delivery.id, DeliveryStatus::Delivered, Actor::Agent(h.agent.id))
        .await
        .unwrap();
    assert_eq!(delivered.status, DeliveryStatus::Delivered);

    let again = h.state.payments.complete(&payment.reference).await.unwrap();
    assert_eq!(again.delivery.status, DeliveryStatus::Delivered);
    assert_eq!(h.store.commissions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn second_initialize_reuses_the_pending_payment() {
    let h = Harness::new();
    let delivery = in_transit(&h).await;
    let payments = &h.state.payments;

    let first = payments.initialize(delivery.id, &h.customer).await.unwrap();
    let second = payments.initialize(delivery.id, &h.customer).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.reference, second.reference);

    payments.complete(&first.reference).await.unwrap();
    payments.complete(&second.reference).await.unwrap();

    let commissions = h.store.commissions().await.unwrap();
    assert_eq!(commissions.len(), 1);
    assert_eq!(commissions[0].delivery_id, delivery.id);
}

#[tokio::test]
async fn completed_payment_blocks_another_one() {
    let h = Harness::new();
    let delivery = in_transit(&h).await;
    let payment = h
        .state
        .payments
        .initialize(delivery.id, &h.customer)
        .await
        .unwrap();

    // Captured by the gateway but not yet settled: the delivery is still in transit.
    h.store
        .update_payment_status(&payment.reference, PaymentStatus::Pending, PaymentStatus::Completed)
        .await
        .unwrap();

    let err = h
        .state
        .payments
        .initialize(delivery.id, &h.customer)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicatePayment(_)));

    let completion = h.state.payments.complete(&payment.reference).await.unwrap();
    assert_eq!(completion.delivery.status, DeliveryStatus::Paid);
    assert_eq!(h.store.commissions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn declined_payment_can_be_retried_once() {
    let h = Harness::new();
    let delivery = in_transit(&h).await;
    let first = h
        .state
        .payments
        .initialize(delivery.id, &h.customer)
        .await
        .unwrap();

    h.store
        .update_payment_status(&first.reference, PaymentStatus::Pending, PaymentStatus::Failed)
        .await
        .unwrap();

    let retry = h
        .state
        .payments
        .initialize(delivery.id, &h.customer)
        .await
        .unwrap();
    assert_ne!(retry.reference, first.reference);

    let completion = h.state.payments.complete(&retry.reference).await.unwrap();
    assert_eq!(completion.commission.payment_id, retry.id);

    let stale = h.state.payments.complete(&first.reference).await.unwrap_err();
    assert!(matches!(stale, AppError::PaymentDeclined(_)));
    assert_eq!(h.store.commissions().await.unwrap().len(), 1);
}
