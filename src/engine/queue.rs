use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::models::delivery::Delivery;
use crate::observability::metrics::Metrics;

/// Submission side of the dispatch queue.
///
/// `submit` never waits and never fails the caller: when the queue is full or
/// the worker is gone, the delivery is dropped from dispatch and logged. The
/// delivery itself stays persisted and visible in `/deliveries/available`.
#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<Delivery>,
    metrics: Metrics,
}

impl DispatchQueue {
    pub fn channel(capacity: usize, metrics: Metrics) -> (Self, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, metrics }, rx)
    }

    pub fn submit(&self, delivery: Delivery) -> bool {
        let delivery_id = delivery.id;

        // Counted before the send so the worker's decrement never overtakes it.
        self.metrics.dispatch_queue_depth.inc();
        let reason = match self.tx.try_send(delivery) {
            Ok(()) => return true,
            Err(TrySendError::Full(_)) => {
                warn!(%delivery_id, "dispatch queue full; skipping fan-out");
                "full"
            }
            Err(TrySendError::Closed(_)) => {
                warn!(%delivery_id, "dispatch worker stopped; skipping fan-out");
                "closed"
            }
        };

        self.metrics.dispatch_queue_depth.dec();
        self.metrics
            .dispatch_dropped_total
            .with_label_values(&[reason])
            .inc();
        false
    }
}
