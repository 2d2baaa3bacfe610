pub mod dispatch;
pub mod ledger;
pub mod lifecycle;
pub mod payments;
pub mod pricing;
pub mod queue;
