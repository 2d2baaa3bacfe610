pub mod agent;
pub mod delivery;
pub mod location;
pub mod payment;
pub mod push;
