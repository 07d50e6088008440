//! Business services for billing-service.

pub mod database;
pub mod entitlements;
pub mod metrics;
pub mod provider;

pub use database::{Database, SubscriberSync};
pub use entitlements::EntitlementService;
pub use provider::ProviderClient;
