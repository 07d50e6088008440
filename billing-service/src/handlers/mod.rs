//! HTTP handlers for billing-service.

pub mod checkout;
pub mod entitlements;
pub mod health;
pub mod subscriptions;
pub mod usage;
pub mod webhooks;
