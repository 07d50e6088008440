//! Domain models for billing-service.

mod plan;
mod subscriber;

pub use plan::{Entitlement, PlanLimit, UsageCounter};
pub use subscriber::{PlanTier, Subscriber, SubscriptionStatus};
