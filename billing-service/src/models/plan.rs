//! Plan limits and usage counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Per-tier ceiling for one resource. -1 means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanLimit {
    pub plan_tier: String,
    pub resource: String,
    pub max_count: i32,
}

/// Event-reported count of a resource for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageCounter {
    pub tenant_id: Uuid,
    pub resource: String,
    pub current_count: i32,
    pub updated_utc: DateTime<Utc>,
}

/// The gate's answer for one resource.
#[derive(Debug, Clone, Serialize)]
pub struct Entitlement {
    pub resource: String,
    pub plan_tier: String,
    /// -1 means unlimited.
    pub limit: i32,
    pub current: i32,
    pub can_create: bool,
}

impl Entitlement {
    pub fn evaluate(resource: &str, plan_tier: &str, limit: i32, current: i32) -> Self {
        let can_create = limit == -1 || current < limit;
        Self {
            resource: resource.to_string(),
            plan_tier: plan_tier.to_string(),
            limit,
            current,
            can_create,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_limit_allows() {
        assert!(Entitlement::evaluate("invoices", "free", 5, 4).can_create);
    }

    #[test]
    fn test_at_limit_denies() {
        assert!(!Entitlement::evaluate("invoices", "free", 5, 5).can_create);
    }

    #[test]
    fn test_over_limit_denies() {
        assert!(!Entitlement::evaluate("clients", "basic", 50, 51).can_create);
    }

    #[test]
    fn test_unlimited_always_allows() {
        assert!(Entitlement::evaluate("invoices", "premium", -1, 1_000_000).can_create);
    }

    #[test]
    fn test_zero_limit_denies_everything() {
        assert!(!Entitlement::evaluate("quotations", "free", 0, 0).can_create);
    }
}
