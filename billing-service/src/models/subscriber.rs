//! Subscriber model: one row per tenant, mirroring the billing provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Plan tier, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Basic,
    Standard,
    Premium,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Basic => "basic",
            PlanTier::Standard => "standard",
            PlanTier::Premium => "premium",
        }
    }

    /// Unknown tiers resolve to free; the gate fails closed.
    pub fn from_string(s: &str) -> Self {
        match s {
            "basic" => PlanTier::Basic,
            "standard" => PlanTier::Standard,
            "premium" => PlanTier::Premium,
            _ => PlanTier::Free,
        }
    }
}

/// Subscription state as last seen at the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    None,
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::None => "none",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "active" => SubscriptionStatus::Active,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::None,
        }
    }
}

/// Subscriber row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscriber {
    pub tenant_id: Uuid,
    pub provider_customer_id: Option<String>,
    pub provider_subscription_id: Option<String>,
    pub plan_tier: String,
    pub subscription_status: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub last_synced_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Subscriber {
    /// Effective tier: an inactive subscription gates at free.
    pub fn effective_tier(&self) -> PlanTier {
        match SubscriptionStatus::from_string(&self.subscription_status) {
            SubscriptionStatus::Active => PlanTier::from_string(&self.plan_tier),
            _ => PlanTier::Free,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber(tier: &str, status: &str) -> Subscriber {
        Subscriber {
            tenant_id: Uuid::new_v4(),
            provider_customer_id: None,
            provider_subscription_id: None,
            plan_tier: tier.to_string(),
            subscription_status: status.to_string(),
            current_period_start: None,
            current_period_end: None,
            last_synced_utc: None,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    #[test]
    fn test_active_subscription_uses_plan_tier() {
        assert_eq!(
            subscriber("premium", "active").effective_tier(),
            PlanTier::Premium
        );
    }

    #[test]
    fn test_inactive_subscription_gates_at_free() {
        assert_eq!(
            subscriber("premium", "canceled").effective_tier(),
            PlanTier::Free
        );
        assert_eq!(
            subscriber("standard", "past_due").effective_tier(),
            PlanTier::Free
        );
        assert_eq!(subscriber("basic", "none").effective_tier(), PlanTier::Free);
    }

    #[test]
    fn test_unknown_tier_resolves_to_free() {
        assert_eq!(PlanTier::from_string("enterprise"), PlanTier::Free);
    }

    #[test]
    fn test_tier_ordering() {
        assert!(PlanTier::Free < PlanTier::Basic);
        assert!(PlanTier::Standard < PlanTier::Premium);
    }
}
