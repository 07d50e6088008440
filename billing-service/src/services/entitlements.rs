//! Entitlement gate: can this tenant create one more of a resource?
//!
//! The answer combines the tenant's effective plan tier (synced from the
//! billing provider, throttled to one refresh per tenant per 30 seconds) with
//! plan limits and event-reported usage counters.

use crate::models::{Entitlement, PlanTier, Subscriber, SubscriptionStatus};
use crate::services::database::{Database, SubscriberSync};
use crate::services::metrics::{GATE_DECISIONS_TOTAL, SUBSCRIPTION_REFRESHES_TOTAL};
use crate::services::provider::{infer_tier, ProviderClient, ProviderSubscription};
use chrono::DateTime;
use dashmap::DashMap;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Minimum gap between provider refreshes for one tenant.
const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

pub(crate) fn refresh_due(last_refresh: Option<Instant>, now: Instant) -> bool {
    match last_refresh {
        Some(last) => now.duration_since(last) >= REFRESH_INTERVAL,
        None => true,
    }
}

#[derive(Clone)]
pub struct EntitlementService {
    db: Database,
    provider: ProviderClient,
    last_refresh: Arc<DashMap<Uuid, Instant>>,
}

impl EntitlementService {
    pub fn new(db: Database, provider: ProviderClient) -> Self {
        Self {
            db,
            provider,
            last_refresh: Arc::new(DashMap::new()),
        }
    }

    /// Sync a tenant's subscription from the provider.
    ///
    /// Throttled per tenant unless `force` is set. A tenant with no provider
    /// customer, or an unconfigured provider, stays on its stored state
    /// (free by default).
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn refresh_subscription(
        &self,
        tenant_id: Uuid,
        force: bool,
    ) -> Result<Option<Subscriber>, AppError> {
        let existing = self.db.get_subscriber(tenant_id).await?;

        let now = Instant::now();
        let last = self.last_refresh.get(&tenant_id).map(|e| *e.value());
        if !force && !refresh_due(last, now) {
            SUBSCRIPTION_REFRESHES_TOTAL
                .with_label_values(&["skipped"])
                .inc();
            return Ok(existing);
        }

        let customer_id = match existing.as_ref().and_then(|s| s.provider_customer_id.clone()) {
            Some(id) => id,
            None => {
                // Nothing to sync against; stored state stands.
                self.last_refresh.insert(tenant_id, now);
                return Ok(existing);
            }
        };

        if !self.provider.is_configured() {
            self.last_refresh.insert(tenant_id, now);
            return Ok(existing);
        }

        let subscription = match self.provider.fetch_subscription(&customer_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                SUBSCRIPTION_REFRESHES_TOTAL
                    .with_label_values(&["failed"])
                    .inc();
                warn!(error = %e, "Provider refresh failed, using stored subscription state");
                self.last_refresh.insert(tenant_id, now);
                return Ok(existing);
            }
        };

        let sync = build_sync(&customer_id, subscription.as_ref());
        let subscriber = self.db.upsert_subscriber(tenant_id, &sync).await?;
        self.last_refresh.insert(tenant_id, now);

        SUBSCRIPTION_REFRESHES_TOTAL
            .with_label_values(&["synced"])
            .inc();

        info!(
            plan_tier = %subscriber.plan_tier,
            subscription_status = %subscriber.subscription_status,
            "Subscription refreshed from provider"
        );

        Ok(Some(subscriber))
    }

    /// Apply subscription state pushed by a provider webhook.
    #[instrument(skip(self, subscription), fields(tenant_id = %tenant_id))]
    pub async fn apply_provider_subscription(
        &self,
        tenant_id: Uuid,
        customer_id: &str,
        subscription: Option<&ProviderSubscription>,
    ) -> Result<Subscriber, AppError> {
        let sync = build_sync(customer_id, subscription);
        let subscriber = self.db.upsert_subscriber(tenant_id, &sync).await?;
        self.last_refresh.insert(tenant_id, Instant::now());
        Ok(subscriber)
    }

    /// Gate decision for one resource.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn can_create(
        &self,
        tenant_id: Uuid,
        resource: &str,
    ) -> Result<Entitlement, AppError> {
        let subscriber = self.refresh_subscription(tenant_id, false).await?;

        let tier = subscriber
            .as_ref()
            .map(Subscriber::effective_tier)
            .unwrap_or(PlanTier::Free);

        let limit = self.db.get_plan_limit(tier.as_str(), resource).await?;
        let current = self.db.get_usage(tenant_id, resource).await?;

        let entitlement = Entitlement::evaluate(resource, tier.as_str(), limit, current);

        GATE_DECISIONS_TOTAL
            .with_label_values(&[
                resource,
                if entitlement.can_create {
                    "allowed"
                } else {
                    "denied"
                },
            ])
            .inc();

        Ok(entitlement)
    }
}

fn build_sync(customer_id: &str, subscription: Option<&ProviderSubscription>) -> SubscriberSync {
    match subscription {
        Some(sub) => SubscriberSync {
            provider_customer_id: Some(customer_id.to_string()),
            provider_subscription_id: Some(sub.id.clone()),
            plan_tier: infer_tier(sub).as_str().to_string(),
            subscription_status: SubscriptionStatus::from_string(&sub.status)
                .as_str()
                .to_string(),
            current_period_start: sub
                .current_period_start
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
            current_period_end: sub
                .current_period_end
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        },
        None => SubscriberSync {
            provider_customer_id: Some(customer_id.to_string()),
            provider_subscription_id: None,
            plan_tier: PlanTier::Free.as_str().to_string(),
            subscription_status: SubscriptionStatus::None.as_str().to_string(),
            current_period_start: None,
            current_period_end: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::provider::{ProviderPrice, ProviderProduct};
    use serde_json::json;

    #[test]
    fn test_refresh_due_when_never_refreshed() {
        assert!(refresh_due(None, Instant::now()));
    }

    #[test]
    fn test_refresh_throttled_within_interval() {
        let now = Instant::now();
        assert!(!refresh_due(Some(now), now + Duration::from_secs(5)));
    }

    #[test]
    fn test_refresh_due_after_interval() {
        let now = Instant::now();
        assert!(refresh_due(Some(now), now + REFRESH_INTERVAL));
    }

    #[test]
    fn test_build_sync_without_subscription_is_free() {
        let sync = build_sync("cus_1", None);
        assert_eq!(sync.plan_tier, "free");
        assert_eq!(sync.subscription_status, "none");
        assert!(sync.provider_subscription_id.is_none());
    }

    #[test]
    fn test_build_sync_maps_subscription() {
        let sub = ProviderSubscription {
            id: "sub_9".to_string(),
            customer_id: "cus_1".to_string(),
            status: "active".to_string(),
            current_period_start: Some(1_760_000_000),
            current_period_end: Some(1_762_600_000),
            product: ProviderProduct {
                id: "prod_1".to_string(),
                name: "Standard Plan".to_string(),
                metadata: json!({}),
            },
            price: ProviderPrice {
                unit_amount: 2900,
                currency: "usd".to_string(),
            },
        };

        let sync = build_sync("cus_1", Some(&sub));
        assert_eq!(sync.plan_tier, "standard");
        assert_eq!(sync.subscription_status, "active");
        assert_eq!(sync.provider_subscription_id.as_deref(), Some("sub_9"));
        assert!(sync.current_period_start.is_some());
        assert!(sync.current_period_end.is_some());
    }

    #[test]
    fn test_build_sync_unknown_status_maps_to_none() {
        let sub = ProviderSubscription {
            id: "sub_9".to_string(),
            customer_id: "cus_1".to_string(),
            status: "trialing".to_string(),
            current_period_start: None,
            current_period_end: None,
            product: ProviderProduct {
                id: "prod_1".to_string(),
                name: "Premium".to_string(),
                metadata: json!({}),
            },
            price: ProviderPrice {
                unit_amount: 7900,
                currency: "usd".to_string(),
            },
        };

        let sync = build_sync("cus_1", Some(&sub));
        assert_eq!(sync.subscription_status, "none");
    }
}
