//! Billing provider REST client.
//!
//! Talks to the hosted subscription provider: fetches a customer's current
//! subscription, opens checkout sessions for upgrades, and verifies webhook
//! signatures. The plan tier is inferred from the subscription's product,
//! since the provider has no native notion of our tiers.

use crate::config::ProviderConfig;
use crate::models::PlanTier;
use crate::services::metrics::PROVIDER_REQUEST_DURATION;
use anyhow::anyhow;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use service_core::utils::signature::verify_body;

/// Price thresholds (in cents) for the tier-by-price fallback.
const BASIC_PRICE_CENTS: i64 = 900;
const STANDARD_PRICE_CENTS: i64 = 2900;
const PREMIUM_PRICE_CENTS: i64 = 7900;

#[derive(Clone)]
pub struct ProviderClient {
    client: Client,
    config: ProviderConfig,
}

/// Subscription as returned by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSubscription {
    pub id: String,
    pub customer_id: String,
    pub status: String,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub product: ProviderProduct,
    pub price: ProviderPrice,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderProduct {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderPrice {
    /// Unit amount in the smallest currency unit.
    pub unit_amount: i64,
    pub currency: String,
}

#[derive(Debug, Serialize)]
struct CreateCheckoutRequest<'a> {
    customer_reference: &'a str,
    plan_tier: &'a str,
    success_url: &'a str,
    cancel_url: &'a str,
}

/// Hosted checkout session for a plan upgrade.
#[derive(Debug, Deserialize, Serialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    code: String,
    message: String,
}

impl ProviderClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Check if provider credentials are set.
    pub fn is_configured(&self) -> bool {
        !self.config.key_id.is_empty() && !self.config.key_secret.expose_secret().is_empty()
    }

    /// Fetch a customer's current subscription. None when the customer has
    /// no active subscription record at the provider.
    pub async fn fetch_subscription(
        &self,
        customer_id: &str,
    ) -> Result<Option<ProviderSubscription>, AppError> {
        if !self.is_configured() {
            return Err(AppError::BadGateway(
                "Billing provider credentials not configured".to_string(),
            ));
        }

        let timer = PROVIDER_REQUEST_DURATION
            .with_label_values(&["fetch_subscription"])
            .start_timer();

        let url = format!(
            "{}/customers/{}/subscription",
            self.config.api_base_url, customer_id
        );

        let response = self
            .client
            .get(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| AppError::BadGateway(format!("Provider request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            timer.observe_duration();
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::BadGateway(format!("Provider response unreadable: {}", e)))?;

        timer.observe_duration();

        tracing::debug!(status = %status, "Provider fetch_subscription response");

        if status.is_success() {
            let subscription: ProviderSubscription = serde_json::from_str(&body).map_err(|e| {
                AppError::BadGateway(format!("Provider response malformed: {}", e))
            })?;
            Ok(Some(subscription))
        } else {
            Err(provider_error("fetch subscription", &body))
        }
    }

    /// Open a hosted checkout session for a plan upgrade.
    pub async fn create_checkout_session(
        &self,
        customer_reference: &str,
        plan_tier: PlanTier,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, AppError> {
        if !self.is_configured() {
            return Err(AppError::BadGateway(
                "Billing provider credentials not configured".to_string(),
            ));
        }

        let timer = PROVIDER_REQUEST_DURATION
            .with_label_values(&["create_checkout_session"])
            .start_timer();

        let url = format!("{}/checkout/sessions", self.config.api_base_url);
        let request = CreateCheckoutRequest {
            customer_reference,
            plan_tier: plan_tier.as_str(),
            success_url,
            cancel_url,
        };

        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::BadGateway(format!("Provider request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::BadGateway(format!("Provider response unreadable: {}", e)))?;

        timer.observe_duration();

        if status.is_success() {
            let session: CheckoutSession = serde_json::from_str(&body).map_err(|e| {
                AppError::BadGateway(format!("Provider response malformed: {}", e))
            })?;
            tracing::info!(session_id = %session.id, "Checkout session created");
            Ok(session)
        } else {
            Err(provider_error("create checkout session", &body))
        }
    }

    /// Verify a webhook's HMAC signature in constant time.
    pub fn verify_webhook_signature(&self, body: &str, signature: &str) -> Result<bool, AppError> {
        verify_body(self.config.webhook_secret.expose_secret(), body, signature)
            .map_err(|e| AppError::InternalError(anyhow!("Signature verification failed: {}", e)))
    }
}

fn provider_error(operation: &str, body: &str) -> AppError {
    let detail = serde_json::from_str::<ProviderErrorBody>(body)
        .map(|e| format!("{} - {}", e.error.code, e.error.message))
        .unwrap_or_else(|_| body.to_string());
    tracing::error!(operation = operation, detail = %detail, "Provider call failed");
    AppError::BadGateway(format!("Provider failed to {}: {}", operation, detail))
}

/// Infer our plan tier from a provider subscription.
///
/// Fallback chain: product metadata `plan_tier`, then a tier name inside the
/// product name, then price thresholds.
pub fn infer_tier(subscription: &ProviderSubscription) -> PlanTier {
    if let Some(tier) = subscription
        .product
        .metadata
        .get("plan_tier")
        .and_then(|v| v.as_str())
    {
        return PlanTier::from_string(tier);
    }

    let name = subscription.product.name.to_lowercase();
    for tier in [
        PlanTier::Premium,
        PlanTier::Standard,
        PlanTier::Basic,
        PlanTier::Free,
    ] {
        if name.contains(tier.as_str()) {
            return tier;
        }
    }

    match subscription.price.unit_amount {
        amount if amount >= PREMIUM_PRICE_CENTS => PlanTier::Premium,
        amount if amount >= STANDARD_PRICE_CENTS => PlanTier::Standard,
        amount if amount >= BASIC_PRICE_CENTS => PlanTier::Basic,
        _ => PlanTier::Free,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;
    use serde_json::json;
    use service_core::utils::signature::sign_body;

    fn test_config() -> ProviderConfig {
        ProviderConfig {
            api_base_url: "https://billing.example.com/v1".to_string(),
            key_id: "bp_test_123".to_string(),
            key_secret: Secret::new("test_secret".to_string()),
            webhook_secret: Secret::new("webhook_secret".to_string()),
        }
    }

    fn subscription(
        metadata: serde_json::Value,
        product_name: &str,
        unit_amount: i64,
    ) -> ProviderSubscription {
        ProviderSubscription {
            id: "sub_1".to_string(),
            customer_id: "cus_1".to_string(),
            status: "active".to_string(),
            current_period_start: Some(1_760_000_000),
            current_period_end: Some(1_762_600_000),
            product: ProviderProduct {
                id: "prod_1".to_string(),
                name: product_name.to_string(),
                metadata,
            },
            price: ProviderPrice {
                unit_amount,
                currency: "usd".to_string(),
            },
        }
    }

    #[test]
    fn test_is_configured() {
        assert!(ProviderClient::new(test_config()).is_configured());

        let empty = ProviderConfig {
            api_base_url: String::new(),
            key_id: String::new(),
            key_secret: Secret::new(String::new()),
            webhook_secret: Secret::new(String::new()),
        };
        assert!(!ProviderClient::new(empty).is_configured());
    }

    #[test]
    fn test_metadata_tier_wins() {
        // Metadata says standard even though name and price say premium.
        let sub = subscription(
            json!({ "plan_tier": "standard" }),
            "Premium Plan",
            PREMIUM_PRICE_CENTS,
        );
        assert_eq!(infer_tier(&sub), PlanTier::Standard);
    }

    #[test]
    fn test_product_name_fallback() {
        let sub = subscription(json!({}), "Acme Basic (monthly)", PREMIUM_PRICE_CENTS);
        assert_eq!(infer_tier(&sub), PlanTier::Basic);
    }

    #[test]
    fn test_price_threshold_fallback() {
        assert_eq!(
            infer_tier(&subscription(json!({}), "Plan A", PREMIUM_PRICE_CENTS)),
            PlanTier::Premium
        );
        assert_eq!(
            infer_tier(&subscription(json!({}), "Plan B", STANDARD_PRICE_CENTS)),
            PlanTier::Standard
        );
        assert_eq!(
            infer_tier(&subscription(json!({}), "Plan C", BASIC_PRICE_CENTS)),
            PlanTier::Basic
        );
        assert_eq!(
            infer_tier(&subscription(json!({}), "Plan D", 0)),
            PlanTier::Free
        );
    }

    #[test]
    fn test_unknown_metadata_tier_gates_at_free() {
        let sub = subscription(json!({ "plan_tier": "enterprise" }), "Plan", 0);
        assert_eq!(infer_tier(&sub), PlanTier::Free);
    }

    #[test]
    fn test_webhook_signature_verification() {
        let client = ProviderClient::new(test_config());
        let body = r#"{"event":"subscription.updated"}"#;
        let signature = sign_body("webhook_secret", body).unwrap();

        assert!(client.verify_webhook_signature(body, &signature).unwrap());
        assert!(!client.verify_webhook_signature(body, "bad_signature").unwrap());
    }
}
