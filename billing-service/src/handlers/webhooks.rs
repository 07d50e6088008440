//! Inbound provider webhooks.
//!
//! The provider signs each payload with hex(HMAC-SHA256(body)) in the
//! X-Provider-Signature header. Verification runs on the raw body before any
//! parsing.

use crate::services::metrics::WEBHOOK_EVENTS_TOTAL;
use crate::services::provider::ProviderSubscription;
use crate::startup::AppState;
use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::json;
use service_core::error::AppError;

#[derive(Debug, Deserialize)]
pub struct ProviderWebhookEvent {
    pub event: String,
    pub customer_id: String,
    pub subscription: Option<ProviderSubscription>,
}

#[tracing::instrument(skip(state, headers, body))]
pub async fn provider_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let signature = headers
        .get("X-Provider-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing X-Provider-Signature header"))
        })?;

    if !state.provider.verify_webhook_signature(&body, signature)? {
        WEBHOOK_EVENTS_TOTAL
            .with_label_values(&["unknown", "bad_signature"])
            .inc();
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Webhook signature verification failed"
        )));
    }

    let event: ProviderWebhookEvent = serde_json::from_str(&body).map_err(|e| {
        AppError::BadRequest(anyhow::anyhow!("Malformed webhook payload: {}", e))
    })?;

    tracing::info!(event = %event.event, customer_id = %event.customer_id, "Provider webhook received");

    let subscriber = state
        .db
        .get_subscriber_by_customer(&event.customer_id)
        .await?;

    let Some(subscriber) = subscriber else {
        // Customer not linked to any tenant yet; acknowledge so the provider
        // stops retrying.
        WEBHOOK_EVENTS_TOTAL
            .with_label_values(&[event.event.as_str(), "unlinked"])
            .inc();
        tracing::warn!(customer_id = %event.customer_id, "Webhook for unlinked customer");
        return Ok((StatusCode::OK, Json(json!({ "status": "ignored" }))));
    };

    match event.event.as_str() {
        "subscription.created" | "subscription.updated" => {
            state
                .entitlements
                .apply_provider_subscription(
                    subscriber.tenant_id,
                    &event.customer_id,
                    event.subscription.as_ref(),
                )
                .await?;
        }
        "subscription.deleted" | "subscription.canceled" => {
            state
                .entitlements
                .apply_provider_subscription(subscriber.tenant_id, &event.customer_id, None)
                .await?;
        }
        other => {
            WEBHOOK_EVENTS_TOTAL
                .with_label_values(&[other, "unhandled"])
                .inc();
            tracing::debug!(event = other, "Unhandled webhook event type");
            return Ok((StatusCode::OK, Json(json!({ "status": "ignored" }))));
        }
    }

    WEBHOOK_EVENTS_TOTAL
        .with_label_values(&[event.event.as_str(), "processed"])
        .inc();

    Ok((StatusCode::OK, Json(json!({ "status": "processed" }))))
}
