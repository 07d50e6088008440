use crate::middleware::TenantContext;
use crate::models::Subscriber;
use crate::startup::AppState;
use axum::{extract::State, Json};
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct LinkCustomerRequest {
    #[validate(length(min = 1, max = 100, message = "Customer ID must be 1-100 characters"))]
    pub provider_customer_id: String,
}

/// Stored subscription state for the tenant; free tier when never synced.
#[tracing::instrument(skip(state), fields(tenant_id))]
pub async fn get_subscription(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<Subscriber>, AppError> {
    let subscriber = state
        .db
        .get_subscriber(tenant.tenant_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "No subscription record for tenant {}",
                tenant.tenant_id
            ))
        })?;

    Ok(Json(subscriber))
}

/// Attach a provider customer to the tenant, then sync immediately.
#[tracing::instrument(skip(state, request), fields(tenant_id))]
pub async fn link_customer(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<LinkCustomerRequest>,
) -> Result<Json<Subscriber>, AppError> {
    request.validate()?;

    state
        .db
        .link_customer(tenant.tenant_id, &request.provider_customer_id)
        .await?;

    let subscriber = state
        .entitlements
        .refresh_subscription(tenant.tenant_id, true)
        .await?
        .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Subscriber vanished after link")))?;

    Ok(Json(subscriber))
}

/// Force a provider sync, bypassing the refresh throttle.
#[tracing::instrument(skip(state), fields(tenant_id))]
pub async fn refresh_subscription(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<Subscriber>, AppError> {
    let subscriber = state
        .entitlements
        .refresh_subscription(tenant.tenant_id, true)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "No subscription record for tenant {}",
                tenant.tenant_id
            ))
        })?;

    Ok(Json(subscriber))
}
