use crate::middleware::TenantContext;
use crate::models::UsageCounter;
use crate::services::metrics::USAGE_EVENTS_TOTAL;
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct UsageEventRequest {
    #[validate(length(min = 1, max = 50, message = "Resource must be 1-50 characters"))]
    pub resource: String,
    /// +1 on create, -1 on delete.
    pub delta: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetUsageRequest {
    #[validate(length(min = 1, max = 50, message = "Resource must be 1-50 characters"))]
    pub resource: String,
    pub count: i32,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub resource: String,
    pub current_count: i32,
}

/// Record a usage delta reported by a resource-owning service.
#[tracing::instrument(skip(state, request), fields(tenant_id))]
pub async fn record_usage_event(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<UsageEventRequest>,
) -> Result<(StatusCode, Json<UsageResponse>), AppError> {
    request.validate()?;

    if request.delta == 0 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Usage delta must be non-zero"
        )));
    }

    let current_count = state
        .db
        .adjust_usage(tenant.tenant_id, &request.resource, request.delta)
        .await?;

    USAGE_EVENTS_TOTAL
        .with_label_values(&[&request.resource])
        .inc();

    Ok((
        StatusCode::ACCEPTED,
        Json(UsageResponse {
            resource: request.resource,
            current_count,
        }),
    ))
}

/// Overwrite a counter with an absolute count after a reconcile.
#[tracing::instrument(skip(state, request), fields(tenant_id))]
pub async fn set_usage(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<SetUsageRequest>,
) -> Result<Json<UsageResponse>, AppError> {
    request.validate()?;

    let current_count = state
        .db
        .set_usage(tenant.tenant_id, &request.resource, request.count)
        .await?;

    Ok(Json(UsageResponse {
        resource: request.resource,
        current_count,
    }))
}

/// All reported counters for the tenant.
#[tracing::instrument(skip(state), fields(tenant_id))]
pub async fn list_usage(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<Vec<UsageCounter>>, AppError> {
    let counters = state.db.list_usage(tenant.tenant_id).await?;
    Ok(Json(counters))
}
