use crate::middleware::TenantContext;
use crate::models::{Entitlement, PlanTier, Subscriber};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use service_core::error::AppError;

#[derive(Debug, Serialize)]
pub struct EntitlementSummary {
    pub plan_tier: String,
    pub entitlements: Vec<Entitlement>,
}

/// Gate decision for one resource: may the tenant create one more?
#[tracing::instrument(skip(state), fields(tenant_id))]
pub async fn can_create(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(resource): Path<String>,
) -> Result<Json<Entitlement>, AppError> {
    let entitlement = state
        .entitlements
        .can_create(tenant.tenant_id, &resource)
        .await?;

    Ok(Json(entitlement))
}

/// All limits and current usage for the tenant's effective tier.
#[tracing::instrument(skip(state), fields(tenant_id))]
pub async fn list_entitlements(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<EntitlementSummary>, AppError> {
    let subscriber = state
        .entitlements
        .refresh_subscription(tenant.tenant_id, false)
        .await?;

    let tier = subscriber
        .as_ref()
        .map(Subscriber::effective_tier)
        .unwrap_or(PlanTier::Free);

    let limits = state.db.list_plan_limits(tier.as_str()).await?;

    let mut entitlements = Vec::with_capacity(limits.len());
    for limit in &limits {
        let current = state.db.get_usage(tenant.tenant_id, &limit.resource).await?;
        entitlements.push(Entitlement::evaluate(
            &limit.resource,
            tier.as_str(),
            limit.max_count,
            current,
        ));
    }

    Ok(Json(EntitlementSummary {
        plan_tier: tier.as_str().to_string(),
        entitlements,
    }))
}
