use crate::middleware::TenantContext;
use crate::services::DashboardStats;
use crate::startup::AppState;
use axum::{extract::State, Json};
use service_core::error::AppError;

/// Dashboard aggregates for the tenant.
#[tracing::instrument(skip(state), fields(tenant_id))]
pub async fn dashboard_stats(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<DashboardStats>, AppError> {
    let stats = state.db.get_dashboard_stats(tenant.tenant_id).await?;
    Ok(Json(stats))
}
