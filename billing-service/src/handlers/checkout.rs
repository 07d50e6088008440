use crate::middleware::TenantContext;
use crate::models::PlanTier;
use crate::services::provider::CheckoutSession;
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCheckoutRequest {
    pub plan_tier: PlanTier,
    #[validate(url(message = "success_url must be a valid URL"))]
    pub success_url: String,
    #[validate(url(message = "cancel_url must be a valid URL"))]
    pub cancel_url: String,
}

/// Open a hosted checkout session for a plan upgrade.
#[tracing::instrument(skip(state, request), fields(tenant_id))]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutSession>), AppError> {
    request.validate()?;

    if request.plan_tier == PlanTier::Free {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Free tier does not require checkout"
        )));
    }

    // Prefer the provider's customer ID when already linked.
    let customer_reference = state
        .db
        .get_subscriber(tenant.tenant_id)
        .await?
        .and_then(|s| s.provider_customer_id)
        .unwrap_or_else(|| tenant.tenant_id.to_string());

    let session = state
        .provider
        .create_checkout_session(
            &customer_reference,
            request.plan_tier,
            &request.success_url,
            &request.cancel_url,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(session)))
}
