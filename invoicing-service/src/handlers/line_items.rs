use crate::middleware::TenantContext;
use crate::models::{CreateLineItem, LineItem, UpdateLineItem};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct AddLineItemRequest {
    #[validate(length(min = 1, max = 500, message = "Description must be 1-500 characters"))]
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLineItemRequest {
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub sort_order: Option<i32>,
}

#[tracing::instrument(skip(state, request), fields(tenant_id))]
pub async fn add_line_item(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<AddLineItemRequest>,
) -> Result<(StatusCode, Json<LineItem>), AppError> {
    request.validate()?;

    if request.quantity <= Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Quantity must be positive"
        )));
    }
    if request.unit_price < Decimal::ZERO || request.tax_rate < Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Unit price and tax rate must not be negative"
        )));
    }

    let item = state
        .db
        .add_line_item(&CreateLineItem {
            tenant_id: tenant.tenant_id,
            invoice_id,
            description: request.description,
            quantity: request.quantity,
            unit_price: request.unit_price,
            tax_rate: request.tax_rate,
            sort_order: request.sort_order,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

#[tracing::instrument(skip(state), fields(tenant_id))]
pub async fn list_line_items(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Vec<LineItem>>, AppError> {
    let items = state
        .db
        .get_line_items(tenant.tenant_id, invoice_id)
        .await?;
    Ok(Json(items))
}

#[tracing::instrument(skip(state, request), fields(tenant_id))]
pub async fn update_line_item(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path((invoice_id, item_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateLineItemRequest>,
) -> Result<Json<LineItem>, AppError> {
    let item = state
        .db
        .update_line_item(
            tenant.tenant_id,
            invoice_id,
            item_id,
            &UpdateLineItem {
                description: request.description,
                quantity: request.quantity,
                unit_price: request.unit_price,
                tax_rate: request.tax_rate,
                sort_order: request.sort_order,
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Line item {} not found", item_id)))?;

    Ok(Json(item))
}

#[tracing::instrument(skip(state), fields(tenant_id))]
pub async fn remove_line_item(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path((invoice_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let removed = state
        .db
        .remove_line_item(tenant.tenant_id, invoice_id, item_id)
        .await?;

    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(anyhow::anyhow!(
            "Line item {} not found",
            item_id
        )))
    }
}
