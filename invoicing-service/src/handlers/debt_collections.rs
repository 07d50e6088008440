use crate::middleware::TenantContext;
use crate::models::{
    CasePriority, CaseStatus, CreateDebtCase, DebtCase, DebtCaseActivity, Invoice,
    ListDebtCasesFilter, UpdateDebtCase,
};
use crate::services::metrics::DEBT_CASES_TOTAL;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct CreateCaseRequest {
    pub invoice_id: Uuid,
    pub priority: Option<CasePriority>,
    pub next_action_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCaseRequest {
    pub priority: Option<CasePriority>,
    pub status: Option<CaseStatus>,
    pub amount_collected: Option<Decimal>,
    pub next_action_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddActivityRequest {
    #[validate(length(min = 1, max = 50, message = "Activity type must be 1-50 characters"))]
    pub activity_type: String,
    #[validate(length(min = 1, max = 2000, message = "Note must be 1-2000 characters"))]
    pub note: String,
}

#[derive(Debug, Deserialize)]
pub struct ListCasesQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UntrackedQuery {
    #[serde(default = "default_page_size")]
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

fn default_page_size() -> i32 {
    50
}

#[derive(Debug, Serialize)]
pub struct CaseListResponse {
    pub cases: Vec<DebtCase>,
    pub next_page_token: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct UntrackedListResponse {
    pub invoices: Vec<Invoice>,
    pub next_page_token: Option<Uuid>,
}

/// Overdue unpaid invoices with no collection case yet. The work queue for
/// opening new cases.
#[tracing::instrument(skip(state, query), fields(tenant_id))]
pub async fn list_untracked_overdue(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<UntrackedQuery>,
) -> Result<Json<UntrackedListResponse>, AppError> {
    let invoices = state
        .db
        .list_untracked_overdue_invoices(tenant.tenant_id, query.page_size, query.page_token)
        .await?;

    let next_page_token = if invoices.len() as i32 == query.page_size.clamp(1, 100) {
        invoices.last().map(|i| i.invoice_id)
    } else {
        None
    };

    Ok(Json(UntrackedListResponse {
        invoices,
        next_page_token,
    }))
}

#[tracing::instrument(skip(state, request), fields(tenant_id))]
pub async fn create_case(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<CreateCaseRequest>,
) -> Result<(StatusCode, Json<DebtCase>), AppError> {
    let priority = request.priority.unwrap_or(CasePriority::Medium);

    let case = state
        .db
        .create_debt_case(&CreateDebtCase {
            tenant_id: tenant.tenant_id,
            invoice_id: request.invoice_id,
            priority,
            next_action_date: request.next_action_date,
            notes: request.notes,
        })
        .await?;

    DEBT_CASES_TOTAL
        .with_label_values(&[priority.as_str()])
        .inc();

    Ok((StatusCode::CREATED, Json(case)))
}

#[tracing::instrument(skip(state), fields(tenant_id))]
pub async fn get_case(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(case_id): Path<Uuid>,
) -> Result<Json<DebtCase>, AppError> {
    let case = state
        .db
        .get_debt_case(tenant.tenant_id, case_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Case {} not found", case_id)))?;

    Ok(Json(case))
}

#[tracing::instrument(skip(state, query), fields(tenant_id))]
pub async fn list_cases(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ListCasesQuery>,
) -> Result<Json<CaseListResponse>, AppError> {
    let page_size = query.page_size;
    let cases = state
        .db
        .list_debt_cases(
            tenant.tenant_id,
            &ListDebtCasesFilter {
                status: query.status.as_deref().map(CaseStatus::from_string),
                priority: query.priority.as_deref().map(CasePriority::from_string),
                page_size,
                page_token: query.page_token,
            },
        )
        .await?;

    let next_page_token = if cases.len() as i32 == page_size.clamp(1, 100) {
        cases.last().map(|c| c.case_id)
    } else {
        None
    };

    Ok(Json(CaseListResponse {
        cases,
        next_page_token,
    }))
}

#[tracing::instrument(skip(state, request), fields(tenant_id))]
pub async fn update_case(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(case_id): Path<Uuid>,
    Json(request): Json<UpdateCaseRequest>,
) -> Result<Json<DebtCase>, AppError> {
    if let Some(amount) = request.amount_collected {
        if amount < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Amount collected must not be negative"
            )));
        }
    }

    let case = state
        .db
        .update_debt_case(
            tenant.tenant_id,
            case_id,
            &UpdateDebtCase {
                priority: request.priority,
                status: request.status,
                amount_collected: request.amount_collected,
                next_action_date: request.next_action_date,
                notes: request.notes,
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Case {} not found", case_id)))?;

    Ok(Json(case))
}

#[tracing::instrument(skip(state, request), fields(tenant_id))]
pub async fn add_activity(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(case_id): Path<Uuid>,
    Json(request): Json<AddActivityRequest>,
) -> Result<(StatusCode, Json<DebtCaseActivity>), AppError> {
    request.validate()?;

    let activity = state
        .db
        .add_case_activity(
            tenant.tenant_id,
            case_id,
            &request.activity_type,
            &request.note,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(activity)))
}

#[tracing::instrument(skip(state), fields(tenant_id))]
pub async fn list_activities(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(case_id): Path<Uuid>,
) -> Result<Json<Vec<DebtCaseActivity>>, AppError> {
    if state
        .db
        .get_debt_case(tenant.tenant_id, case_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "Case {} not found",
            case_id
        )));
    }

    let activities = state
        .db
        .list_case_activities(tenant.tenant_id, case_id)
        .await?;

    Ok(Json(activities))
}
