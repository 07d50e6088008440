use crate::middleware::TenantContext;
use crate::models::{
    CreateInvoice, CreateLineItem, Invoice, LineItem, ListInvoicesFilter, RecurringFrequency,
    UpdateInvoice,
};
use crate::services::metrics::{INVOICES_TOTAL, PAYMENTS_TOTAL};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct LineItemRequest {
    #[validate(length(min = 1, max = 500, message = "Description must be 1-500 characters"))]
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Fractional tax rate, e.g. 0.20 for 20%.
    #[serde(default)]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub client_id: Uuid,
    #[validate(length(min = 3, max = 3, message = "Currency must be a 3-letter code"))]
    pub currency: String,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
    pub recurring_frequency: Option<RecurringFrequency>,
    pub recurring_end_date: Option<NaiveDate>,
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    #[validate(nested)]
    pub items: Vec<LineItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateInvoiceRequest {
    pub client_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub is_recurring: Option<bool>,
    pub recurring_frequency: Option<RecurringFrequency>,
    pub recurring_end_date: Option<NaiveDate>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub client_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_page_size")]
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

fn default_page_size() -> i32 {
    50
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<LineItem>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceListResponse {
    pub invoices: Vec<Invoice>,
    pub next_page_token: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SendInvoiceRequest {
    /// Deliver the invoice to the client by email as well.
    #[serde(default)]
    pub deliver_email: bool,
}

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
}

#[tracing::instrument(skip(state, request), fields(tenant_id))]
pub async fn create_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    request.validate()?;

    let invoice = state
        .db
        .create_invoice(&CreateInvoice {
            tenant_id: tenant.tenant_id,
            client_id: request.client_id,
            currency: request.currency.to_uppercase(),
            due_date: request.due_date,
            notes: request.notes,
            is_recurring: request.is_recurring,
            recurring_frequency: request.recurring_frequency,
            recurring_end_date: request.recurring_end_date,
            metadata: request.metadata,
        })
        .await?;

    for item in &request.items {
        state
            .db
            .add_line_item(&CreateLineItem {
                tenant_id: tenant.tenant_id,
                invoice_id: invoice.invoice_id,
                description: item.description.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                tax_rate: item.tax_rate,
                sort_order: item.sort_order,
            })
            .await?;
    }

    // Re-read so the response carries the recomputed totals.
    let invoice = state
        .db
        .get_invoice(tenant.tenant_id, invoice.invoice_id)
        .await?
        .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Invoice vanished after create")))?;
    let items = state
        .db
        .get_line_items(tenant.tenant_id, invoice.invoice_id)
        .await?;

    INVOICES_TOTAL.with_label_values(&["draft"]).inc();
    state.usage.spawn_report(tenant.tenant_id, "invoices", 1);

    Ok((StatusCode::CREATED, Json(InvoiceResponse { invoice, items })))
}

#[tracing::instrument(skip(state), fields(tenant_id))]
pub async fn get_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let invoice = state
        .db
        .get_invoice(tenant.tenant_id, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id)))?;
    let items = state
        .db
        .get_line_items(tenant.tenant_id, invoice_id)
        .await?;

    Ok(Json(InvoiceResponse { invoice, items }))
}

#[tracing::instrument(skip(state, query), fields(tenant_id))]
pub async fn list_invoices(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<InvoiceListResponse>, AppError> {
    let page_size = query.page_size;
    let invoices = state
        .db
        .list_invoices(
            tenant.tenant_id,
            &ListInvoicesFilter {
                status: query
                    .status
                    .as_deref()
                    .map(crate::models::InvoiceStatus::from_string),
                payment_status: query
                    .payment_status
                    .as_deref()
                    .map(crate::models::PaymentStatus::from_string),
                client_id: query.client_id,
                start_date: query.start_date,
                end_date: query.end_date,
                page_size,
                page_token: query.page_token,
            },
        )
        .await?;

    let next_page_token = if invoices.len() as i32 == page_size.clamp(1, 100) {
        invoices.last().map(|i| i.invoice_id)
    } else {
        None
    };

    Ok(Json(InvoiceListResponse {
        invoices,
        next_page_token,
    }))
}

#[tracing::instrument(skip(state, request), fields(tenant_id))]
pub async fn update_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<UpdateInvoiceRequest>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state
        .db
        .update_invoice(
            tenant.tenant_id,
            invoice_id,
            &UpdateInvoice {
                client_id: request.client_id,
                due_date: request.due_date,
                notes: request.notes,
                is_recurring: request.is_recurring,
                recurring_frequency: request.recurring_frequency,
                recurring_end_date: request.recurring_end_date,
                metadata: request.metadata,
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id)))?;

    Ok(Json(invoice))
}

#[tracing::instrument(skip(state), fields(tenant_id))]
pub async fn delete_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state.db.delete_invoice(tenant.tenant_id, invoice_id).await?;

    if deleted {
        state.usage.spawn_report(tenant.tenant_id, "invoices", -1);
        Ok(StatusCode::NO_CONTENT)
    } else {
        // Either absent or past draft; distinguish for the caller.
        match state.db.get_invoice(tenant.tenant_id, invoice_id).await? {
            Some(_) => Err(AppError::BadRequest(anyhow::anyhow!(
                "Only draft invoices can be deleted"
            ))),
            None => Err(AppError::NotFound(anyhow::anyhow!(
                "Invoice {} not found",
                invoice_id
            ))),
        }
    }
}

#[tracing::instrument(skip(state, request), fields(tenant_id))]
pub async fn send_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
    request: Option<Json<SendInvoiceRequest>>,
) -> Result<Json<Invoice>, AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let today = Utc::now().date_naive();
    let invoice = state
        .db
        .send_invoice(tenant.tenant_id, invoice_id, today)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id)))?;

    INVOICES_TOTAL.with_label_values(&["sent"]).inc();

    if request.deliver_email {
        let client = state
            .db
            .get_client(tenant.tenant_id, invoice.client_id)
            .await?;
        match client {
            Some(client) => {
                // Delivery failure does not roll the status back.
                if let Err(e) = state.email.send_invoice_email(&invoice, &client).await {
                    tracing::error!(
                        invoice_id = %invoice.invoice_id,
                        error = %e,
                        "Invoice email delivery failed"
                    );
                }
            }
            None => tracing::warn!(
                invoice_id = %invoice.invoice_id,
                "Client record missing, skipping email delivery"
            ),
        }
    }

    Ok(Json(invoice))
}

#[tracing::instrument(skip(state), fields(tenant_id))]
pub async fn mark_invoice_viewed(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state
        .db
        .mark_invoice_viewed(tenant.tenant_id, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id)))?;

    INVOICES_TOTAL.with_label_values(&["viewed"]).inc();

    Ok(Json(invoice))
}

#[tracing::instrument(skip(state, request), fields(tenant_id))]
pub async fn record_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state
        .db
        .record_payment(tenant.tenant_id, invoice_id, request.amount)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id)))?;

    PAYMENTS_TOTAL.with_label_values(&[&invoice.currency]).inc();
    if invoice.status == "paid" {
        INVOICES_TOTAL.with_label_values(&["paid"]).inc();
    }

    Ok(Json(invoice))
}

#[tracing::instrument(skip(state), fields(tenant_id))]
pub async fn sweep_overdue_invoices(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<serde_json::Value>, AppError> {
    let today = Utc::now().date_naive();
    let flipped = state
        .db
        .mark_overdue_invoices(tenant.tenant_id, today)
        .await?;

    INVOICES_TOTAL
        .with_label_values(&["overdue"])
        .inc_by(flipped as f64);

    Ok(Json(json!({ "marked_overdue": flipped })))
}
