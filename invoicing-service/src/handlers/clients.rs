use crate::middleware::TenantContext;
use crate::models::{Client, CreateClient, ListClientsFilter, UpdateClient};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateClientRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub tax_number: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateClientRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub tax_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListClientsQuery {
    pub search: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

fn default_page_size() -> i32 {
    50
}

#[derive(Debug, Serialize)]
pub struct ClientListResponse {
    pub clients: Vec<Client>,
    pub next_page_token: Option<Uuid>,
}

#[tracing::instrument(skip(state, request), fields(tenant_id))]
pub async fn create_client(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<Client>), AppError> {
    request.validate()?;

    let client = state
        .db
        .create_client(&CreateClient {
            tenant_id: tenant.tenant_id,
            name: request.name,
            email: request.email,
            phone: request.phone,
            address_line1: request.address_line1,
            address_line2: request.address_line2,
            city: request.city,
            state: request.state,
            postal_code: request.postal_code,
            country: request.country,
            tax_number: request.tax_number,
        })
        .await?;

    state.usage.spawn_report(tenant.tenant_id, "clients", 1);

    Ok((StatusCode::CREATED, Json(client)))
}

#[tracing::instrument(skip(state), fields(tenant_id))]
pub async fn get_client(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<Client>, AppError> {
    let client = state
        .db
        .get_client(tenant.tenant_id, client_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client {} not found", client_id)))?;

    Ok(Json(client))
}

#[tracing::instrument(skip(state, query), fields(tenant_id))]
pub async fn list_clients(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ListClientsQuery>,
) -> Result<Json<ClientListResponse>, AppError> {
    let page_size = query.page_size;
    let clients = state
        .db
        .list_clients(
            tenant.tenant_id,
            &ListClientsFilter {
                search: query.search,
                page_size,
                page_token: query.page_token,
            },
        )
        .await?;

    let next_page_token = if clients.len() as i32 == page_size.clamp(1, 100) {
        clients.last().map(|c| c.client_id)
    } else {
        None
    };

    Ok(Json(ClientListResponse {
        clients,
        next_page_token,
    }))
}

#[tracing::instrument(skip(state, request), fields(tenant_id))]
pub async fn update_client(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(client_id): Path<Uuid>,
    Json(request): Json<UpdateClientRequest>,
) -> Result<Json<Client>, AppError> {
    request.validate()?;

    let client = state
        .db
        .update_client(
            tenant.tenant_id,
            client_id,
            &UpdateClient {
                name: request.name,
                email: request.email,
                phone: request.phone,
                address_line1: request.address_line1,
                address_line2: request.address_line2,
                city: request.city,
                state: request.state,
                postal_code: request.postal_code,
                country: request.country,
                tax_number: request.tax_number,
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client {} not found", client_id)))?;

    Ok(Json(client))
}
