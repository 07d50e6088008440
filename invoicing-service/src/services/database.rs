//! Database service for invoicing-service.

use crate::models::{
    apply_payment, Client, CreateClient, CreateDebtCase, CreateInvoice, CreateLineItem, DebtCase,
    DebtCaseActivity, GenerationOutcome, GenerationRun, GenerationRunResult, GenerationRunStatus,
    GenerationTrigger, Invoice, LineItem, ListClientsFilter, ListDebtCasesFilter,
    ListInvoicesFilter, PaymentDecision, PaymentStatus, UpdateClient, UpdateDebtCase,
    UpdateInvoice, UpdateLineItem,
};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const INVOICE_COLUMNS: &str = "invoice_id, tenant_id, client_id, invoice_number, status, payment_status, currency, \
     issue_date, due_date, subtotal, tax_total, total, amount_paid, amount_due, notes, \
     is_recurring, recurring_frequency, recurring_end_date, source_invoice_id, metadata, \
     created_utc, sent_utc, updated_utc";

const CLIENT_COLUMNS: &str = "client_id, tenant_id, name, email, phone, address_line1, address_line2, city, state, \
     postal_code, country, tax_number, created_utc, updated_utc";

const LINE_ITEM_COLUMNS: &str = "item_id, invoice_id, tenant_id, description, quantity, unit_price, tax_rate, \
     tax_amount, subtotal, total, sort_order, created_utc";

const DEBT_CASE_COLUMNS: &str = "case_id, tenant_id, invoice_id, priority, status, amount_collected, next_action_date, \
     notes, created_utc, updated_utc";

const GENERATION_RUN_COLUMNS: &str = "run_id, run_type, status, started_utc, completed_utc, invoices_processed, \
     invoices_succeeded, invoices_failed, error_message";

/// Aggregated dashboard figures, computed in SQL.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DashboardStats {
    pub total_invoiced: Decimal,
    pub total_collected: Decimal,
    pub total_outstanding: Decimal,
    pub draft_count: i64,
    pub sent_count: i64,
    pub viewed_count: i64,
    pub overdue_count: i64,
    pub paid_count: i64,
    pub recurring_count: i64,
    pub open_cases: i64,
    pub amount_in_collection: Decimal,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "invoicing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Client Operations
    // -------------------------------------------------------------------------

    /// Create a new client.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id))]
    pub async fn create_client(&self, input: &CreateClient) -> Result<Client, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_client"])
            .start_timer();

        let client_id = Uuid::new_v4();
        let sql = format!(
            "INSERT INTO clients (client_id, tenant_id, name, email, phone, address_line1, address_line2, city, state, postal_code, country, tax_number) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {CLIENT_COLUMNS}"
        );
        let client = sqlx::query_as::<_, Client>(&sql)
            .bind(client_id)
            .bind(input.tenant_id)
            .bind(&input.name)
            .bind(&input.email)
            .bind(&input.phone)
            .bind(&input.address_line1)
            .bind(&input.address_line2)
            .bind(&input.city)
            .bind(&input.state)
            .bind(&input.postal_code)
            .bind(&input.country)
            .bind(&input.tax_number)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create client: {}", e)))?;

        timer.observe_duration();

        info!(client_id = %client.client_id, "Client created");

        Ok(client)
    }

    /// Get a client by ID.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, client_id = %client_id))]
    pub async fn get_client(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_client"])
            .start_timer();

        let sql = format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE tenant_id = $1 AND client_id = $2");
        let client = sqlx::query_as::<_, Client>(&sql)
            .bind(tenant_id)
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get client: {}", e)))?;

        timer.observe_duration();

        Ok(client)
    }

    /// List clients for a tenant.
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id))]
    pub async fn list_clients(
        &self,
        tenant_id: Uuid,
        filter: &ListClientsFilter,
    ) -> Result<Vec<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_clients"])
            .start_timer();

        let limit = filter.page_size.clamp(1, 100) as i64;
        let search = filter.search.as_ref().map(|s| format!("%{}%", s));

        let sql = format!(
            "SELECT {CLIENT_COLUMNS} FROM clients \
             WHERE tenant_id = $1 \
               AND ($2::varchar IS NULL OR name ILIKE $2 OR email ILIKE $2) \
               AND ($3::uuid IS NULL OR client_id > $3) \
             ORDER BY client_id \
             LIMIT $4"
        );
        let clients = sqlx::query_as::<_, Client>(&sql)
            .bind(tenant_id)
            .bind(&search)
            .bind(filter.page_token)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list clients: {}", e)))?;

        timer.observe_duration();

        Ok(clients)
    }

    /// Update a client.
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, client_id = %client_id))]
    pub async fn update_client(
        &self,
        tenant_id: Uuid,
        client_id: Uuid,
        input: &UpdateClient,
    ) -> Result<Option<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_client"])
            .start_timer();

        let sql = format!(
            "UPDATE clients \
             SET name = COALESCE($3, name), \
                 email = COALESCE($4, email), \
                 phone = COALESCE($5, phone), \
                 address_line1 = COALESCE($6, address_line1), \
                 address_line2 = COALESCE($7, address_line2), \
                 city = COALESCE($8, city), \
                 state = COALESCE($9, state), \
                 postal_code = COALESCE($10, postal_code), \
                 country = COALESCE($11, country), \
                 tax_number = COALESCE($12, tax_number), \
                 updated_utc = NOW() \
             WHERE tenant_id = $1 AND client_id = $2 \
             RETURNING {CLIENT_COLUMNS}"
        );
        let client = sqlx::query_as::<_, Client>(&sql)
            .bind(tenant_id)
            .bind(client_id)
            .bind(&input.name)
            .bind(&input.email)
            .bind(&input.phone)
            .bind(&input.address_line1)
            .bind(&input.address_line2)
            .bind(&input.city)
            .bind(&input.state)
            .bind(&input.postal_code)
            .bind(&input.country)
            .bind(&input.tax_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update client: {}", e)))?;

        timer.observe_duration();

        Ok(client)
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    /// Create a new draft invoice with the next sequential number.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id))]
    pub async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        // A recurring invoice must carry a frequency.
        if input.is_recurring && input.recurring_frequency.is_none() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Recurring invoices require a recurring_frequency"
            )));
        }

        let invoice_id = Uuid::new_v4();
        let sql = format!(
            "INSERT INTO invoices (invoice_id, tenant_id, client_id, invoice_number, currency, due_date, notes, is_recurring, recurring_frequency, recurring_end_date, metadata) \
             VALUES ($1, $2, $3, next_invoice_number($2), $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {INVOICE_COLUMNS}"
        );
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(invoice_id)
            .bind(input.tenant_id)
            .bind(input.client_id)
            .bind(&input.currency)
            .bind(input.due_date)
            .bind(&input.notes)
            .bind(input.is_recurring)
            .bind(input.recurring_frequency.map(|f| f.as_str()))
            .bind(input.recurring_end_date)
            .bind(&input.metadata)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e)))?;

        timer.observe_duration();

        info!(invoice_id = %invoice.invoice_id, invoice_number = %invoice.invoice_number, "Draft invoice created");

        Ok(invoice)
    }

    /// Get an invoice by ID.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn get_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE tenant_id = $1 AND invoice_id = $2");
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(tenant_id)
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    /// List invoices for a tenant.
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id))]
    pub async fn list_invoices(
        &self,
        tenant_id: Uuid,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let limit = filter.page_size.clamp(1, 100) as i64;
        let status = filter.status.map(|s| s.as_str().to_string());
        let payment_status = filter.payment_status.map(|s| s.as_str().to_string());

        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices \
             WHERE tenant_id = $1 \
               AND ($2::varchar IS NULL OR status = $2) \
               AND ($3::varchar IS NULL OR payment_status = $3) \
               AND ($4::uuid IS NULL OR client_id = $4) \
               AND ($5::date IS NULL OR due_date >= $5) \
               AND ($6::date IS NULL OR due_date <= $6) \
               AND ($7::uuid IS NULL OR invoice_id > $7) \
             ORDER BY invoice_id \
             LIMIT $8"
        );
        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .bind(tenant_id)
            .bind(&status)
            .bind(&payment_status)
            .bind(filter.client_id)
            .bind(filter.start_date)
            .bind(filter.end_date)
            .bind(filter.page_token)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();

        Ok(invoices)
    }

    /// Update a draft invoice.
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn update_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        input: &UpdateInvoice,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice"])
            .start_timer();

        let existing = self.get_invoice(tenant_id, invoice_id).await?;
        match existing {
            Some(inv) if inv.status == "draft" => {}
            Some(_) => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Only draft invoices can be updated"
                )))
            }
            None => return Ok(None),
        };

        let sql = format!(
            "UPDATE invoices \
             SET client_id = COALESCE($3, client_id), \
                 due_date = COALESCE($4, due_date), \
                 notes = COALESCE($5, notes), \
                 is_recurring = COALESCE($6, is_recurring), \
                 recurring_frequency = COALESCE($7, recurring_frequency), \
                 recurring_end_date = COALESCE($8, recurring_end_date), \
                 metadata = COALESCE($9, metadata), \
                 updated_utc = NOW() \
             WHERE tenant_id = $1 AND invoice_id = $2 AND status = 'draft' \
             RETURNING {INVOICE_COLUMNS}"
        );
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(tenant_id)
            .bind(invoice_id)
            .bind(input.client_id)
            .bind(input.due_date)
            .bind(&input.notes)
            .bind(input.is_recurring)
            .bind(input.recurring_frequency.map(|f| f.as_str()))
            .bind(input.recurring_end_date)
            .bind(&input.metadata)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice: {}", e)))?;

        timer.observe_duration();

        if let Some(ref inv) = invoice {
            info!(invoice_id = %inv.invoice_id, "Invoice updated");
        }

        Ok(invoice)
    }

    /// Delete a draft invoice. Invoices past draft are never hard-deleted.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn delete_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_invoice"])
            .start_timer();

        let result = sqlx::query(
            "DELETE FROM invoices WHERE tenant_id = $1 AND invoice_id = $2 AND status = 'draft'",
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete invoice: {}", e)))?;

        timer.observe_duration();

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(invoice_id = %invoice_id, "Draft invoice deleted");
        }

        Ok(deleted)
    }

    /// Send an invoice: draft -> sent, stamping the issue date.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn send_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        issue_date: NaiveDate,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["send_invoice"])
            .start_timer();

        let existing = self.get_invoice(tenant_id, invoice_id).await?;
        match existing {
            Some(inv) if inv.status == "draft" => {}
            Some(_) => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Only draft invoices can be sent"
                )))
            }
            None => return Ok(None),
        };

        let items = self.get_line_items(tenant_id, invoice_id).await?;
        if items.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Cannot send an invoice without line items"
            )));
        }

        let sql = format!(
            "UPDATE invoices \
             SET status = 'sent', \
                 issue_date = COALESCE(issue_date, $3), \
                 sent_utc = NOW(), \
                 amount_due = total - amount_paid, \
                 updated_utc = NOW() \
             WHERE tenant_id = $1 AND invoice_id = $2 AND status = 'draft' \
             RETURNING {INVOICE_COLUMNS}"
        );
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(tenant_id)
            .bind(invoice_id)
            .bind(issue_date)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to send invoice: {}", e)))?;

        timer.observe_duration();

        if let Some(ref inv) = invoice {
            info!(invoice_id = %inv.invoice_id, invoice_number = %inv.invoice_number, "Invoice sent");
        }

        Ok(invoice)
    }

    /// Mark a sent invoice as viewed by the client.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn mark_invoice_viewed(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_invoice_viewed"])
            .start_timer();

        let existing = self.get_invoice(tenant_id, invoice_id).await?;
        match existing {
            Some(inv) if inv.status == "sent" => {}
            Some(_) => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Only sent invoices can be marked viewed"
                )))
            }
            None => return Ok(None),
        };

        let sql = format!(
            "UPDATE invoices SET status = 'viewed', updated_utc = NOW() \
             WHERE tenant_id = $1 AND invoice_id = $2 AND status = 'sent' \
             RETURNING {INVOICE_COLUMNS}"
        );
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(tenant_id)
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to mark invoice viewed: {}", e))
            })?;

        timer.observe_duration();

        Ok(invoice)
    }

    /// Record a payment against an invoice.
    ///
    /// Accumulates `amount_paid`; payment_status moves unpaid -> partial ->
    /// paid, and a fully paid invoice flips status to 'paid'.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn record_payment(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        amount: Decimal,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_payment"])
            .start_timer();

        if amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount must be positive"
            )));
        }

        let invoice = match self.get_invoice(tenant_id, invoice_id).await? {
            Some(inv) => inv,
            None => return Ok(None),
        };

        let decision = apply_payment(
            &invoice.status,
            invoice.total,
            invoice.amount_paid,
            invoice.amount_due,
            amount,
        );
        let (new_paid, payment_status) = match decision {
            PaymentDecision::Applied {
                new_amount_paid,
                payment_status,
            } => (new_amount_paid, payment_status),
            PaymentDecision::NonPositiveAmount => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Payment amount must be positive"
                )))
            }
            PaymentDecision::NotPayable => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Payments can only be recorded against sent, viewed or overdue invoices"
                )))
            }
            PaymentDecision::Overpayment { amount_due } => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Payment amount {} exceeds amount due {}",
                    amount,
                    amount_due
                )))
            }
        };
        let fully_paid = payment_status == PaymentStatus::Paid;

        let sql = format!(
            "UPDATE invoices \
             SET amount_paid = $3, \
                 amount_due = total - $3, \
                 payment_status = $4, \
                 status = CASE WHEN $5 THEN 'paid' ELSE status END, \
                 updated_utc = NOW() \
             WHERE tenant_id = $1 AND invoice_id = $2 \
             RETURNING {INVOICE_COLUMNS}"
        );
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(tenant_id)
            .bind(invoice_id)
            .bind(new_paid)
            .bind(payment_status.as_str())
            .bind(fully_paid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record payment: {}", e)))?;

        timer.observe_duration();

        if let Some(ref inv) = invoice {
            info!(
                invoice_id = %inv.invoice_id,
                amount = %amount,
                payment_status = %inv.payment_status,
                "Payment recorded"
            );
        }

        Ok(invoice)
    }

    /// Sweep sent/viewed invoices past their due date into 'overdue'.
    /// Returns the number of invoices flipped.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn mark_overdue_invoices(
        &self,
        tenant_id: Uuid,
        today: NaiveDate,
    ) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_overdue_invoices"])
            .start_timer();

        let result = sqlx::query(
            "UPDATE invoices SET status = 'overdue', updated_utc = NOW() \
             WHERE tenant_id = $1 AND status IN ('sent', 'viewed') AND due_date < $2",
        )
        .bind(tenant_id)
        .bind(today)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to mark invoices overdue: {}", e))
        })?;

        timer.observe_duration();

        let flipped = result.rows_affected();
        if flipped > 0 {
            info!(count = flipped, "Invoices marked overdue");
        }

        Ok(flipped)
    }

    // -------------------------------------------------------------------------
    // Line Item Operations
    // -------------------------------------------------------------------------

    /// Add a line item to a draft invoice and refresh the invoice totals.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, invoice_id = %input.invoice_id))]
    pub async fn add_line_item(&self, input: &CreateLineItem) -> Result<LineItem, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_line_item"])
            .start_timer();

        let invoice = self.get_invoice(input.tenant_id, input.invoice_id).await?;
        match invoice {
            Some(inv) if inv.status == "draft" => {}
            Some(_) => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Can only add line items to draft invoices"
                )))
            }
            None => return Err(AppError::NotFound(anyhow::anyhow!("Invoice not found"))),
        };

        let (subtotal, tax_amount, total) = input.amounts();

        let item_id = Uuid::new_v4();
        let sql = format!(
            "INSERT INTO invoice_items (item_id, invoice_id, tenant_id, description, quantity, unit_price, tax_rate, tax_amount, subtotal, total, sort_order) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {LINE_ITEM_COLUMNS}"
        );
        let line_item = sqlx::query_as::<_, LineItem>(&sql)
            .bind(item_id)
            .bind(input.invoice_id)
            .bind(input.tenant_id)
            .bind(&input.description)
            .bind(input.quantity)
            .bind(input.unit_price)
            .bind(input.tax_rate)
            .bind(tax_amount)
            .bind(subtotal)
            .bind(total)
            .bind(input.sort_order)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to add line item: {}", e)))?;

        self.recompute_invoice_totals(input.tenant_id, input.invoice_id)
            .await?;

        timer.observe_duration();

        info!(item_id = %line_item.item_id, "Line item added");

        Ok(line_item)
    }

    /// Get line items for an invoice.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn get_line_items(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<LineItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_line_items"])
            .start_timer();

        let sql = format!(
            "SELECT {LINE_ITEM_COLUMNS} FROM invoice_items \
             WHERE tenant_id = $1 AND invoice_id = $2 \
             ORDER BY sort_order, created_utc"
        );
        let items = sqlx::query_as::<_, LineItem>(&sql)
            .bind(tenant_id)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get line items: {}", e)))?;

        timer.observe_duration();

        Ok(items)
    }

    /// Update a line item on a draft invoice and refresh the invoice totals.
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, item_id = %item_id))]
    pub async fn update_line_item(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        item_id: Uuid,
        input: &UpdateLineItem,
    ) -> Result<Option<LineItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_line_item"])
            .start_timer();

        let invoice = self.get_invoice(tenant_id, invoice_id).await?;
        match invoice {
            Some(inv) if inv.status == "draft" => {}
            Some(_) => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Can only update line items on draft invoices"
                )))
            }
            None => return Ok(None),
        };

        // COALESCE against the stored row, then recompute derived amounts.
        let sql = format!(
            "UPDATE invoice_items \
             SET description = COALESCE($4, description), \
                 quantity = COALESCE($5, quantity), \
                 unit_price = COALESCE($6, unit_price), \
                 tax_rate = COALESCE($7, tax_rate), \
                 sort_order = COALESCE($8, sort_order), \
                 subtotal = COALESCE($5, quantity) * COALESCE($6, unit_price), \
                 tax_amount = COALESCE($5, quantity) * COALESCE($6, unit_price) * COALESCE($7, tax_rate), \
                 total = COALESCE($5, quantity) * COALESCE($6, unit_price) * (1 + COALESCE($7, tax_rate)) \
             WHERE tenant_id = $1 AND invoice_id = $2 AND item_id = $3 \
             RETURNING {LINE_ITEM_COLUMNS}"
        );
        let item = sqlx::query_as::<_, LineItem>(&sql)
            .bind(tenant_id)
            .bind(invoice_id)
            .bind(item_id)
            .bind(&input.description)
            .bind(input.quantity)
            .bind(input.unit_price)
            .bind(input.tax_rate)
            .bind(input.sort_order)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update line item: {}", e))
            })?;

        if item.is_some() {
            self.recompute_invoice_totals(tenant_id, invoice_id).await?;
        }

        timer.observe_duration();

        Ok(item)
    }

    /// Remove a line item from a draft invoice and refresh the invoice totals.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, item_id = %item_id))]
    pub async fn remove_line_item(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        item_id: Uuid,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["remove_line_item"])
            .start_timer();

        let invoice = self.get_invoice(tenant_id, invoice_id).await?;
        match invoice {
            Some(inv) if inv.status == "draft" => {}
            Some(_) => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Can only remove line items from draft invoices"
                )))
            }
            None => return Ok(false),
        };

        let result = sqlx::query(
            "DELETE FROM invoice_items WHERE tenant_id = $1 AND invoice_id = $2 AND item_id = $3",
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .bind(item_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to remove line item: {}", e)))?;

        let removed = result.rows_affected() > 0;
        if removed {
            self.recompute_invoice_totals(tenant_id, invoice_id).await?;
        }

        timer.observe_duration();

        Ok(removed)
    }

    /// Refresh invoice totals from its line items.
    async fn recompute_invoice_totals(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE invoices i \
             SET subtotal = agg.subtotal, \
                 tax_total = agg.tax_total, \
                 total = agg.total, \
                 amount_due = agg.total - i.amount_paid, \
                 updated_utc = NOW() \
             FROM ( \
                 SELECT COALESCE(SUM(subtotal), 0) AS subtotal, \
                        COALESCE(SUM(tax_amount), 0) AS tax_total, \
                        COALESCE(SUM(total), 0) AS total \
                 FROM invoice_items \
                 WHERE tenant_id = $1 AND invoice_id = $2 \
             ) agg \
             WHERE i.tenant_id = $1 AND i.invoice_id = $2",
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to recompute invoice totals: {}", e))
        })?;

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Recurring Generation Support
    // -------------------------------------------------------------------------

    /// Find recurring invoices due for generation: flagged, due and sent.
    #[instrument(skip(self))]
    pub async fn find_due_recurring_invoices(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_due_recurring_invoices"])
            .start_timer();

        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices \
             WHERE is_recurring = TRUE AND status = 'sent' AND due_date <= $1 \
             ORDER BY due_date, invoice_id"
        );
        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .bind(today)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to find due recurring invoices: {}",
                    e
                ))
            })?;

        timer.observe_duration();

        Ok(invoices)
    }

    /// Clone an invoice as a fresh draft with the next sequential number.
    ///
    /// The clone does not itself recur; recurrence stays on the source.
    #[instrument(skip(self, source), fields(source_invoice_id = %source.invoice_id))]
    pub async fn clone_invoice(
        &self,
        source: &Invoice,
        issue_date: NaiveDate,
        due_date: NaiveDate,
    ) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["clone_invoice"])
            .start_timer();

        let invoice_id = Uuid::new_v4();
        let sql = format!(
            "INSERT INTO invoices (invoice_id, tenant_id, client_id, invoice_number, status, payment_status, currency, issue_date, due_date, subtotal, tax_total, total, amount_paid, amount_due, notes, source_invoice_id, metadata) \
             VALUES ($1, $2, $3, next_invoice_number($2), 'draft', 'unpaid', $4, $5, $6, $7, $8, $9, 0, $9, $10, $11, $12) \
             RETURNING {INVOICE_COLUMNS}"
        );
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(invoice_id)
            .bind(source.tenant_id)
            .bind(source.client_id)
            .bind(&source.currency)
            .bind(issue_date)
            .bind(due_date)
            .bind(source.subtotal)
            .bind(source.tax_total)
            .bind(source.total)
            .bind(&source.notes)
            .bind(source.invoice_id)
            .bind(&source.metadata)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to clone invoice: {}", e)))?;

        timer.observe_duration();

        info!(
            source_invoice_id = %source.invoice_id,
            new_invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number,
            "Invoice cloned"
        );

        Ok(invoice)
    }

    /// Copy all line items from one invoice to another.
    #[instrument(skip(self), fields(source_invoice_id = %source_invoice_id, new_invoice_id = %new_invoice_id))]
    pub async fn copy_line_items(
        &self,
        tenant_id: Uuid,
        source_invoice_id: Uuid,
        new_invoice_id: Uuid,
    ) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["copy_line_items"])
            .start_timer();

        let items = self.get_line_items(tenant_id, source_invoice_id).await?;
        let mut copied = 0u64;

        let sql = format!(
            "INSERT INTO invoice_items (item_id, invoice_id, tenant_id, description, quantity, unit_price, tax_rate, tax_amount, subtotal, total, sort_order) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {LINE_ITEM_COLUMNS}"
        );
        for item in &items {
            sqlx::query_as::<_, LineItem>(&sql)
                .bind(Uuid::new_v4())
                .bind(new_invoice_id)
                .bind(tenant_id)
                .bind(&item.description)
                .bind(item.quantity)
                .bind(item.unit_price)
                .bind(item.tax_rate)
                .bind(item.tax_amount)
                .bind(item.subtotal)
                .bind(item.total)
                .bind(item.sort_order)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to copy line item: {}", e))
                })?;
            copied += 1;
        }

        timer.observe_duration();

        Ok(copied)
    }

    /// Delete an invoice regardless of status.
    ///
    /// Compensating action for a failed clone only; lifecycle rules live in
    /// `delete_invoice`.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn delete_invoice_unchecked(&self, invoice_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM invoices WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to delete partially created invoice: {}",
                    e
                ))
            })?;
        Ok(())
    }

    /// Advance a recurring invoice's due date, optionally clearing the flag
    /// when the recurrence window is exhausted.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn advance_recurrence(
        &self,
        invoice_id: Uuid,
        next_due_date: NaiveDate,
        stop_recurring: bool,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["advance_recurrence"])
            .start_timer();

        sqlx::query(
            "UPDATE invoices \
             SET due_date = $2, \
                 is_recurring = CASE WHEN $3 THEN FALSE ELSE is_recurring END, \
                 updated_utc = NOW() \
             WHERE invoice_id = $1",
        )
        .bind(invoice_id)
        .bind(next_due_date)
        .bind(stop_recurring)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to advance recurrence: {}", e))
        })?;

        timer.observe_duration();

        Ok(())
    }

    /// Clear the recurrence flag without touching the due date.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn stop_recurrence(&self, invoice_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE invoices SET is_recurring = FALSE, updated_utc = NOW() WHERE invoice_id = $1",
        )
        .bind(invoice_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to stop recurrence: {}", e)))?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Debt Collection Operations
    // -------------------------------------------------------------------------

    /// List overdue unpaid/partial invoices not yet tracked by a case.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn list_untracked_overdue_invoices(
        &self,
        tenant_id: Uuid,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_untracked_overdue_invoices"])
            .start_timer();

        let limit = page_size.clamp(1, 100) as i64;

        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices i \
             WHERE i.tenant_id = $1 \
               AND i.status = 'overdue' \
               AND i.payment_status IN ('unpaid', 'partial') \
               AND NOT EXISTS ( \
                   SELECT 1 FROM debt_collections d WHERE d.invoice_id = i.invoice_id \
               ) \
               AND ($2::uuid IS NULL OR i.invoice_id > $2) \
             ORDER BY i.invoice_id \
             LIMIT $3"
        );
        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .bind(tenant_id)
            .bind(page_token)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to list untracked overdue invoices: {}",
                    e
                ))
            })?;

        timer.observe_duration();

        Ok(invoices)
    }

    /// Open a debt collection case for an invoice. One case per invoice.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, invoice_id = %input.invoice_id))]
    pub async fn create_debt_case(&self, input: &CreateDebtCase) -> Result<DebtCase, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_debt_case"])
            .start_timer();

        let invoice = self.get_invoice(input.tenant_id, input.invoice_id).await?;
        match invoice {
            Some(inv) if inv.status == "overdue" => {}
            Some(_) => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Debt collection cases can only be opened for overdue invoices"
                )))
            }
            None => return Err(AppError::NotFound(anyhow::anyhow!("Invoice not found"))),
        };

        let case_id = Uuid::new_v4();
        let sql = format!(
            "INSERT INTO debt_collections (case_id, tenant_id, invoice_id, priority, next_action_date, notes) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {DEBT_CASE_COLUMNS}"
        );
        let case = sqlx::query_as::<_, DebtCase>(&sql)
            .bind(case_id)
            .bind(input.tenant_id)
            .bind(input.invoice_id)
            .bind(input.priority.as_str())
            .bind(input.next_action_date)
            .bind(&input.notes)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    AppError::Conflict(anyhow::anyhow!(
                        "Invoice {} already has a debt collection case",
                        input.invoice_id
                    ))
                }
                _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create case: {}", e)),
            })?;

        timer.observe_duration();

        info!(case_id = %case.case_id, invoice_id = %case.invoice_id, "Debt collection case opened");

        Ok(case)
    }

    /// Get a case by ID.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, case_id = %case_id))]
    pub async fn get_debt_case(
        &self,
        tenant_id: Uuid,
        case_id: Uuid,
    ) -> Result<Option<DebtCase>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_debt_case"])
            .start_timer();

        let sql = format!(
            "SELECT {DEBT_CASE_COLUMNS} FROM debt_collections WHERE tenant_id = $1 AND case_id = $2"
        );
        let case = sqlx::query_as::<_, DebtCase>(&sql)
            .bind(tenant_id)
            .bind(case_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get case: {}", e)))?;

        timer.observe_duration();

        Ok(case)
    }

    /// List cases for a tenant.
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id))]
    pub async fn list_debt_cases(
        &self,
        tenant_id: Uuid,
        filter: &ListDebtCasesFilter,
    ) -> Result<Vec<DebtCase>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_debt_cases"])
            .start_timer();

        let limit = filter.page_size.clamp(1, 100) as i64;
        let status = filter.status.map(|s| s.as_str().to_string());
        let priority = filter.priority.map(|p| p.as_str().to_string());

        let sql = format!(
            "SELECT {DEBT_CASE_COLUMNS} FROM debt_collections \
             WHERE tenant_id = $1 \
               AND ($2::varchar IS NULL OR status = $2) \
               AND ($3::varchar IS NULL OR priority = $3) \
               AND ($4::uuid IS NULL OR case_id > $4) \
             ORDER BY case_id \
             LIMIT $5"
        );
        let cases = sqlx::query_as::<_, DebtCase>(&sql)
            .bind(tenant_id)
            .bind(&status)
            .bind(&priority)
            .bind(filter.page_token)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list cases: {}", e)))?;

        timer.observe_duration();

        Ok(cases)
    }

    /// Update a case's workflow fields.
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, case_id = %case_id))]
    pub async fn update_debt_case(
        &self,
        tenant_id: Uuid,
        case_id: Uuid,
        input: &UpdateDebtCase,
    ) -> Result<Option<DebtCase>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_debt_case"])
            .start_timer();

        let sql = format!(
            "UPDATE debt_collections \
             SET priority = COALESCE($3, priority), \
                 status = COALESCE($4, status), \
                 amount_collected = COALESCE($5, amount_collected), \
                 next_action_date = COALESCE($6, next_action_date), \
                 notes = COALESCE($7, notes), \
                 updated_utc = NOW() \
             WHERE tenant_id = $1 AND case_id = $2 \
             RETURNING {DEBT_CASE_COLUMNS}"
        );
        let case = sqlx::query_as::<_, DebtCase>(&sql)
            .bind(tenant_id)
            .bind(case_id)
            .bind(input.priority.map(|p| p.as_str()))
            .bind(input.status.map(|s| s.as_str()))
            .bind(input.amount_collected)
            .bind(input.next_action_date)
            .bind(&input.notes)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update case: {}", e)))?;

        timer.observe_duration();

        Ok(case)
    }

    /// Append an activity entry to a case.
    #[instrument(skip(self, note), fields(tenant_id = %tenant_id, case_id = %case_id))]
    pub async fn add_case_activity(
        &self,
        tenant_id: Uuid,
        case_id: Uuid,
        activity_type: &str,
        note: &str,
    ) -> Result<DebtCaseActivity, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_case_activity"])
            .start_timer();

        if self.get_debt_case(tenant_id, case_id).await?.is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!("Case not found")));
        }

        let activity_id = Uuid::new_v4();
        let activity = sqlx::query_as::<_, DebtCaseActivity>(
            "INSERT INTO debt_collection_activities (activity_id, case_id, tenant_id, activity_type, note) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING activity_id, case_id, tenant_id, activity_type, note, created_utc",
        )
        .bind(activity_id)
        .bind(case_id)
        .bind(tenant_id)
        .bind(activity_type)
        .bind(note)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to add activity: {}", e)))?;

        timer.observe_duration();

        Ok(activity)
    }

    /// List activity entries for a case, newest first.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, case_id = %case_id))]
    pub async fn list_case_activities(
        &self,
        tenant_id: Uuid,
        case_id: Uuid,
    ) -> Result<Vec<DebtCaseActivity>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_case_activities"])
            .start_timer();

        let activities = sqlx::query_as::<_, DebtCaseActivity>(
            "SELECT activity_id, case_id, tenant_id, activity_type, note, created_utc \
             FROM debt_collection_activities \
             WHERE tenant_id = $1 AND case_id = $2 \
             ORDER BY created_utc DESC",
        )
        .bind(tenant_id)
        .bind(case_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list activities: {}", e)))?;

        timer.observe_duration();

        Ok(activities)
    }

    // -------------------------------------------------------------------------
    // Dashboard Statistics
    // -------------------------------------------------------------------------

    /// Aggregate dashboard figures for a tenant.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn get_dashboard_stats(&self, tenant_id: Uuid) -> Result<DashboardStats, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_dashboard_stats"])
            .start_timer();

        let stats = sqlx::query_as::<_, DashboardStats>(
            "SELECT \
                COALESCE(SUM(total) FILTER (WHERE status <> 'draft'), 0) AS total_invoiced, \
                COALESCE(SUM(amount_paid), 0) AS total_collected, \
                COALESCE(SUM(amount_due) FILTER (WHERE status IN ('sent', 'viewed', 'overdue')), 0) AS total_outstanding, \
                COUNT(*) FILTER (WHERE status = 'draft') AS draft_count, \
                COUNT(*) FILTER (WHERE status = 'sent') AS sent_count, \
                COUNT(*) FILTER (WHERE status = 'viewed') AS viewed_count, \
                COUNT(*) FILTER (WHERE status = 'overdue') AS overdue_count, \
                COUNT(*) FILTER (WHERE status = 'paid') AS paid_count, \
                COUNT(*) FILTER (WHERE is_recurring) AS recurring_count, \
                (SELECT COUNT(*) FROM debt_collections d \
                  WHERE d.tenant_id = $1 AND d.status NOT IN ('resolved', 'written_off')) AS open_cases, \
                (SELECT COALESCE(SUM(amount_collected), 0) FROM debt_collections d \
                  WHERE d.tenant_id = $1) AS amount_in_collection \
             FROM invoices \
             WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to compute dashboard stats: {}", e))
        })?;

        timer.observe_duration();

        Ok(stats)
    }

    // -------------------------------------------------------------------------
    // Generation Run Operations
    // -------------------------------------------------------------------------

    /// Open a generation run record.
    #[instrument(skip(self))]
    pub async fn create_generation_run(
        &self,
        trigger: GenerationTrigger,
    ) -> Result<GenerationRun, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_generation_run"])
            .start_timer();

        let run_id = Uuid::new_v4();
        let sql = format!(
            "INSERT INTO generation_runs (run_id, run_type, status) \
             VALUES ($1, $2, 'running') \
             RETURNING {GENERATION_RUN_COLUMNS}"
        );
        let run = sqlx::query_as::<_, GenerationRun>(&sql)
            .bind(run_id)
            .bind(trigger.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create generation run: {}", e))
            })?;

        timer.observe_duration();

        Ok(run)
    }

    /// Close a generation run with final counts.
    #[instrument(skip(self), fields(run_id = %run_id))]
    pub async fn complete_generation_run(
        &self,
        run_id: Uuid,
        status: GenerationRunStatus,
        processed: i32,
        succeeded: i32,
        failed: i32,
        error_message: Option<&str>,
    ) -> Result<Option<GenerationRun>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["complete_generation_run"])
            .start_timer();

        let sql = format!(
            "UPDATE generation_runs \
             SET status = $2, \
                 completed_utc = NOW(), \
                 invoices_processed = $3, \
                 invoices_succeeded = $4, \
                 invoices_failed = $5, \
                 error_message = $6 \
             WHERE run_id = $1 \
             RETURNING {GENERATION_RUN_COLUMNS}"
        );
        let run = sqlx::query_as::<_, GenerationRun>(&sql)
            .bind(run_id)
            .bind(status.as_str())
            .bind(processed)
            .bind(succeeded)
            .bind(failed)
            .bind(error_message)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to complete generation run: {}", e))
            })?;

        timer.observe_duration();

        Ok(run)
    }

    /// Record the outcome for one source invoice within a run.
    #[instrument(skip(self, outcome), fields(run_id = %run_id, source_invoice_id = %source_invoice_id))]
    pub async fn create_generation_run_result(
        &self,
        run_id: Uuid,
        source_invoice_id: Uuid,
        outcome: &GenerationOutcome,
    ) -> Result<GenerationRunResult, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_generation_run_result"])
            .start_timer();

        let (new_invoice_id, error_message) = match outcome {
            GenerationOutcome::Created(id) => (Some(*id), None),
            GenerationOutcome::Stopped => (None, None),
            GenerationOutcome::Failed(msg) => (None, Some(msg.clone())),
        };

        let result_id = Uuid::new_v4();
        let result = sqlx::query_as::<_, GenerationRunResult>(
            "INSERT INTO generation_run_results (result_id, run_id, source_invoice_id, new_invoice_id, status, error_message) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING result_id, run_id, source_invoice_id, new_invoice_id, status, error_message, created_utc",
        )
        .bind(result_id)
        .bind(run_id)
        .bind(source_invoice_id)
        .bind(new_invoice_id)
        .bind(outcome.as_str())
        .bind(error_message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to record run result: {}", e))
        })?;

        timer.observe_duration();

        Ok(result)
    }

    /// Get a run with its per-invoice results.
    #[instrument(skip(self), fields(run_id = %run_id))]
    pub async fn get_generation_run(
        &self,
        run_id: Uuid,
    ) -> Result<Option<(GenerationRun, Vec<GenerationRunResult>)>, AppError> {
        let sql = format!("SELECT {GENERATION_RUN_COLUMNS} FROM generation_runs WHERE run_id = $1");
        let run = sqlx::query_as::<_, GenerationRun>(&sql)
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to get generation run: {}", e))
            })?;

        let Some(run) = run else {
            return Ok(None);
        };

        let results = sqlx::query_as::<_, GenerationRunResult>(
            "SELECT result_id, run_id, source_invoice_id, new_invoice_id, status, error_message, created_utc \
             FROM generation_run_results \
             WHERE run_id = $1 \
             ORDER BY created_utc",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get run results: {}", e))
        })?;

        Ok(Some((run, results)))
    }

    /// List recent generation runs, newest first.
    #[instrument(skip(self))]
    pub async fn list_generation_runs(&self, limit: i32) -> Result<Vec<GenerationRun>, AppError> {
        let sql = format!(
            "SELECT {GENERATION_RUN_COLUMNS} FROM generation_runs \
             ORDER BY started_utc DESC \
             LIMIT $1"
        );
        let runs = sqlx::query_as::<_, GenerationRun>(&sql)
            .bind(limit.clamp(1, 100) as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to list generation runs: {}", e))
            })?;

        Ok(runs)
    }
}
