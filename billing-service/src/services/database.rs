//! Database service for billing-service.

use crate::models::{PlanLimit, Subscriber, UsageCounter};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const SUBSCRIBER_COLUMNS: &str = "tenant_id, provider_customer_id, provider_subscription_id, plan_tier, \
     subscription_status, current_period_start, current_period_end, last_synced_utc, \
     created_utc, updated_utc";

/// Fields written on each provider sync.
#[derive(Debug, Clone)]
pub struct SubscriberSync {
    pub provider_customer_id: Option<String>,
    pub provider_subscription_id: Option<String>,
    pub plan_tier: String,
    pub subscription_status: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "billing-service"))]
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
    // Subscriber Operations
    // -------------------------------------------------------------------------

    /// Get a subscriber by tenant.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn get_subscriber(&self, tenant_id: Uuid) -> Result<Option<Subscriber>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_subscriber"])
            .start_timer();

        let sql = format!("SELECT {SUBSCRIBER_COLUMNS} FROM subscribers WHERE tenant_id = $1");
        let subscriber = sqlx::query_as::<_, Subscriber>(&sql)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to get subscriber: {}", e))
            })?;

        timer.observe_duration();

        Ok(subscriber)
    }

    /// Find a subscriber by the provider's customer ID. Used by webhooks,
    /// which carry provider identifiers rather than tenant IDs.
    #[instrument(skip(self))]
    pub async fn get_subscriber_by_customer(
        &self,
        provider_customer_id: &str,
    ) -> Result<Option<Subscriber>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_subscriber_by_customer"])
            .start_timer();

        let sql = format!(
            "SELECT {SUBSCRIBER_COLUMNS} FROM subscribers WHERE provider_customer_id = $1"
        );
        let subscriber = sqlx::query_as::<_, Subscriber>(&sql)
            .bind(provider_customer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to get subscriber: {}", e))
            })?;

        timer.observe_duration();

        Ok(subscriber)
    }

    /// Upsert subscriber state from a provider sync.
    #[instrument(skip(self, sync), fields(tenant_id = %tenant_id))]
    pub async fn upsert_subscriber(
        &self,
        tenant_id: Uuid,
        sync: &SubscriberSync,
    ) -> Result<Subscriber, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_subscriber"])
            .start_timer();

        let sql = format!(
            "INSERT INTO subscribers (tenant_id, provider_customer_id, provider_subscription_id, plan_tier, subscription_status, current_period_start, current_period_end, last_synced_utc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW()) \
             ON CONFLICT (tenant_id) DO UPDATE SET \
                 provider_customer_id = COALESCE(EXCLUDED.provider_customer_id, subscribers.provider_customer_id), \
                 provider_subscription_id = EXCLUDED.provider_subscription_id, \
                 plan_tier = EXCLUDED.plan_tier, \
                 subscription_status = EXCLUDED.subscription_status, \
                 current_period_start = EXCLUDED.current_period_start, \
                 current_period_end = EXCLUDED.current_period_end, \
                 last_synced_utc = NOW(), \
                 updated_utc = NOW() \
             RETURNING {SUBSCRIBER_COLUMNS}"
        );
        let subscriber = sqlx::query_as::<_, Subscriber>(&sql)
            .bind(tenant_id)
            .bind(&sync.provider_customer_id)
            .bind(&sync.provider_subscription_id)
            .bind(&sync.plan_tier)
            .bind(&sync.subscription_status)
            .bind(sync.current_period_start)
            .bind(sync.current_period_end)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to upsert subscriber: {}", e))
            })?;

        timer.observe_duration();

        info!(
            tenant_id = %tenant_id,
            plan_tier = %subscriber.plan_tier,
            subscription_status = %subscriber.subscription_status,
            "Subscriber synced"
        );

        Ok(subscriber)
    }

    /// Attach a provider customer ID to a tenant, creating the subscriber row
    /// on free tier when absent. Plan state arrives on the next refresh.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn link_customer(
        &self,
        tenant_id: Uuid,
        provider_customer_id: &str,
    ) -> Result<Subscriber, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["link_customer"])
            .start_timer();

        let sql = format!(
            "INSERT INTO subscribers (tenant_id, provider_customer_id) \
             VALUES ($1, $2) \
             ON CONFLICT (tenant_id) DO UPDATE SET \
                 provider_customer_id = EXCLUDED.provider_customer_id, \
                 updated_utc = NOW() \
             RETURNING {SUBSCRIBER_COLUMNS}"
        );
        let subscriber = sqlx::query_as::<_, Subscriber>(&sql)
            .bind(tenant_id)
            .bind(provider_customer_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to link customer: {}", e))
            })?;

        timer.observe_duration();

        info!(provider_customer_id = provider_customer_id, "Provider customer linked");

        Ok(subscriber)
    }

    // -------------------------------------------------------------------------
    // Plan Limit Operations
    // -------------------------------------------------------------------------

    /// Ceiling for one resource on one tier. Missing rows gate at zero.
    #[instrument(skip(self))]
    pub async fn get_plan_limit(&self, plan_tier: &str, resource: &str) -> Result<i32, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_plan_limit"])
            .start_timer();

        let max_count: Option<i32> = sqlx::query_scalar(
            "SELECT max_count FROM plan_limits WHERE plan_tier = $1 AND resource = $2",
        )
        .bind(plan_tier)
        .bind(resource)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get plan limit: {}", e)))?;

        timer.observe_duration();

        Ok(max_count.unwrap_or(0))
    }

    /// All limits for one tier.
    #[instrument(skip(self))]
    pub async fn list_plan_limits(&self, plan_tier: &str) -> Result<Vec<PlanLimit>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_plan_limits"])
            .start_timer();

        let limits = sqlx::query_as::<_, PlanLimit>(
            "SELECT plan_tier, resource, max_count FROM plan_limits \
             WHERE plan_tier = $1 ORDER BY resource",
        )
        .bind(plan_tier)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list plan limits: {}", e))
        })?;

        timer.observe_duration();

        Ok(limits)
    }

    // -------------------------------------------------------------------------
    // Usage Counter Operations
    // -------------------------------------------------------------------------

    /// Current count for one resource; zero when never reported.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn get_usage(&self, tenant_id: Uuid, resource: &str) -> Result<i32, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_usage"])
            .start_timer();

        let count: Option<i32> = sqlx::query_scalar(
            "SELECT current_count FROM usage_counters WHERE tenant_id = $1 AND resource = $2",
        )
        .bind(tenant_id)
        .bind(resource)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get usage: {}", e)))?;

        timer.observe_duration();

        Ok(count.unwrap_or(0))
    }

    /// All reported counters for a tenant.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn list_usage(&self, tenant_id: Uuid) -> Result<Vec<UsageCounter>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_usage"])
            .start_timer();

        let counters = sqlx::query_as::<_, UsageCounter>(
            "SELECT tenant_id, resource, current_count, updated_utc FROM usage_counters \
             WHERE tenant_id = $1 ORDER BY resource",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list usage: {}", e)))?;

        timer.observe_duration();

        Ok(counters)
    }

    /// Apply a usage delta, clamping at zero. Returns the new count.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn adjust_usage(
        &self,
        tenant_id: Uuid,
        resource: &str,
        delta: i32,
    ) -> Result<i32, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["adjust_usage"])
            .start_timer();

        let count: i32 = sqlx::query_scalar(
            "INSERT INTO usage_counters (tenant_id, resource, current_count) \
             VALUES ($1, $2, GREATEST($3, 0)) \
             ON CONFLICT (tenant_id, resource) DO UPDATE SET \
                 current_count = GREATEST(usage_counters.current_count + $3, 0), \
                 updated_utc = NOW() \
             RETURNING current_count",
        )
        .bind(tenant_id)
        .bind(resource)
        .bind(delta)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to adjust usage: {}", e)))?;

        timer.observe_duration();

        Ok(count)
    }

    /// Overwrite a counter with an absolute count, e.g. after a reconcile.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn set_usage(
        &self,
        tenant_id: Uuid,
        resource: &str,
        count: i32,
    ) -> Result<i32, AppError> {
        if count < 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Usage count must not be negative"
            )));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_usage"])
            .start_timer();

        let count: i32 = sqlx::query_scalar(
            "INSERT INTO usage_counters (tenant_id, resource, current_count) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (tenant_id, resource) DO UPDATE SET \
                 current_count = EXCLUDED.current_count, \
                 updated_utc = NOW() \
             RETURNING current_count",
        )
        .bind(tenant_id)
        .bind(resource)
        .bind(count)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to set usage: {}", e)))?;

        timer.observe_duration();

        Ok(count)
    }
}
