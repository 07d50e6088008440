use crate::config::InvoicingConfig;
use crate::handlers;
use crate::services::{Database, EmailService, UsageReporter};
use crate::workers::RecurringGenerator;
use axum::{
    routing::{get, post, put},
    Router,
};
use service_core::error::AppError;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: InvoicingConfig,
    pub db: Database,
    pub email: Arc<EmailService>,
    pub usage: UsageReporter,
    pub generator: RecurringGenerator,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::health::metrics_endpoint))
        .route(
            "/clients",
            post(handlers::clients::create_client).get(handlers::clients::list_clients),
        )
        .route(
            "/clients/:client_id",
            get(handlers::clients::get_client).put(handlers::clients::update_client),
        )
        .route(
            "/invoices",
            post(handlers::invoices::create_invoice).get(handlers::invoices::list_invoices),
        )
        .route(
            "/invoices/overdue-sweep",
            post(handlers::invoices::sweep_overdue_invoices),
        )
        .route(
            "/invoices/:invoice_id",
            get(handlers::invoices::get_invoice)
                .put(handlers::invoices::update_invoice)
                .delete(handlers::invoices::delete_invoice),
        )
        .route("/invoices/:invoice_id/send", post(handlers::invoices::send_invoice))
        .route(
            "/invoices/:invoice_id/viewed",
            post(handlers::invoices::mark_invoice_viewed),
        )
        .route(
            "/invoices/:invoice_id/payments",
            post(handlers::invoices::record_payment),
        )
        .route(
            "/invoices/:invoice_id/items",
            post(handlers::line_items::add_line_item).get(handlers::line_items::list_line_items),
        )
        .route(
            "/invoices/:invoice_id/items/:item_id",
            put(handlers::line_items::update_line_item)
                .delete(handlers::line_items::remove_line_item),
        )
        .route(
            "/debt-collections/untracked",
            get(handlers::debt_collections::list_untracked_overdue),
        )
        .route(
            "/debt-collections",
            post(handlers::debt_collections::create_case)
                .get(handlers::debt_collections::list_cases),
        )
        .route(
            "/debt-collections/:case_id",
            get(handlers::debt_collections::get_case).put(handlers::debt_collections::update_case),
        )
        .route(
            "/debt-collections/:case_id/activities",
            post(handlers::debt_collections::add_activity)
                .get(handlers::debt_collections::list_activities),
        )
        .route("/stats/dashboard", get(handlers::stats::dashboard_stats))
        .route(
            "/generation-runs",
            post(handlers::generation_runs::trigger_generation_run)
                .get(handlers::generation_runs::list_generation_runs),
        )
        .route(
            "/generation-runs/:run_id",
            get(handlers::generation_runs::get_generation_run),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
    state: AppState,
}

impl Application {
    pub async fn build(config: InvoicingConfig) -> Result<Self, AppError> {
        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to PostgreSQL: {}", e);
            e
        })?;

        db.run_migrations().await.map_err(|e| {
            tracing::error!("Failed to run migrations: {}", e);
            e
        })?;

        let email = Arc::new(EmailService::new(config.smtp.clone()).map_err(|e| {
            tracing::error!("Failed to initialize email service: {}", e);
            e
        })?);

        let usage = UsageReporter::new(config.billing_service_url.clone());
        if !usage.is_configured() {
            tracing::warn!("BILLING_SERVICE_URL not set; usage reporting disabled");
        }

        let state = AppState {
            config: config.clone(),
            db: db.clone(),
            email,
            usage,
            generator: RecurringGenerator::new(db),
        };

        let app = router(state.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        let server = axum::serve(listener, app);

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
            state,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}
