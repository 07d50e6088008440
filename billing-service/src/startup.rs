use crate::config::BillingConfig;
use crate::handlers;
use crate::services::{Database, EntitlementService, ProviderClient};
use axum::{
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use std::future::IntoFuture;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: BillingConfig,
    pub db: Database,
    pub provider: ProviderClient,
    pub entitlements: EntitlementService,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::health::metrics_endpoint))
        .route(
            "/subscription",
            get(handlers::subscriptions::get_subscription),
        )
        .route(
            "/subscription/link",
            post(handlers::subscriptions::link_customer),
        )
        .route(
            "/subscription/refresh",
            post(handlers::subscriptions::refresh_subscription),
        )
        .route(
            "/entitlements",
            get(handlers::entitlements::list_entitlements),
        )
        .route(
            "/entitlements/:resource/can-create",
            get(handlers::entitlements::can_create),
        )
        .route(
            "/usage",
            get(handlers::usage::list_usage).put(handlers::usage::set_usage),
        )
        .route("/usage/events", post(handlers::usage::record_usage_event))
        .route("/webhooks/provider", post(handlers::webhooks::provider_webhook))
        .route(
            "/checkout-sessions",
            post(handlers::checkout::create_checkout_session),
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
    pub async fn build(config: BillingConfig) -> Result<Self, AppError> {
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

        let provider = ProviderClient::new(config.provider.clone());
        if !provider.is_configured() {
            tracing::warn!("Billing provider credentials not set; gate runs on stored state only");
        }

        let state = AppState {
            config: config.clone(),
            db: db.clone(),
            provider: provider.clone(),
            entitlements: EntitlementService::new(db, provider),
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
