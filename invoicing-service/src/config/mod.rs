use secrecy::Secret;
use service_core::config::{self as core_config, get_env, is_prod};
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct InvoicingConfig {
    pub common: core_config::Config,
    pub database: DatabaseConfig,
    pub smtp: SmtpConfig,
    pub worker: WorkerConfig,
    /// Base URL of billing-service for usage-event reporting. Empty disables
    /// reporting.
    pub billing_service_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
    pub from_email: String,
    pub from_name: String,
}

/// Recurring generation worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl InvoicingConfig {
    pub fn load() -> Result<Self, AppError> {
        // Common config handles .env and the APP__ prefix.
        let common = core_config::Config::load()?;
        let is_prod = is_prod();

        Ok(InvoicingConfig {
            common,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: get_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?
                    .parse()
                    .map_err(|e| {
                        AppError::ConfigError(anyhow::anyhow!(
                            "Invalid DATABASE_MAX_CONNECTIONS: {}",
                            e
                        ))
                    })?,
                min_connections: get_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?
                    .parse()
                    .map_err(|e| {
                        AppError::ConfigError(anyhow::anyhow!(
                            "Invalid DATABASE_MIN_CONNECTIONS: {}",
                            e
                        ))
                    })?,
            },
            smtp: SmtpConfig {
                enabled: get_env("SMTP_ENABLED", Some("false"), is_prod)? == "true",
                host: get_env("SMTP_HOST", Some("localhost"), is_prod)?,
                port: get_env("SMTP_PORT", Some("587"), is_prod)?
                    .parse()
                    .map_err(|e| {
                        AppError::ConfigError(anyhow::anyhow!("Invalid SMTP_PORT: {}", e))
                    })?,
                user: env::var("SMTP_USER").unwrap_or_default(),
                password: Secret::new(env::var("SMTP_PASSWORD").unwrap_or_default()),
                from_email: get_env("SMTP_FROM_EMAIL", Some("billing@example.com"), is_prod)?,
                from_name: get_env("SMTP_FROM_NAME", Some("Invoicing"), is_prod)?,
            },
            worker: WorkerConfig {
                enabled: get_env("GENERATION_WORKER_ENABLED", Some("true"), is_prod)? == "true",
                interval_secs: get_env("GENERATION_WORKER_INTERVAL_SECS", Some("3600"), is_prod)?
                    .parse()
                    .map_err(|e| {
                        AppError::ConfigError(anyhow::anyhow!(
                            "Invalid GENERATION_WORKER_INTERVAL_SECS: {}",
                            e
                        ))
                    })?,
            },
            billing_service_url: env::var("BILLING_SERVICE_URL").unwrap_or_default(),
        })
    }
}
