use secrecy::Secret;
use service_core::config::{self as core_config, get_env, is_prod};
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub common: core_config::Config,
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Billing provider credentials. Secrets never appear in Debug output.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_base_url: String,
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
}

impl BillingConfig {
    pub fn load() -> Result<Self, AppError> {
        // Common config handles .env and the APP__ prefix.
        let common = core_config::Config::load()?;
        let is_prod = is_prod();

        Ok(BillingConfig {
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
            provider: ProviderConfig {
                api_base_url: get_env(
                    "BILLING_PROVIDER_API_URL",
                    Some("https://billing.example.com/v1"),
                    is_prod,
                )?,
                key_id: env::var("BILLING_PROVIDER_KEY_ID").unwrap_or_default(),
                key_secret: Secret::new(
                    env::var("BILLING_PROVIDER_KEY_SECRET").unwrap_or_default(),
                ),
                webhook_secret: Secret::new(
                    env::var("BILLING_PROVIDER_WEBHOOK_SECRET").unwrap_or_default(),
                ),
            },
        })
    }
}
