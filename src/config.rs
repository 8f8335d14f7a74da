// src/config.rs

use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Knobs shared by the payout paths.
#[derive(Debug, Clone)]
pub struct PayoutSettings {
    /// Upper bound for a single provider call.
    pub timeout: Duration,
    /// Age after which an unresolved payout claim may be reconciled.
    pub claim_lease: Duration,
}

impl Default for PayoutSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            claim_lease: Duration::from_secs(120),
        }
    }
}

impl PayoutSettings {
    pub fn lease(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.claim_lease).unwrap_or_else(|_| chrono::Duration::days(365))
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub stripe_api_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base: String,
    pub currency: String,
    pub top_up_success_url: String,
    pub top_up_cancel_url: String,
    pub jwt_secret: String,
    pub payouts: PayoutSettings,
    pub webhook_tolerance: Duration,
    pub reconcile_interval: Duration,
    pub reconcile_batch_size: i64,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn or_default(name: &'static str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_backend = match or_default("STORE_BACKEND", "postgres").as_str() {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let database_url = match store_backend {
            StoreBackend::Postgres => Some(required("DATABASE_URL")?),
            StoreBackend::Memory => env::var("DATABASE_URL").ok(),
        };

        let public_base = or_default("PUBLIC_BASE_URL", "http://localhost:8065");

        let payouts = PayoutSettings {
            timeout: Duration::from_secs(parsed("PAYOUT_TIMEOUT_SECS", 15)?),
            claim_lease: Duration::from_secs(parsed("PAYOUT_CLAIM_LEASE_SECS", 120)?),
        };
        // a claim must outlive the provider call it guards
        if payouts.timeout.is_zero() || payouts.timeout >= payouts.claim_lease {
            return Err(ConfigError::Invalid {
                name: "PAYOUT_TIMEOUT_SECS",
                value: format!(
                    "{} (must be non-zero and below PAYOUT_CLAIM_LEASE_SECS={})",
                    payouts.timeout.as_secs(),
                    payouts.claim_lease.as_secs()
                ),
            });
        }

        Ok(Self {
            bind_addr: or_default("BIND_ADDR", "0.0.0.0:8065"),
            store_backend,
            database_url,
            stripe_api_key: required("STRIPE_API_KEY")?,
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            stripe_api_base: or_default("STRIPE_API_BASE", "https://api.stripe.com"),
            currency: or_default("PAYMENT_CURRENCY", "usd"),
            top_up_success_url: or_default(
                "TOP_UP_SUCCESS_URL",
                &format!("{public_base}/top-up/success"),
            ),
            top_up_cancel_url: or_default(
                "TOP_UP_CANCEL_URL",
                &format!("{public_base}/top-up/cancel"),
            ),
            jwt_secret: required("JWT_SECRET")?,
            payouts,
            webhook_tolerance: Duration::from_secs(parsed("WEBHOOK_TOLERANCE_SECS", 300)?),
            reconcile_interval: Duration::from_secs(parsed("RECONCILE_INTERVAL_SECS", 60)?),
            reconcile_batch_size: parsed("RECONCILE_BATCH_SIZE", 50)?,
        })
    }
}
