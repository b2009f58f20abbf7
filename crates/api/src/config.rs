//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use checkout::GatewayConfig;
use domain::Currency;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory stores when unset
/// - `STRIPE_API_KEY`: processor secret key; in-memory gateway when unset
/// - `STRIPE_API_BASE`: processor API base (default: `"https://api.stripe.com"`)
/// - `STRIPE_SUCCESS_URL` / `STRIPE_CANCEL_URL`: payer redirect targets
/// - `STRIPE_WEBHOOK_SECRET`: webhook signing secret; webhooks rejected when unset
/// - `CHECKOUT_CURRENCY`: default currency (default: `"USD"`)
/// - `GATEWAY_TIMEOUT_SECS`: bound on session creation (default: `10`)
/// - `CATALOG_SEED_FILE`: JSON file of items and initial stock
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub stripe_api_key: Option<String>,
    pub stripe_api_base: String,
    pub success_url: String,
    pub cancel_url: String,
    pub webhook_secret: Option<String>,
    pub default_currency: Currency,
    pub gateway_timeout: Duration,
    pub catalog_seed_file: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let default_currency = match non_empty("CHECKOUT_CURRENCY") {
            Some(code) => Currency::parse(&code).unwrap_or_else(|e| {
                tracing::warn!(%code, error = %e, "ignoring invalid CHECKOUT_CURRENCY");
                defaults.default_currency.clone()
            }),
            None => defaults.default_currency.clone(),
        };

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: non_empty("DATABASE_URL"),
            stripe_api_key: non_empty("STRIPE_API_KEY"),
            stripe_api_base: non_empty("STRIPE_API_BASE").unwrap_or(defaults.stripe_api_base),
            success_url: non_empty("STRIPE_SUCCESS_URL").unwrap_or(defaults.success_url),
            cancel_url: non_empty("STRIPE_CANCEL_URL").unwrap_or(defaults.cancel_url),
            webhook_secret: non_empty("STRIPE_WEBHOOK_SECRET"),
            default_currency,
            gateway_timeout: non_empty("GATEWAY_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.gateway_timeout),
            catalog_seed_file: non_empty("CATALOG_SEED_FILE").map(PathBuf::from),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Immutable settings handed to the gateway and reservation service.
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            api_key: self.stripe_api_key.clone().unwrap_or_default(),
            api_base: self.stripe_api_base.clone(),
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
            default_currency: self.default_currency.clone(),
            timeout: self.gateway_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let gateway = GatewayConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            stripe_api_key: None,
            stripe_api_base: gateway.api_base,
            success_url: gateway.success_url,
            cancel_url: gateway.cancel_url,
            webhook_secret: None,
            default_currency: gateway.default_currency,
            gateway_timeout: gateway.timeout,
            catalog_seed_file: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("database_url", &redact(&self.database_url))
            .field("stripe_api_key", &redact(&self.stripe_api_key))
            .field("stripe_api_base", &self.stripe_api_base)
            .field("success_url", &self.success_url)
            .field("cancel_url", &self.cancel_url)
            .field("webhook_secret", &redact(&self.webhook_secret))
            .field("default_currency", &self.default_currency)
            .field("gateway_timeout", &self.gateway_timeout)
            .field("catalog_seed_file", &self.catalog_seed_file)
            .finish()
    }
}
