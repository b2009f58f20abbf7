//! Payment processor configuration.

use std::time::Duration;

use domain::Currency;

/// Settings for the checkout gateway and the reservation path.
///
/// Built once at startup and shared read-only for the lifetime of the
/// process.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Secret API key for the processor.
    pub api_key: String,
    /// Base URL of the processor API, without a trailing slash.
    pub api_base: String,
    /// Where the payer lands after paying. The session id is appended.
    pub success_url: String,
    /// Where the payer lands after abandoning checkout.
    pub cancel_url: String,
    /// Currency used when a reservation does not name one.
    pub default_currency: Currency,
    /// Upper bound on a single session-creation call.
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Success URL with the processor's session-id placeholder appended.
    pub fn success_url_with_session(&self) -> String {
        let separator = if self.success_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}session_id={{CHECKOUT_SESSION_ID}}",
            self.success_url, separator
        )
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://api.stripe.com".to_string(),
            success_url: "http://localhost:3000/success".to_string(),
            cancel_url: "http://localhost:3000/cancel".to_string(),
            default_currency: Currency::usd(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("success_url", &self.success_url)
            .field("cancel_url", &self.cancel_url)
            .field("default_currency", &self.default_currency)
            .field("timeout", &self.timeout)
            .finish()
    }
}
