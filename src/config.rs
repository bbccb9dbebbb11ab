//! Client configuration.
//!
//! Defaults match the production backend. A JSON file named by
//! `NATIVRIK_CONFIG` may override any field, and `NATIVRIK_API_URL` /
//! `NATIVRIK_SOCKET_URL` override the endpoints on top of that.

use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::normalize_base_url;
use crate::error::{ClientError, ClientResult};

pub const ENV_CONFIG_PATH: &str = "NATIVRIK_CONFIG";
pub const ENV_API_URL: &str = "NATIVRIK_API_URL";
pub const ENV_SOCKET_URL: &str = "NATIVRIK_SOCKET_URL";

const DEFAULT_API_URL: &str = "https://cedrick-unlunated-gwyn.ngrok-free.app";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Flat delivery charge added to `Delivery` orders.
pub const FIXED_DELIVERY_FEE: Decimal = dec!(10000);
pub const SERVICE_FEE_RATE: Decimal = dec!(0.10);

const POLL_INTERVAL_MS: u64 = 3_000;
const POLL_CEILING_MS: u64 = 120_000;

/// Installed wallet / mobile-banking apps the payment page may redirect to.
pub const WALLET_SCHEMES: &[&str] = &[
    "gojek://",
    "shopeepay://",
    "dana://",
    "linkaja://",
    "telkomsel_e-money://",
    "bca-mobile://",
    "mandiri-online://",
    "bri-mobile://",
    "bca-virtual-account://",
    "permatabank-va://",
    "cimb-niaga-va://",
];

/// Path of the gateway page that itself bounces to a wallet deep link.
pub const GATEWAY_REDIRECT_MARKER: &str = "app.sandbox.midtrans.com/snap/v4/redirection";

/// This app's own scheme, used for app-to-app returns.
pub const APP_SCHEME: &str = "nativrik://";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaymentConfig {
    #[serde(with = "rust_decimal::serde::float")]
    pub service_fee_rate: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub delivery_fee: Decimal,
    pub poll_interval_ms: u64,
    pub poll_ceiling_ms: u64,
    pub wallet_schemes: Vec<String>,
    pub gateway_redirect_marker: String,
    pub app_scheme: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            service_fee_rate: SERVICE_FEE_RATE,
            delivery_fee: FIXED_DELIVERY_FEE,
            poll_interval_ms: POLL_INTERVAL_MS,
            poll_ceiling_ms: POLL_CEILING_MS,
            wallet_schemes: WALLET_SCHEMES.iter().map(|s| s.to_string()).collect(),
            gateway_redirect_marker: GATEWAY_REDIRECT_MARKER.to_string(),
            app_scheme: APP_SCHEME.to_string(),
        }
    }
}

impl PaymentConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_ceiling(&self) -> Duration {
        Duration::from_millis(self.poll_ceiling_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    pub api_base_url: String,
    /// Realtime endpoint; the API host is used when unset.
    pub socket_url: Option<String>,
    pub request_timeout_secs: u64,
    pub payment: PaymentConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            socket_url: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            payment: PaymentConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults, then the optional JSON file, then env overrides.
    pub fn from_env() -> ClientResult<Self> {
        let mut config = match env_non_empty(ENV_CONFIG_PATH) {
            Some(path) => Self::from_json_file(Path::new(&path))?,
            None => Self::default(),
        };
        if let Some(url) = env_non_empty(ENV_API_URL) {
            config.api_base_url = url;
        }
        if let Some(url) = env_non_empty(ENV_SOCKET_URL) {
            config.socket_url = Some(url);
        }
        config.normalize()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> ClientResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("read {}: {e}", path.display())))?;
        let mut config: Self = serde_json::from_str(&raw)
            .map_err(|e| ClientError::Config(format!("parse {}: {e}", path.display())))?;
        config.normalize()?;
        debug!(path = %path.display(), "Loaded client config file");
        Ok(config)
    }

    pub fn socket_url(&self) -> &str {
        self.socket_url.as_deref().unwrap_or(&self.api_base_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn normalize(&mut self) -> ClientResult<()> {
        self.api_base_url = normalize_base_url(&self.api_base_url);
        if self.api_base_url.is_empty() {
            return Err(ClientError::Config("api base URL is empty".into()));
        }
        self.socket_url = self
            .socket_url
            .as_deref()
            .map(normalize_base_url)
            .filter(|s| !s.is_empty());
        if self.payment.poll_interval_ms == 0 || self.payment.poll_ceiling_ms == 0 {
            return Err(ClientError::Config(
                "poll interval and ceiling must be positive".into(),
            ));
        }
        if self.payment.service_fee_rate < Decimal::ZERO || self.payment.delivery_fee < Decimal::ZERO
        {
            return Err(ClientError::Config("fees cannot be negative".into()));
        }
        Ok(())
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var(ENV_CONFIG_PATH);
        std::env::remove_var(ENV_API_URL);
        std::env::remove_var(ENV_SOCKET_URL);
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        clear_env();
        let config = ClientConfig::from_env().expect("default config");
        assert_eq!(config.api_base_url, DEFAULT_API_URL);
        assert_eq!(config.socket_url(), DEFAULT_API_URL);
        assert_eq!(config.payment.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.payment.poll_ceiling(), Duration::from_secs(120));
        assert_eq!(config.payment.delivery_fee, dec!(10000));
    }

    #[test]
    #[serial]
    fn test_env_overrides_are_normalized() {
        clear_env();
        std::env::set_var(ENV_API_URL, "api.nativrik.app/api/");
        std::env::set_var(ENV_SOCKET_URL, "localhost:4000/");
        let config = ClientConfig::from_env().expect("env config");
        clear_env();
        assert_eq!(config.api_base_url, "https://api.nativrik.app");
        assert_eq!(config.socket_url(), "http://localhost:4000");
    }

    #[test]
    #[serial]
    fn test_json_file_overrides_payment_settings() {
        clear_env();
        let path = std::env::temp_dir().join(format!("nativrik-config-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"{"apiBaseUrl":"https://staging.nativrik.app","payment":{"pollIntervalMs":500,"deliveryFee":15000}}"#,
        )
        .expect("write config");
        std::env::set_var(ENV_CONFIG_PATH, &path);
        let config = ClientConfig::from_env().expect("file config");
        clear_env();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.api_base_url, "https://staging.nativrik.app");
        assert_eq!(config.payment.poll_interval_ms, 500);
        assert_eq!(config.payment.delivery_fee, dec!(15000));
        // untouched fields keep their defaults
        assert_eq!(config.payment.poll_ceiling_ms, POLL_CEILING_MS);
        assert_eq!(config.payment.wallet_schemes.len(), WALLET_SCHEMES.len());
    }

    #[test]
    #[serial]
    fn test_zero_poll_interval_rejected() {
        clear_env();
        let mut config = ClientConfig::default();
        config.payment.poll_interval_ms = 0;
        assert!(matches!(config.normalize(), Err(ClientError::Config(_))));
    }
}
