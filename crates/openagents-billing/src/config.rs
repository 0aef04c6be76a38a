use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_BILLING_WILDCARD_HOST: &str = "OPENAGENTS_BILLING_WILDCARD_HOST";
pub const ENV_BILLING_PAYMENTS_SERVICE: &str = "OPENAGENTS_BILLING_PAYMENTS_SERVICE";
pub const ENV_BILLING_RECHECK_DELAY_MS: &str = "OPENAGENTS_BILLING_RECHECK_DELAY_MS";
pub const ENV_BILLING_PRODUCT_NAME: &str = "OPENAGENTS_BILLING_PRODUCT_NAME";
pub const ENV_BILLING_METHODS_BASE_URL: &str = "OPENAGENTS_BILLING_METHODS_BASE_URL";
pub const ENV_BILLING_AUTH_TOKEN: &str = "OPENAGENTS_BILLING_AUTH_TOKEN";

pub const DEFAULT_WILDCARD_HOST: &str = "*.local.openagents.com";
pub const DEFAULT_PAYMENTS_SERVICE: &str = "payments";
pub const DEFAULT_RECHECK_DELAY_MS: u64 = 2_000;
pub const DEFAULT_PRODUCT_NAME: &str = "OpenAgents";
pub const DEFAULT_METHODS_BASE_URL: &str = "http://127.0.0.1:8787";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingConfig {
    /// Host pattern with a single `*` replaced by a service name, e.g. `*.oasis.example.com`.
    pub wildcard_host: String,
    pub payments_service: String,
    pub recheck_delay: Duration,
    pub product_name: String,
    pub methods_base_url: String,
    pub auth_token: Option<String>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            wildcard_host: DEFAULT_WILDCARD_HOST.to_string(),
            payments_service: DEFAULT_PAYMENTS_SERVICE.to_string(),
            recheck_delay: Duration::from_millis(DEFAULT_RECHECK_DELAY_MS),
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            methods_base_url: DEFAULT_METHODS_BASE_URL.to_string(),
            auth_token: None,
        }
    }
}

impl BillingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let recheck_delay = match env_non_empty(ENV_BILLING_RECHECK_DELAY_MS) {
            Some(raw) => {
                let millis = raw.parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
                    key: ENV_BILLING_RECHECK_DELAY_MS.to_string(),
                    value: raw.clone(),
                })?;
                Duration::from_millis(millis)
            }
            None => defaults.recheck_delay,
        };

        let methods_base_url = env_non_empty(ENV_BILLING_METHODS_BASE_URL)
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or(defaults.methods_base_url);
        url::Url::parse(&methods_base_url).map_err(|_| ConfigError::InvalidEnv {
            key: ENV_BILLING_METHODS_BASE_URL.to_string(),
            value: methods_base_url.clone(),
        })?;

        Ok(Self {
            wildcard_host: env_non_empty(ENV_BILLING_WILDCARD_HOST)
                .unwrap_or(defaults.wildcard_host),
            payments_service: env_non_empty(ENV_BILLING_PAYMENTS_SERVICE)
                .unwrap_or(defaults.payments_service),
            recheck_delay,
            product_name: env_non_empty(ENV_BILLING_PRODUCT_NAME).unwrap_or(defaults.product_name),
            methods_base_url,
            auth_token: env_non_empty(ENV_BILLING_AUTH_TOKEN),
        })
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
