//! Environment-driven function configuration.
//!
//! Credentials never live here; they come from the secret bundle.

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::dispatch::DEFAULT_HANDLER_TIMEOUT;
use crate::secrets::DEFAULT_SECRET_FETCH_TIMEOUT;

pub const DEFAULT_SECRET_ID: &str = "nooktrip-secrets-dev";
pub const DEFAULT_MAIL_SENDER: &str = "no-reply@nooktrip.app";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a positive number of milliseconds, got '{value}'")]
    InvalidDuration { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaConfig {
    /// Secrets Manager secret id (`SECRET_ID_NAME`).
    pub secret_id: String,
    pub secret_fetch_timeout: Duration,
    pub handler_timeout: Duration,
    /// Value for `Access-Control-Allow-Origin`, when CORS is enabled.
    pub cors_allow_origin: Option<String>,
    /// Public asset base URL echoed in itinerary responses.
    pub assets_location: Option<String>,
    pub mail_sender: String,
    /// Mail API endpoint. Unset selects the dry-run transport.
    pub mail_api_url: Option<String>,
}

impl Default for LambdaConfig {
    fn default() -> Self {
        Self {
            secret_id: DEFAULT_SECRET_ID.to_string(),
            secret_fetch_timeout: DEFAULT_SECRET_FETCH_TIMEOUT,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            cors_allow_origin: None,
            assets_location: None,
            mail_sender: DEFAULT_MAIL_SENDER.to_string(),
            mail_api_url: None,
        }
    }
}

impl LambdaConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            secret_id: get("SECRET_ID_NAME").unwrap_or(defaults.secret_id),
            secret_fetch_timeout: millis(
                "SECRET_FETCH_TIMEOUT_MS",
                get("SECRET_FETCH_TIMEOUT_MS"),
                defaults.secret_fetch_timeout,
            )?,
            handler_timeout: millis(
                "HANDLER_TIMEOUT_MS",
                get("HANDLER_TIMEOUT_MS"),
                defaults.handler_timeout,
            )?,
            cors_allow_origin: get("CORS_ALLOW_ORIGIN"),
            assets_location: get("ASSETS_LOCATION"),
            mail_sender: get("MAIL_SENDER").unwrap_or(defaults.mail_sender),
            mail_api_url: get("MAIL_API_URL"),
        })
    }
}

fn millis(
    name: &'static str,
    value: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => match value.parse::<u64>() {
            Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
            _ => Err(ConfigError::InvalidDuration { name, value }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<LambdaConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LambdaConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, LambdaConfig::default());
        assert_eq!(config.secret_id, "nooktrip-secrets-dev");
        assert_eq!(config.handler_timeout, Duration::from_secs(10));
        assert!(config.mail_api_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("SECRET_ID_NAME", "nooktrip-secrets-prod"),
            ("HANDLER_TIMEOUT_MS", "2500"),
            ("CORS_ALLOW_ORIGIN", "https://nooktrip.app"),
            ("MAIL_API_URL", "https://mail.example.com/v1/send"),
            ("ASSETS_LOCATION", ""),
        ])
        .unwrap();

        assert_eq!(config.secret_id, "nooktrip-secrets-prod");
        assert_eq!(config.handler_timeout, Duration::from_millis(2500));
        assert_eq!(config.cors_allow_origin.as_deref(), Some("https://nooktrip.app"));
        assert!(config.assets_location.is_none(), "empty counts as unset");
    }

    #[test]
    fn test_invalid_duration() {
        for bad in ["0", "-5", "soon"] {
            let err = config_from(&[("SECRET_FETCH_TIMEOUT_MS", bad)]).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidDuration { name: "SECRET_FETCH_TIMEOUT_MS", .. }
            ));
        }
    }
}
