//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use crate::payments::types::ProviderName;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PAYPLUG_SCRIPT_URL: &str = "https://api.payplug.com/js/1/form.latest.js";

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub order_api: OrderApiConfig,
    pub poller: PollerConfig,
    pub provider: ProviderConfig,
    pub logging: LoggingConfig,
}

/// Order API configuration
#[derive(Debug, Clone)]
pub struct OrderApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Confirmation polling configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_ticks: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_ticks: 30,
        }
    }
}

/// Payment provider configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub payplug_script_url: String,
    pub script_timeout_secs: u64,
    pub enabled_providers: Vec<ProviderName>,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            order_api: OrderApiConfig::from_env()?,
            poller: PollerConfig::from_env()?,
            provider: ProviderConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.order_api.validate()?;
        self.poller.validate()?;
        self.provider.validate()?;
        self.logging.validate()?;

        Ok(())
    }
}

impl OrderApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(OrderApiConfig {
            base_url: env::var("ORDER_API_BASE_URL")
                .map_err(|_| ConfigError::MissingVariable("ORDER_API_BASE_URL".to_string()))?,
            token: env::var("ORDER_API_TOKEN").ok().filter(|t| !t.is_empty()),
            timeout_secs: env::var("ORDER_API_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("ORDER_API_TIMEOUT_SECS".to_string()))?,
            max_retries: env::var("ORDER_API_MAX_RETRIES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("ORDER_API_MAX_RETRIES".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "ORDER_API_BASE_URL must be a valid URL".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "ORDER_API_TIMEOUT_SECS".to_string(),
            ));
        }

        Ok(())
    }
}

impl PollerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(PollerConfig {
            interval: match env::var("PAYMENT_POLL_INTERVAL_MS") {
                Ok(raw) => Duration::from_millis(raw.parse().map_err(|_| {
                    ConfigError::InvalidValue("PAYMENT_POLL_INTERVAL_MS".to_string())
                })?),
                Err(_) => defaults.interval,
            },
            max_ticks: match env::var("PAYMENT_POLL_MAX_TICKS") {
                Ok(raw) => raw.parse()?,
                Err(_) => defaults.max_ticks,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "PAYMENT_POLL_INTERVAL_MS cannot be 0".to_string(),
            ));
        }

        if self.max_ticks == 0 {
            return Err(ConfigError::InvalidValue(
                "PAYMENT_POLL_MAX_TICKS cannot be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Upper bound on the time spent waiting for confirmation.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_ticks
    }
}

impl ProviderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let enabled_raw = env::var("ENABLED_PAYMENT_PROVIDERS")
            .unwrap_or_else(|_| "payplug,dummy".to_string());
        let mut enabled_providers = Vec::new();
        for part in enabled_raw.split(',') {
            let value = part.trim();
            if value.is_empty() {
                continue;
            }
            let provider = ProviderName::from_str(value).map_err(|_| {
                ConfigError::InvalidValue(format!("ENABLED_PAYMENT_PROVIDERS: {}", value))
            })?;
            if !enabled_providers.contains(&provider) {
                enabled_providers.push(provider);
            }
        }

        Ok(ProviderConfig {
            payplug_script_url: env::var("PAYPLUG_SCRIPT_URL")
                .unwrap_or_else(|_| DEFAULT_PAYPLUG_SCRIPT_URL.to_string()),
            script_timeout_secs: env::var("PAYPLUG_SCRIPT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("PAYPLUG_SCRIPT_TIMEOUT_SECS".to_string())
                })?,
            enabled_providers,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled_providers.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one payment provider must be enabled".to_string(),
            ));
        }

        if self.enabled_providers.contains(&ProviderName::Payplug)
            && !self.payplug_script_url.starts_with("https://")
            && !self.payplug_script_url.starts_with("http://")
        {
            return Err(ConfigError::InvalidValue(
                "PAYPLUG_SCRIPT_URL must be a valid URL".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

impl From<std::num::ParseIntError> for ConfigError {
    fn from(_: std::num::ParseIntError) -> Self {
        ConfigError::InvalidValue("Failed to parse integer value".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_api_config_validation() {
        let config = OrderApiConfig {
            base_url: "https://lms.example/api/v1.0".to_string(),
            token: None,
            timeout_secs: 15,
            max_retries: 2,
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_base_url_validation() {
        let config = OrderApiConfig {
            base_url: "lms.example".to_string(),
            token: None,
            timeout_secs: 15,
            max_retries: 2,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_poll_budget() {
        let config = PollerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.budget(), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_ticks_rejected() {
        let config = PollerConfig {
            interval: Duration::from_secs(1),
            max_ticks: 0,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_no_provider_rejected() {
        let config = ProviderConfig {
            payplug_script_url: DEFAULT_PAYPLUG_SCRIPT_URL.to_string(),
            script_timeout_secs: 10,
            enabled_providers: vec![],
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_validation() {
        let config = LoggingConfig {
            level: "verbose".to_string(),
            format: LogFormat::Plain,
        };

        assert!(config.validate().is_err());
    }
}
