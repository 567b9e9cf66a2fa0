//! Billing configuration.
//!
//! Configuration is loaded from environment variables with fallback to defaults.

use std::env;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use talentbill_core::Percentage;
use talentbill_observability::LogFormat;

/// Runtime settings for the billing core and its worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Invoice number prefix (`INV` → `INV-2025-00001`)
    pub invoice_prefix: String,

    /// Default days between issue and due date for manual invoices
    pub grace_days: u32,

    /// Processor fee taken from the agency commission
    pub processor_fee: Percentage,

    /// How often scheduled invoices are checked for activation
    pub activation_interval: Duration,

    /// How often past-due invoices are flagged
    pub overdue_interval: Duration,

    /// Scheduler wake-up interval
    pub poll_interval: Duration,

    /// Log output layout
    pub log_format: LogFormat,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            invoice_prefix: "INV".to_string(),
            grace_days: 5,
            processor_fee: Percentage::from_units(35_000),
            activation_interval: Duration::from_secs(3_600),
            overdue_interval: Duration::from_secs(86_400),
            poll_interval: Duration::from_millis(1_000),
            log_format: LogFormat::Json,
        }
    }
}

impl BillingConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup (environment, file, test map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let invalid = |key: &str| ConfigError::InvalidValue(key.to_string());

        let invoice_prefix = get("TALENTBILL_INVOICE_PREFIX", "INV").trim().to_string();
        if invoice_prefix.is_empty() || invoice_prefix.contains('-') {
            return Err(invalid("TALENTBILL_INVOICE_PREFIX"));
        }

        let config = BillingConfig {
            invoice_prefix,

            grace_days: get("TALENTBILL_GRACE_DAYS", "5")
                .parse()
                .map_err(|_| invalid("TALENTBILL_GRACE_DAYS"))?,

            processor_fee: get("TALENTBILL_PROCESSOR_FEE_PCT", "3.5")
                .parse::<Decimal>()
                .ok()
                .and_then(|d| Percentage::from_decimal(d).ok())
                .ok_or_else(|| invalid("TALENTBILL_PROCESSOR_FEE_PCT"))?,

            activation_interval: Duration::from_secs(
                get("TALENTBILL_ACTIVATION_INTERVAL_SECS", "3600")
                    .parse()
                    .map_err(|_| invalid("TALENTBILL_ACTIVATION_INTERVAL_SECS"))?,
            ),

            overdue_interval: Duration::from_secs(
                get("TALENTBILL_OVERDUE_INTERVAL_SECS", "86400")
                    .parse()
                    .map_err(|_| invalid("TALENTBILL_OVERDUE_INTERVAL_SECS"))?,
            ),

            poll_interval: Duration::from_millis(
                get("TALENTBILL_POLL_INTERVAL_MS", "1000")
                    .parse()
                    .map_err(|_| invalid("TALENTBILL_POLL_INTERVAL_MS"))?,
            ),

            log_format: get("TALENTBILL_LOG_FORMAT", "json")
                .parse()
                .map_err(|_| invalid("TALENTBILL_LOG_FORMAT"))?,
        };

        if config.activation_interval.is_zero() {
            return Err(invalid("TALENTBILL_ACTIVATION_INTERVAL_SECS"));
        }
        if config.overdue_interval.is_zero() {
            return Err(invalid("TALENTBILL_OVERDUE_INTERVAL_SECS"));
        }
        if config.poll_interval.is_zero() {
            return Err(invalid("TALENTBILL_POLL_INTERVAL_MS"));
        }

        Ok(config)
    }
}

/// Configuration error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}
