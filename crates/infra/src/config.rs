//! Invoice pipeline configuration.
//!
//! Built once from the environment and passed explicitly to every component;
//! nothing reads process-wide state after startup.

use std::time::Duration;

use thiserror::Error;

use billseq_invoicing::backoff::{DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};
use billseq_invoicing::fault::DEFAULT_FAILURE_RATE;
use billseq_invoicing::{BackoffPolicy, FailureInjector};

pub const ENV_APP_ENV: &str = "APP_ENV";
pub const ENV_FAILURE_RATE: &str = "INVOICE_FAILURE_RATE";
pub const ENV_SIMULATE_FAILURES: &str = "INVOICE_SIMULATE_FAILURES";
pub const ENV_BASE_BACKOFF: &str = "INVOICE_BASE_BACKOFF";
pub const ENV_MAX_BACKOFF: &str = "INVOICE_MAX_BACKOFF";
pub const ENV_RETRY_INTERVAL: &str = "INVOICE_RETRY_INTERVAL_SECS";
pub const ENV_SWEEP_BATCH_SIZE: &str = "INVOICE_SWEEP_BATCH_SIZE";

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_SWEEP_BATCH_SIZE: usize = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    Development,
    Production,
}

impl DeploymentMode {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(v) if v.eq_ignore_ascii_case("production") => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

/// Settings for numbering, retries, failure injection and the sweep.
///
/// Plain values; [`InvoiceConfig::from_lookup`] validates them, and the
/// runtime policies are derived through [`backoff`](Self::backoff) and
/// [`failure_injector`](Self::failure_injector).
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceConfig {
    pub mode: DeploymentMode,
    /// Probability (0..=1) that an injected failure fires.
    pub failure_rate: f64,
    pub simulate_failures: bool,
    pub base_backoff_delay: Duration,
    pub max_backoff_delay: Duration,
    /// Sweep cadence.
    pub retry_interval: Duration,
    pub sweep_batch_size: usize,
}

impl Default for InvoiceConfig {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::Development,
            failure_rate: DEFAULT_FAILURE_RATE,
            simulate_failures: false,
            base_backoff_delay: DEFAULT_BASE_DELAY,
            max_backoff_delay: DEFAULT_MAX_DELAY,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
        }
    }
}

impl InvoiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mode = DeploymentMode::parse(get(ENV_APP_ENV).as_deref());

        let failure_rate = match get(ENV_FAILURE_RATE) {
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .map_err(|e| ConfigError::invalid(ENV_FAILURE_RATE, e.to_string()))?,
            None => DEFAULT_FAILURE_RATE,
        };

        let simulate_failures = match get(ENV_SIMULATE_FAILURES) {
            Some(raw) => parse_bool(ENV_SIMULATE_FAILURES, &raw)?,
            None => !mode.is_production(),
        };

        let retry_interval = match get(ENV_RETRY_INTERVAL) {
            Some(raw) => Duration::from_secs(parse_positive(ENV_RETRY_INTERVAL, &raw)?),
            None => DEFAULT_RETRY_INTERVAL,
        };

        let sweep_batch_size = match get(ENV_SWEEP_BATCH_SIZE) {
            Some(raw) => parse_positive(ENV_SWEEP_BATCH_SIZE, &raw)?
                .try_into()
                .map_err(|_| ConfigError::invalid(ENV_SWEEP_BATCH_SIZE, "too large"))?,
            None => DEFAULT_SWEEP_BATCH_SIZE,
        };

        let config = Self {
            mode,
            failure_rate,
            simulate_failures,
            base_backoff_delay: duration_ms(
                ENV_BASE_BACKOFF,
                get(ENV_BASE_BACKOFF),
                DEFAULT_BASE_DELAY,
            )?,
            max_backoff_delay: duration_ms(
                ENV_MAX_BACKOFF,
                get(ENV_MAX_BACKOFF),
                DEFAULT_MAX_DELAY,
            )?,
            retry_interval,
            sweep_batch_size,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field rules; errors name the environment key at fault.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulate_failures && self.mode.is_production() {
            return Err(ConfigError::invalid(
                ENV_SIMULATE_FAILURES,
                "failure simulation cannot be enabled in production",
            ));
        }
        FailureInjector::new(self.failure_rate, self.simulate_failures)
            .map_err(|e| ConfigError::invalid(ENV_FAILURE_RATE, e.to_string()))?;
        if self.base_backoff_delay.is_zero() {
            return Err(ConfigError::invalid(ENV_BASE_BACKOFF, "must be > 0"));
        }
        BackoffPolicy::new(self.base_backoff_delay, self.max_backoff_delay)
            .map_err(|e| ConfigError::invalid(ENV_MAX_BACKOFF, e.to_string()))?;
        if self.retry_interval.is_zero() {
            return Err(ConfigError::invalid(ENV_RETRY_INTERVAL, "must be > 0"));
        }
        if self.sweep_batch_size == 0 {
            return Err(ConfigError::invalid(ENV_SWEEP_BATCH_SIZE, "must be > 0"));
        }
        Ok(())
    }

    /// Exponential backoff from `base_backoff_delay` capped at `max_backoff_delay`.
    ///
    /// Out-of-range values in a hand-built config are clamped: base to at
    /// least 1 ms, cap to at least base.
    pub fn backoff(&self) -> BackoffPolicy {
        let base = self.base_backoff_delay.max(Duration::from_millis(1));
        let cap = self.max_backoff_delay.max(base);
        BackoffPolicy::new(base, cap).unwrap_or_default()
    }

    /// Injector armed when `simulate_failures` is set. A rate outside
    /// `0..=1` is clamped; NaN disables injection.
    pub fn failure_injector(&self) -> FailureInjector {
        if self.failure_rate.is_nan() {
            return FailureInjector::disabled();
        }
        FailureInjector::new(self.failure_rate.clamp(0.0, 1.0), self.simulate_failures)
            .unwrap_or_else(|_| FailureInjector::disabled())
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::invalid(key, format!("expected a boolean, got '{other}'"))),
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    let value = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::invalid(key, e.to_string()))?;
    if value == 0 {
        return Err(ConfigError::invalid(key, "must be > 0"));
    }
    Ok(value)
}

fn duration_ms(
    key: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match raw {
        Some(raw) => Ok(Duration::from_millis(parse_positive(key, &raw)?)),
        None => Ok(default),
    }
}
