//! Configuration module for the Hue to InfluxDB bridge.
//!
//! All settings come from environment variables. The bridge credential and the
//! backend address are not validated here: an empty value surfaces later as a
//! bridge API error or a failed write.

use std::env;
use std::time::Duration;

use crate::forwarder::StatusCheck;
use crate::reader::ResourceScope;
use crate::retry::RetryPolicy;

/// Public Hue discovery endpoint
const DEFAULT_DISCOVERY_URL: &str = "https://discovery.meethue.com/";

/// Default poll interval (5 minutes)
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Minimum poll interval
const MIN_POLL_INTERVAL_SECS: u64 = 1;

/// Maximum poll interval (one day)
const MAX_POLL_INTERVAL_SECS: u64 = 86_400;

/// Default HTTP request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default ceiling on the time spent in one retry loop (15 minutes)
const DEFAULT_MAX_RETRY_ELAPSED_SECS: u64 = 900;

/// Configuration for the bridge service.
///
/// Environment variables:
/// - `HUE_API_KEY`: bridge API credential (required, not validated)
/// - `INFLUX_DB_ADDRESS`: full InfluxDB write URL (required, not validated)
/// - `HUE_DISCOVERY_URL`: discovery endpoint (default: https://discovery.meethue.com/)
/// - `HUE_POLL_INTERVAL_SECS`: seconds between poll cycles (default: 300)
/// - `HUE_RESOURCE_SCOPE`: `all` or `sensors` (default: all)
/// - `HUE_REQUEST_TIMEOUT_SECS`: HTTP request timeout (default: 30)
/// - `HUE_MAX_RETRIES`: retry cap for discovery and forwarding (default: unset, elapsed ceiling only)
/// - `HUE_MAX_RETRY_ELAPSED_SECS`: retry loop time ceiling (default: 900)
/// - `INFLUX_CHECK_STATUS`: reject non-2xx backend responses (default: false)
/// - `HUE_REDISCOVERY_CYCLES`: re-run discovery every N cycles, 0 = never (default: 0)
#[derive(Debug, Clone)]
pub struct Config {
    /// Hue bridge API key (the "username" in Hue API terms)
    pub api_key: String,

    /// InfluxDB write endpoint, including any query string (db, precision, auth)
    pub influx_address: String,

    /// Bridge discovery endpoint
    pub discovery_url: String,

    /// Time between poll cycles
    pub poll_interval: Duration,

    /// Which bridge resource endpoint to read sensors from
    pub resource_scope: ResourceScope,

    /// HTTP request timeout duration
    pub request_timeout: Duration,

    /// Retry cap for discovery and forwarding, `None` retries until the
    /// elapsed ceiling
    pub max_retries: Option<u32>,

    /// Upper bound on the time one retry loop may take
    pub max_retry_elapsed: Duration,

    /// How backend HTTP status codes are interpreted
    pub status_check: StatusCheck,

    /// Re-run discovery every N poll cycles (None = discover once)
    pub rediscovery_cycles: Option<u32>,
}

/// Error type for configuration loading failures
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "Configuration error for {}: {}", var, self.message),
            None => write!(f, "Configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    fn for_var(env_var: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            env_var: Some(env_var.to_string()),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an optional setting is present but malformed
    /// or out of range.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use hue_influx_bridge::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Polling every {:?}", config.poll_interval);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = env::var("HUE_API_KEY").unwrap_or_default();
        let influx_address = env::var("INFLUX_DB_ADDRESS").unwrap_or_default();

        let discovery_url = env::var("HUE_DISCOVERY_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DISCOVERY_URL.to_string());

        let poll_interval = Duration::from_secs(Self::parse_poll_interval()?);

        let resource_scope = match env::var("HUE_RESOURCE_SCOPE") {
            Ok(value) => value
                .parse::<ResourceScope>()
                .map_err(|e| ConfigError::for_var("HUE_RESOURCE_SCOPE", e))?,
            Err(_) => ResourceScope::default(),
        };

        let request_timeout = Duration::from_secs(parse_number(
            "HUE_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);
        if request_timeout.is_zero() {
            return Err(ConfigError::for_var(
                "HUE_REQUEST_TIMEOUT_SECS",
                "timeout must be greater than 0",
            ));
        }

        let max_retries = match env::var("HUE_MAX_RETRIES") {
            Ok(value) if !value.trim().is_empty() => Some(parse_number("HUE_MAX_RETRIES", 0)?),
            _ => None,
        };

        let max_retry_elapsed = Duration::from_secs(parse_number(
            "HUE_MAX_RETRY_ELAPSED_SECS",
            DEFAULT_MAX_RETRY_ELAPSED_SECS,
        )?);

        let status_check = if parse_bool("INFLUX_CHECK_STATUS", false)? {
            StatusCheck::Enforce
        } else {
            StatusCheck::Ignore
        };

        let rediscovery_cycles = match parse_number::<u32>("HUE_REDISCOVERY_CYCLES", 0)? {
            0 => None,
            n => Some(n),
        };

        Ok(Self {
            api_key,
            influx_address,
            discovery_url,
            poll_interval,
            resource_scope,
            request_timeout,
            max_retries,
            max_retry_elapsed,
            status_check,
            rediscovery_cycles,
        })
    }

    /// Parse poll interval from environment variable with validation.
    fn parse_poll_interval() -> Result<u64, ConfigError> {
        let env_var = "HUE_POLL_INTERVAL_SECS";
        let interval = parse_number(env_var, DEFAULT_POLL_INTERVAL_SECS)?;

        if interval < MIN_POLL_INTERVAL_SECS {
            return Err(ConfigError::for_var(
                env_var,
                format!(
                    "poll interval {} is below minimum ({}s)",
                    interval, MIN_POLL_INTERVAL_SECS
                ),
            ));
        }

        if interval > MAX_POLL_INTERVAL_SECS {
            return Err(ConfigError::for_var(
                env_var,
                format!(
                    "poll interval {} exceeds maximum ({}s)",
                    interval, MAX_POLL_INTERVAL_SECS
                ),
            ));
        }

        Ok(interval)
    }

    /// Retry policy shared by discovery and forwarding.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            max_elapsed: self.max_retry_elapsed,
            ..RetryPolicy::default()
        }
    }
}

fn parse_number<T: std::str::FromStr>(env_var: &str, default: T) -> Result<T, ConfigError> {
    match env::var(env_var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::for_var(env_var, format!("'{}' is not a valid number", value))),
        Err(_) => Ok(default),
    }
}

fn parse_bool(env_var: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(env_var) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::for_var(
                env_var,
                format!("'{}' is not a valid boolean", value),
            )),
        },
        Err(_) => Ok(default),
    }
}

impl Default for Config {
    /// Create a default configuration using default values.
    ///
    /// This is useful for testing or when environment variables are not set.
    fn default() -> Self {
        Self {
            api_key: String::new(),
            influx_address: String::new(),
            discovery_url: DEFAULT_DISCOVERY_URL.to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            resource_scope: ResourceScope::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_retries: None,
            max_retry_elapsed: Duration::from_secs(DEFAULT_MAX_RETRY_ELAPSED_SECS),
            status_check: StatusCheck::Ignore,
            rediscovery_cycles: None,
        }
    }
}
