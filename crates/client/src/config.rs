use std::str::FromStr;
use std::time::Duration;

use crate::dispatcher::DispatcherConfig;
use crate::poller::DEFAULT_POLL_INTERVAL;
use crate::retry::RetryConfig;

/// Default backend base URL for local development.
const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development against a
/// backend on `localhost:8000`. Override via environment variables (or a
/// `.env` file loaded by the binary).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL.
    pub api_url: String,
    /// Bearer token for authenticated calls, if any.
    pub api_token: Option<String>,
    /// HTTP request timeout.
    pub request_timeout: Duration,
    pub dispatcher: DispatcherConfig,
    pub retry: RetryConfig,
    /// Cadence of the history poll while runs are active.
    pub poll_interval: Duration,
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                     |
    /// |---------------------------|-----------------------------|
    /// | `QPADM_API_URL`           | `http://localhost:8000/api` |
    /// | `QPADM_API_TOKEN`         | unset                       |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                        |
    /// | `DISPATCH_MAX_CONCURRENT` | `2`                         |
    /// | `DISPATCH_MIN_DELAY_MS`   | `400`                       |
    /// | `RETRY_MAX_RETRIES`       | `4`                         |
    /// | `RETRY_BASE_DELAY_MS`     | `1000`                      |
    /// | `POLL_INTERVAL_SECS`      | `10`                        |
    ///
    /// Unparseable values, and a zero poll interval, fall back to the
    /// default with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let dispatcher_defaults = DispatcherConfig::default();
        let retry_defaults = RetryConfig::default();

        let api_url = lookup("QPADM_API_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.into());

        let api_token = lookup("QPADM_API_TOKEN").filter(|v| !v.trim().is_empty());

        let request_timeout =
            Duration::from_secs(parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30u64));

        let dispatcher = DispatcherConfig {
            max_concurrent: parse_or(
                &lookup,
                "DISPATCH_MAX_CONCURRENT",
                dispatcher_defaults.max_concurrent,
            ),
            min_delay: Duration::from_millis(parse_or(
                &lookup,
                "DISPATCH_MIN_DELAY_MS",
                dispatcher_defaults.min_delay.as_millis() as u64,
            )),
        };

        let retry = RetryConfig {
            max_retries: parse_or(&lookup, "RETRY_MAX_RETRIES", retry_defaults.max_retries),
            base_delay: Duration::from_millis(parse_or(
                &lookup,
                "RETRY_BASE_DELAY_MS",
                retry_defaults.base_delay.as_millis() as u64,
            )),
            ..retry_defaults
        };

        let poll_secs = parse_or(
            &lookup,
            "POLL_INTERVAL_SECS",
            DEFAULT_POLL_INTERVAL.as_secs(),
        );
        let poll_interval = match poll_secs {
            0 => {
                tracing::warn!(
                    key = "POLL_INTERVAL_SECS",
                    default = DEFAULT_POLL_INTERVAL.as_secs(),
                    "Poll interval must be positive, using default",
                );
                DEFAULT_POLL_INTERVAL
            }
            secs => Duration::from_secs(secs),
        };

        Self {
            api_url,
            api_token,
            request_timeout,
            dispatcher,
            retry,
            poll_interval,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = %default, "Invalid config value, using default");
            default
        }),
    }
}
