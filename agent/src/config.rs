//! Configuration management for the agent.

use crate::scheduler::SchedulerOptions;
use crate::sync::{RetryPolicy, SyncOptions};
use std::env;
use std::time::Duration;

/// Agent configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite connection URL of the local store
    pub database_url: String,
    /// Base URL of the remote REST endpoint
    pub remote_url: Option<String>,
    /// API key sent to the remote endpoint
    pub remote_key: Option<String>,
    /// Quiet window after the last local mutation before pushing
    pub debounce: Duration,
    /// Period of the background pull
    pub pull_interval: Duration,
    /// Per-call timeout for remote requests
    pub request_timeout: Duration,
    /// Attempts per remote call, first try included
    pub retry_attempts: u32,
    /// Upper bound on the best-effort push at shutdown
    pub shutdown_grace: Duration,
    /// Commit the checkpoint even when some kinds failed
    pub commit_on_partial_failure: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://sitesync.db".to_string(),
            remote_url: None,
            remote_key: None,
            debounce: Duration::from_millis(2000),
            pull_interval: Duration::from_secs(60),
            request_timeout: Duration::from_secs(15),
            retry_attempts: 3,
            shutdown_grace: Duration::from_secs(5),
            commit_on_partial_failure: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let database_url = get("SITESYNC_DATABASE_URL").unwrap_or(defaults.database_url);
        let remote_url = get("SITESYNC_REMOTE_URL");
        let remote_key = get("SITESYNC_REMOTE_KEY");

        let debounce = match get("SITESYNC_DEBOUNCE_MS") {
            Some(value) => Duration::from_millis(parse_number("SITESYNC_DEBOUNCE_MS", &value)?),
            None => defaults.debounce,
        };
        let pull_interval = parse_secs(
            "SITESYNC_PULL_INTERVAL_SECS",
            get("SITESYNC_PULL_INTERVAL_SECS"),
            defaults.pull_interval,
        )?;
        let request_timeout = parse_secs(
            "SITESYNC_REQUEST_TIMEOUT_SECS",
            get("SITESYNC_REQUEST_TIMEOUT_SECS"),
            defaults.request_timeout,
        )?;
        let shutdown_grace = parse_secs(
            "SITESYNC_SHUTDOWN_GRACE_SECS",
            get("SITESYNC_SHUTDOWN_GRACE_SECS"),
            defaults.shutdown_grace,
        )?;

        let retry_attempts = match get("SITESYNC_RETRY_ATTEMPTS") {
            Some(value) => {
                let attempts = parse_number("SITESYNC_RETRY_ATTEMPTS", &value)?;
                if attempts == 0 {
                    return Err(ConfigError::Zero("SITESYNC_RETRY_ATTEMPTS"));
                }
                u32::try_from(attempts).map_err(|_| ConfigError::InvalidNumber {
                    key: "SITESYNC_RETRY_ATTEMPTS",
                    value,
                })?
            }
            None => defaults.retry_attempts,
        };

        let commit_on_partial_failure = match get("SITESYNC_COMMIT_ON_PARTIAL_FAILURE") {
            Some(value) => parse_bool("SITESYNC_COMMIT_ON_PARTIAL_FAILURE", &value)?,
            None => defaults.commit_on_partial_failure,
        };

        Ok(Self {
            database_url,
            remote_url,
            remote_key,
            debounce,
            pull_interval,
            request_timeout,
            retry_attempts,
            shutdown_grace,
            commit_on_partial_failure,
        })
    }

    /// Remote endpoint and key, when both are set.
    pub fn remote(&self) -> Option<(&str, &str)> {
        match (&self.remote_url, &self.remote_key) {
            (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
            _ => None,
        }
    }

    /// Options for the sync runner.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            retry: RetryPolicy {
                attempts: self.retry_attempts,
                call_timeout: self.request_timeout,
                ..RetryPolicy::default()
            },
            commit_on_partial_failure: self.commit_on_partial_failure,
        }
    }

    /// Options for the scheduler.
    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            debounce: self.debounce,
            pull_interval: self.pull_interval,
            shutdown_grace: self.shutdown_grace,
        }
    }
}

fn parse_number(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidNumber {
        key,
        value: value.to_string(),
    })
}

fn parse_secs(
    key: &'static str,
    value: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => match parse_number(key, &value)? {
            0 => Err(ConfigError::Zero(key)),
            secs => Ok(Duration::from_secs(secs)),
        },
        None => Ok(default),
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: value.to_string(),
        }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid number for {key}: '{value}'")]
    InvalidNumber { key: &'static str, value: String },

    #[error("Invalid boolean for {key}: '{value}'")]
    InvalidBool { key: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}
