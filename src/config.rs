//! Runtime configuration from environment variables.

use std::time::Duration;

use crate::client::{ApiSessionBuilder, DEFAULT_TIMEOUT};
use crate::logger::MessageLogMode;
use crate::protocol::{DEFAULT_HOST, DEFAULT_LANG};
use crate::scheduler::SchedulerConfig;
use crate::{Error, Result};

/// Upper bound for any configured duration.
const MAX_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub email: String,
    /// Clear-text password. Optional when a persisted token is supplied.
    pub password: Option<String>,
    pub token: Option<String>,
    pub host: String,
    pub lang: String,
    pub timeout: Duration,
    pub scheduler: SchedulerConfig,
    /// Where to append the NDJSON message log, if anywhere.
    pub message_log: Option<(MessageLogMode, String)>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let email = var("CLEVERTOUCH_EMAIL")
            .ok_or_else(|| Error::Config("CLEVERTOUCH_EMAIL is not set".to_string()))?;
        let password = var("CLEVERTOUCH_PASSWORD");
        let token = var("CLEVERTOUCH_TOKEN");
        if password.is_none() && token.is_none() {
            return Err(Error::Config(
                "missing credentials: set CLEVERTOUCH_PASSWORD or CLEVERTOUCH_TOKEN".to_string(),
            ));
        }

        let secs = |key: &str, default: Duration| -> Result<Duration> {
            let Some(v) = var(key) else {
                return Ok(default);
            };
            let secs = v
                .parse::<u64>()
                .map_err(|_| Error::Config(format!("{key} must be a whole number of seconds, got {v:?}")))?;
            if secs > MAX_DURATION_SECS {
                return Err(Error::Config(format!(
                    "{key} must be at most {MAX_DURATION_SECS} seconds, got {secs}"
                )));
            }
            Ok(Duration::from_secs(secs))
        };

        let defaults = SchedulerConfig::default();
        let quick_count = match var("CLEVERTOUCH_QUICK_COUNT") {
            Some(v) => v
                .parse::<u32>()
                .map_err(|_| Error::Config(format!("CLEVERTOUCH_QUICK_COUNT must be a number, got {v:?}")))?,
            None => defaults.quick_count,
        };
        let scheduler = SchedulerConfig {
            standard_interval: secs("CLEVERTOUCH_SCAN_INTERVAL_SECS", defaults.standard_interval)?,
            quick_interval: secs("CLEVERTOUCH_QUICK_INTERVAL_SECS", defaults.quick_interval)?,
            quick_count,
            min_backoff: secs("CLEVERTOUCH_MIN_BACKOFF_SECS", defaults.min_backoff)?,
            max_backoff: secs("CLEVERTOUCH_MAX_BACKOFF_SECS", defaults.max_backoff)?,
        };

        let message_log = match var("CLEVERTOUCH_MESSAGE_LOG") {
            Some(path) => {
                let mode = match var("CLEVERTOUCH_MESSAGE_LOG_MODE").as_deref() {
                    None | Some("full") => MessageLogMode::Full,
                    Some("diffed") => MessageLogMode::Diffed,
                    Some(other) => {
                        return Err(Error::Config(format!(
                            "CLEVERTOUCH_MESSAGE_LOG_MODE must be full or diffed, got {other:?}"
                        )));
                    }
                };
                Some((mode, path))
            }
            None => None,
        };

        Ok(Config {
            email,
            password,
            token,
            host: var("CLEVERTOUCH_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            lang: var("CLEVERTOUCH_LANG").unwrap_or_else(|| DEFAULT_LANG.to_string()),
            timeout: secs("CLEVERTOUCH_TIMEOUT_SECS", DEFAULT_TIMEOUT)?,
            scheduler,
            message_log,
        })
    }

    /// Session builder preloaded with these settings.
    pub fn session_builder(&self) -> ApiSessionBuilder {
        let mut builder = ApiSessionBuilder::new(&self.email)
            .host(&self.host)
            .lang(&self.lang)
            .timeout(self.timeout);
        if let Some(token) = &self.token {
            builder = builder.token(token);
        }
        if let Some((mode, path)) = &self.message_log {
            builder = builder.message_log(*mode, path);
        }
        builder
    }
}
