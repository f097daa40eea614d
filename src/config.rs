use std::{env, path::PathBuf, time::Duration};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Credentials, WINDOW_FLOOR_TIMESTAMP};

pub const DEFAULT_ENDPOINT: &str = "https://practicum.yandex.ru/api/user_api/homework_statuses/";
const DEFAULT_RETRY_SECS: u64 = 6;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOOKBACK_DAYS: i64 = 30;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Process configuration, read once at startup and passed by reference.
#[derive(Clone, Debug)]
pub struct Config {
    pub credentials: Credentials,
    pub endpoint: String,
    /// Fixed sleep between the end of one cycle and the start of the next.
    pub retry_time: Duration,
    pub request_timeout: Duration,
    pub lookback: chrono::Duration,
    pub log_dir: PathBuf,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            retry_time: Duration::from_secs(DEFAULT_RETRY_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            lookback: chrono::Duration::days(DEFAULT_LOOKBACK_DAYS),
            log_dir: PathBuf::from("."),
            log_level: DEFAULT_LOG_LEVEL.to_owned(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    ///
    /// Missing credentials load as empty strings; the poller's startup check
    /// is what turns them into a fatal condition.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let credentials = Credentials {
            practicum_token: var("PRACTICUM_TOKEN").unwrap_or_default(),
            telegram_token: var("TELEGRAM_TOKEN").unwrap_or_default(),
            telegram_chat_id: var("TELEGRAM_CHAT_ID").unwrap_or_default(),
        };

        let retry_time = match var("RETRY_TIME") {
            Some(raw) => Duration::from_secs(parse_number("RETRY_TIME", &raw)?),
            None => defaults.retry_time,
        };
        let request_timeout = match var("REQUEST_TIMEOUT") {
            Some(raw) => Duration::from_secs(parse_number("REQUEST_TIMEOUT", &raw)?),
            None => defaults.request_timeout,
        };
        let lookback = match var("LOOKBACK_DAYS") {
            Some(raw) => parse_lookback(parse_number("LOOKBACK_DAYS", &raw)?, Utc::now())?,
            None => defaults.lookback,
        };

        // RUST_LOG wins over LOG_LEVEL when both are present.
        let log_level = var("RUST_LOG")
            .or_else(|| var("LOG_LEVEL").map(|level| level.to_lowercase()))
            .unwrap_or(defaults.log_level);

        Ok(Self {
            credentials,
            endpoint: var("PRACTICUM_ENDPOINT").unwrap_or(defaults.endpoint),
            retry_time,
            request_timeout,
            lookback,
            log_dir: var("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
            log_level,
        })
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse::<T>().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: raw.to_owned(),
    })
}

/// A lookback must be positive and must not reach back past the window floor.
fn parse_lookback(days: i64, now: DateTime<Utc>) -> Result<chrono::Duration, ConfigError> {
    let out_of_range = ConfigError::LookbackOutOfRange { days };
    if days <= 0 {
        return Err(out_of_range);
    }
    let lookback = chrono::Duration::try_days(days).ok_or(out_of_range.clone())?;
    match now.checked_sub_signed(lookback) {
        Some(start) if start.timestamp() >= WINDOW_FLOOR_TIMESTAMP => Ok(lookback),
        _ => Err(out_of_range),
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a whole number, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("LOOKBACK_DAYS must be positive and reach no further back than 2019-02-12, got {days}")]
    LookbackOutOfRange { days: i64 },
}
