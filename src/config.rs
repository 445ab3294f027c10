use std::time::Duration;

use anyhow::Context;
use log::LevelFilter;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://iot-simulator-api.vercel.app/api/sensors";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

pub const MIN_SENSOR: u32 = 1;
pub const MAX_SENSOR: u32 = 8;

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: Url,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub initial_sensor: u32,
    pub log_level: LevelFilter,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from `lookup`, treating blank values as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let raw_url = read("SENSOR_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let base_url = Url::parse(&raw_url)
            .with_context(|| format!("Invalid SENSOR_API_URL: {raw_url}"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            anyhow::bail!("SENSOR_API_URL must be http or https, got {}", base_url.scheme());
        }

        let poll_interval = read_secs(
            read("SENSOR_POLL_INTERVAL_SECS"),
            "SENSOR_POLL_INTERVAL_SECS",
            DEFAULT_POLL_INTERVAL_SECS,
        )?;
        let request_timeout = read_secs(
            read("SENSOR_REQUEST_TIMEOUT_SECS"),
            "SENSOR_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;

        let initial_sensor = match read("SENSOR_INITIAL_ID") {
            Some(v) => v
                .parse::<u32>()
                .with_context(|| format!("Invalid SENSOR_INITIAL_ID: {v}"))?,
            None => MIN_SENSOR,
        };
        if !(MIN_SENSOR..=MAX_SENSOR).contains(&initial_sensor) {
            anyhow::bail!(
                "SENSOR_INITIAL_ID must be between {MIN_SENSOR} and {MAX_SENSOR}, got {initial_sensor}"
            );
        }

        let log_level = match read("SENSOR_LOG_LEVEL") {
            Some(v) => v
                .parse::<LevelFilter>()
                .with_context(|| format!("Invalid SENSOR_LOG_LEVEL: {v}"))?,
            None => LevelFilter::Info,
        };

        Ok(Config {
            base_url,
            poll_interval,
            request_timeout,
            initial_sensor,
            log_level,
        })
    }
}

fn read_secs(value: Option<String>, key: &str, default: u64) -> Result<Duration, anyhow::Error> {
    let secs = match value {
        Some(v) => v
            .parse::<u64>()
            .with_context(|| format!("Invalid {key}: {v}"))?,
        None => default,
    };
    if secs == 0 {
        anyhow::bail!("{key} must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}
