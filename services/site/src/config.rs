//! services/site/src/config.rs
//!
//! Defines the service's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub allowed_origin: String,
    /// Adds `Secure` to visitor cookies. Off by default for a plain-http origin.
    pub cookie_secure: bool,
    /// Where analytics events are POSTed. `None` disables tracking entirely.
    pub analytics_endpoint: Option<String>,
    pub analytics_batch_size: usize,
    pub analytics_flush_interval: Duration,
    /// Base URL of the admin API (contact leads, campaign banners).
    pub api_base: String,
    /// The managed function that receives quick lead-form submissions.
    pub lead_endpoint: Option<String>,
    pub lead_api_key: Option<String>,
    /// JSON file standing in for browser local storage and cookies.
    pub storage_path: PathBuf,
    pub ga_measurement_id: Option<String>,
    pub meta_pixel_id: Option<String>,
    /// Countdown end used when the banner backend cannot be reached.
    pub countdown_fallback_end: Option<DateTime<Utc>>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Server Settings ---
        let bind_address = parse_var("BIND_ADDRESS", "0.0.0.0:3000")?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let allowed_origin = std::env::var("ALLOWED_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());
        let cookie_secure = match optional_var("COOKIE_SECURE") {
            Some(raw) => raw.parse::<bool>().map_err(|e| {
                ConfigError::InvalidValue("COOKIE_SECURE".to_string(), e.to_string())
            })?,
            None => !allowed_origin.starts_with("http://"),
        };

        // --- Analytics Settings ---
        let analytics_endpoint = optional_var("ANALYTICS_ENDPOINT");
        let analytics_batch_size: usize = parse_var("ANALYTICS_BATCH_SIZE", "10")?;
        if analytics_batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "ANALYTICS_BATCH_SIZE".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let flush_secs: u64 = parse_var("ANALYTICS_FLUSH_INTERVAL_SECS", "30")?;

        // --- Backend Endpoints ---
        let api_base = std::env::var("API_BASE")
            .map(|base| base.trim_end_matches('/').to_string())
            .map_err(|_| ConfigError::MissingVar("API_BASE".to_string()))?;
        let lead_endpoint = optional_var("LEAD_ENDPOINT");
        let lead_api_key = optional_var("LEAD_API_KEY");

        let storage_path = std::env::var("STORAGE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/site-storage.json"));

        // --- Third-party Tags ---
        let ga_measurement_id = optional_var("GA_MEASUREMENT_ID");
        let meta_pixel_id = optional_var("META_PIXEL_ID");

        let countdown_fallback_end = optional_var("COUNTDOWN_FALLBACK_END")
            .map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|end| end.with_timezone(&Utc))
                    .map_err(|e| {
                        ConfigError::InvalidValue("COUNTDOWN_FALLBACK_END".to_string(), e.to_string())
                    })
            })
            .transpose()?;

        Ok(Self {
            bind_address,
            log_level,
            allowed_origin,
            cookie_secure,
            analytics_endpoint,
            analytics_batch_size,
            analytics_flush_interval: Duration::from_secs(flush_secs.max(1)),
            api_base,
            lead_endpoint,
            lead_api_key,
            storage_path,
            ga_measurement_id,
            meta_pixel_id,
            countdown_fallback_end,
        })
    }
}

/// Reads a variable, treating an empty value like an unset one.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}
