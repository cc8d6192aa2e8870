//! services/monitor/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use chrono::{FixedOffset, Weekday};
use paper_watch_core::domain::UserId;
use paper_watch_core::gate::GateConfig;
use paper_watch_core::scheduler::SchedulerConfig;
use paper_watch_core::search_session::DEFAULT_PAGE_SIZE;
use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
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
    pub database_url: String,
    pub log_level: Level,
    pub cors_origin: String,
    pub telegram_bot_token: String,
    pub telegram_api_url: String,
    pub openai_api_key: String,
    pub openai_base_url: Option<String>,
    pub summary_model: String,
    pub summary_language: String,
    pub telegraph_api_url: String,
    pub telegraph_access_token: Option<String>,
    pub telegraph_short_name: String,
    pub arxiv_api_url: String,
    /// Five-field cron expression for the pass runner.
    pub check_schedule: String,
    pub gate: GateConfig,
    pub scheduler: SchedulerConfig,
    pub search_page_size: usize,
    /// Users allowed to trigger manual passes. Empty disables the endpoint.
    pub admin_user_ids: Vec<UserId>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
        };

        // --- Server, Database and Logging ---
        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = var_or("DATABASE_URL", "sqlite://paper_watch.db");

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:3000");

        // --- Providers ---
        let telegram_bot_token = required("TELEGRAM_BOT_TOKEN")?;
        let telegram_api_url = var_or("TELEGRAM_API_URL", "https://api.telegram.org");

        let openai_api_key = required("OPENAI_API_KEY")?;
        let openai_base_url = lookup("OPENAI_BASE_URL").filter(|v| !v.trim().is_empty());
        let summary_model = var_or("SUMMARY_MODEL", "gpt-4o-mini");
        let summary_language = var_or("SUMMARY_LANGUAGE", "Russian");

        let telegraph_api_url = var_or("TELEGRAPH_API_URL", "https://api.telegra.ph");
        let telegraph_access_token =
            lookup("TELEGRAPH_ACCESS_TOKEN").filter(|v| !v.trim().is_empty());
        let telegraph_short_name = var_or("TELEGRAPH_SHORT_NAME", "ArXivBot");

        let arxiv_api_url = var_or("ARXIV_API_URL", "http://export.arxiv.org/api/query");

        // --- Check Policy ---
        let check_schedule = var_or("CHECK_SCHEDULE", "0 * * * *");

        let gate_defaults = GateConfig::default();
        let no_update_weekdays = match lookup("NO_UPDATE_WEEKDAYS") {
            Some(raw) => parse_weekdays(&raw)
                .map_err(|e| ConfigError::InvalidValue("NO_UPDATE_WEEKDAYS".to_string(), e))?,
            None => gate_defaults.no_update_weekdays,
        };
        let update_hour = parse_number(&lookup, "UPDATE_HOUR", gate_defaults.update_hour)?;
        if update_hour > 23 {
            return Err(ConfigError::InvalidValue(
                "UPDATE_HOUR".to_string(),
                format!("{} is not an hour of the day", update_hour),
            ));
        }
        let offset_hours: i32 = parse_number(
            &lookup,
            "SOURCE_UTC_OFFSET_HOURS",
            gate_defaults.utc_offset.local_minus_utc() / 3600,
        )?;
        let utc_offset = offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
            ConfigError::InvalidValue(
                "SOURCE_UTC_OFFSET_HOURS".to_string(),
                format!("{} is out of range", offset_hours),
            )
        })?;

        let scheduler_defaults = SchedulerConfig::default();
        let scheduler = SchedulerConfig {
            candidate_batch: parse_positive(&lookup, "CANDIDATE_BATCH", scheduler_defaults.candidate_batch)?,
            delivery_cap: parse_positive(&lookup, "DELIVERY_CAP", scheduler_defaults.delivery_cap)?,
        };
        let search_page_size = parse_positive(&lookup, "SEARCH_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;

        let admin_user_ids = match lookup("ADMIN_USER_IDS") {
            Some(raw) => parse_user_ids(&raw)
                .map_err(|e| ConfigError::InvalidValue("ADMIN_USER_IDS".to_string(), e))?,
            None => Vec::new(),
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            telegram_bot_token,
            telegram_api_url,
            openai_api_key,
            openai_base_url,
            summary_model,
            summary_language,
            telegraph_api_url,
            telegraph_access_token,
            telegraph_short_name,
            arxiv_api_url,
            check_schedule,
            gate: GateConfig {
                no_update_weekdays,
                update_hour,
                utc_offset,
            },
            scheduler,
            search_page_size,
            admin_user_ids,
        })
    }
}

fn parse_number<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(name.to_string(), format!("'{}' is not a number", raw))
        }),
        None => Ok(default),
    }
}

fn parse_positive<F>(lookup: &F, name: &str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_number(lookup, name, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}

/// Parses a comma separated weekday list such as `fri,sat`. Empty means none.
fn parse_weekdays(raw: &str) -> Result<Vec<Weekday>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Weekday>()
                .map_err(|_| format!("'{}' is not a weekday", s))
        })
        .collect()
}

/// Parses a comma separated list of chat ids.
fn parse_user_ids(raw: &str) -> Result<Vec<UserId>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<UserId>()
                .map_err(|_| format!("'{}' is not a chat id", s))
        })
        .collect()
}
