//! Environment-driven configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

/// Runtime configuration for the scraper, dispatcher and their collaborators.
#[derive(Clone, Debug)]
pub struct Config {
    pub scrape_interval: Duration,
    pub scrape_start_offset: Duration,
    pub scrape_workers: usize,
    pub dispatch_interval: Duration,
    pub taxonomy_refresh_interval: Duration,
    pub marketplace_url: String,
    pub page_limit: u32,
    pub page_delay: Duration,
    pub page_jitter: Duration,
    pub telegram_api_url: String,
    pub telegram_token: String,
    pub db_url: String,
    pub db_path: String,
    pub logs_path: PathBuf,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secs = |key: &str, default: u64| -> Result<Duration, AppError> {
            parse_or(&lookup, key, default).map(Duration::from_secs)
        };
        let millis = |key: &str, default: u64| -> Result<Duration, AppError> {
            parse_or(&lookup, key, default).map(Duration::from_millis)
        };

        let scrape_workers: usize = parse_or(&lookup, "SCRAPER_WORKERS_COUNT", 5)?;
        if scrape_workers == 0 {
            return Err(AppError::InvalidConfig {
                key: "SCRAPER_WORKERS_COUNT".to_string(),
                value: "0".to_string(),
            });
        }

        let page_limit: u32 = parse_or(&lookup, "PAGE_LIMIT", 50)?;
        if page_limit == 0 {
            return Err(AppError::InvalidConfig {
                key: "PAGE_LIMIT".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(Self {
            scrape_interval: secs("SCRAPER_INTERVAL", 600)?,
            scrape_start_offset: secs("SCRAPER_START_OFFSET", 0)?,
            scrape_workers,
            dispatch_interval: secs("WORKER_NOTIFICATION_INTERVAL", 1200)?,
            taxonomy_refresh_interval: secs("TAXONOMY_REFRESH_INTERVAL", 86_400)?,
            marketplace_url: lookup("MARKETPLACE_URL")
                .unwrap_or_else(|| "https://www.polovniautomobili.com".to_string()),
            page_limit,
            page_delay: millis("PAGE_DELAY_MS", 1000)?,
            page_jitter: millis("PAGE_JITTER_MS", 2000)?,
            telegram_api_url: lookup("TELEGRAM_API_URL")
                .unwrap_or_else(|| "https://api.telegram.org".to_string()),
            telegram_token: lookup("TELEGRAM_API_TOKEN").ok_or_else(|| {
                AppError::MissingConfig {
                    key: "TELEGRAM_API_TOKEN".to_string(),
                }
            })?,
            db_url: lookup("DB_URL").unwrap_or_else(|| "sqlite://data/auto-alert.db".to_string()),
            db_path: lookup("DB_PATH").unwrap_or_else(|| "data/auto-alert.db".to_string()),
            logs_path: lookup("LOGS_PATH").map_or_else(|| PathBuf::from("logs"), PathBuf::from),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| AppError::InvalidConfig {
            key: key.to_string(),
            value: raw,
        }),
    }
}
