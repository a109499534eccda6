// src/config.rs
use std::env;
use std::str::FromStr;
use std::time::Duration;

use log::warn;

pub const DEFAULT_RATE_SOURCE_URL: &str = "https://www.mortgagenewsdaily.com/mortgage-rates/30-year-fixed";
/// Hourly 13:00-22:00 UTC on weekdays: 9am-6pm New York in summer, 8am-5pm in winter.
pub const DEFAULT_INGEST_CRON: &str = "0 0 13-22 * * Mon-Fri";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub rate_source_url: String,
    pub cache_ttl: Duration,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    pub fetch_timeout: Duration,
    pub fallback_market_rate: f64,
    pub ingest_cron: String,
    pub rate_history_csv: Option<String>,
    pub clients_csv: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            port: 3030,
            rate_source_url: DEFAULT_RATE_SOURCE_URL.to_string(),
            cache_ttl: Duration::from_secs(30),
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(1000),
            fetch_timeout: Duration::from_secs(15),
            fallback_market_rate: 6.5,
            ingest_cron: DEFAULT_INGEST_CRON.to_string(),
            rate_history_csv: None,
            clients_csv: None,
        }
    }
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Read settings from the environment (after `.env` has been loaded).
    pub fn from_env() -> Self {
        let defaults = AppConfig::default();

        let fallback_market_rate = parsed_var("FALLBACK_MARKET_RATE", defaults.fallback_market_rate);
        let fallback_market_rate = if fallback_market_rate.is_finite() && fallback_market_rate > 0.0 {
            fallback_market_rate
        } else {
            warn!("FALLBACK_MARKET_RATE must be positive, using {}", defaults.fallback_market_rate);
            defaults.fallback_market_rate
        };

        AppConfig {
            port: parsed_var("PORT", defaults.port),
            rate_source_url: optional_var("RATE_SOURCE_URL").unwrap_or(defaults.rate_source_url),
            cache_ttl: Duration::from_secs(parsed_var("RATE_CACHE_TTL_SECS", 30)),
            retry_attempts: parsed_var("FETCH_RETRY_ATTEMPTS", defaults.retry_attempts),
            retry_base_delay: Duration::from_millis(parsed_var("FETCH_RETRY_BASE_MS", 1000)),
            fetch_timeout: Duration::from_secs(parsed_var("FETCH_TIMEOUT_SECS", 15)),
            fallback_market_rate,
            ingest_cron: optional_var("INGEST_CRON").unwrap_or(defaults.ingest_cron),
            rate_history_csv: optional_var("RATE_HISTORY_CSV"),
            clients_csv: optional_var("CLIENTS_CSV"),
        }
    }
}
