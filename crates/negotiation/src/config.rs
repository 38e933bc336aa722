//! Configuration for the negotiation engine.

use std::env;
use std::time::Duration;

use crate::error::NegotiationError;

/// Default time an offer stays open before it expires.
const DEFAULT_OFFER_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default pause between expiration sweeps.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of offers transitioned per sweeper batch.
const DEFAULT_SWEEP_BATCH_SIZE: i64 = 100;

/// Configuration for the negotiation engine.
#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    /// SQLite URL for the Souk database.
    pub sqlite_url: String,
    /// How long a new offer stays open before the sweeper may expire it.
    pub offer_ttl: Duration,
    /// Pause between expiration sweeps.
    pub sweep_interval: Duration,
    /// Bound on offers scanned per sweeper batch, so a long backlog never
    /// holds one cursor open against live traffic.
    pub sweep_batch_size: i64,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            sqlite_url: sqlite_url_from_path("./data/souk.db"),
            offer_ttl: DEFAULT_OFFER_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
        }
    }
}

impl NegotiationConfig {
    /// Create a config from a SQLite path or URL, with default timings.
    pub fn from_sqlite_path(path: impl Into<String>) -> Self {
        Self {
            sqlite_url: sqlite_url_from_path(&path.into()),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Optional env vars:
    /// - `SOUK_SQLITE_PATH` (path or sqlite URL, default: ./data/souk.db)
    /// - `SOUK_OFFER_TTL_HOURS` (default: 24)
    /// - `SOUK_SWEEP_INTERVAL_SECS` (default: 60)
    /// - `SOUK_SWEEP_BATCH_SIZE` (default: 100)
    pub fn from_env() -> Result<Self, NegotiationError> {
        let mut config = Self::default();

        if let Ok(path) = env::var("SOUK_SQLITE_PATH") {
            config.sqlite_url = sqlite_url_from_path(&path);
        }
        if let Some(hours) = parse_env::<u64>("SOUK_OFFER_TTL_HOURS")? {
            config.offer_ttl = Duration::from_secs(hours * 60 * 60);
        }
        if let Some(secs) = parse_env::<u64>("SOUK_SWEEP_INTERVAL_SECS")? {
            config.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(batch) = parse_env::<i64>("SOUK_SWEEP_BATCH_SIZE")? {
            if batch < 1 {
                return Err(NegotiationError::Validation(
                    "SOUK_SWEEP_BATCH_SIZE must be at least 1".to_string(),
                ));
            }
            config.sweep_batch_size = batch;
        }

        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, NegotiationError> {
    match env::var(name) {
        Ok(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            NegotiationError::Validation(format!("{name} is not a valid value: {raw}"))
        }),
        Err(_) => Ok(None),
    }
}

fn sqlite_url_from_path(path: &str) -> String {
    if path.starts_with("sqlite:") {
        path.to_string()
    } else {
        format!("sqlite:{}?mode=rwc", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = NegotiationConfig::default();
        assert_eq!(config.offer_ttl, Duration::from_secs(86_400));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.sweep_batch_size, 100);
    }

    #[test]
    fn sqlite_path_is_wrapped_into_url() {
        let config = NegotiationConfig::from_sqlite_path("./x.db");
        assert_eq!(config.sqlite_url, "sqlite:./x.db?mode=rwc");

        let config = NegotiationConfig::from_sqlite_path("sqlite::memory:");
        assert_eq!(config.sqlite_url, "sqlite::memory:");
    }
}
