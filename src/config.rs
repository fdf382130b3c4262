//! Runtime configuration loaded from the environment.

use std::time::Duration;

use thiserror::Error;

/// Default ingest endpoint.
pub const DEFAULT_INGEST_URL: &str = "ws://localhost:5100/ingest";

/// Provider id of the supported game.
pub const DEFAULT_GAME_ID: u32 = 21640;

/// Default capacity of the feed batch channel.
pub const DEFAULT_FEED_CAPACITY: usize = 256;

/// How long a local close waits for the socket to flush its close frame.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub ingest_url: String,
    pub game_id: u32,
    pub feed_capacity: usize,
    pub close_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ingest_url: DEFAULT_INGEST_URL.to_string(),
            game_id: DEFAULT_GAME_ID,
            feed_capacity: DEFAULT_FEED_CAPACITY,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl BridgeConfig {
    /// Reads `SPECTRA_INGEST_URL`, `SPECTRA_GAME_ID` and `SPECTRA_FEED_CAPACITY`,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let ingest_url = std::env::var("SPECTRA_INGEST_URL").unwrap_or(defaults.ingest_url);
        let game_id = parse_var("SPECTRA_GAME_ID")?.unwrap_or(defaults.game_id);
        let feed_capacity = parse_var::<usize>("SPECTRA_FEED_CAPACITY")?
            .unwrap_or(defaults.feed_capacity)
            .max(1);

        Ok(Self {
            ingest_url,
            game_id,
            feed_capacity,
            close_timeout: defaults.close_timeout,
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(None),
    }
}
