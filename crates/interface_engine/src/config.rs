//! Engine configuration

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use core_kernel::Timezone;
use domain_fx::{HttpRateSourceConfig, DEFAULT_RATE_TTL_HOURS};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Engine configuration
///
/// Every field has a default, so an empty environment yields a working
/// local setup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the FX rate API
    pub rate_source_url: String,
    /// Timeout for one rate request in seconds
    pub fx_timeout_secs: u64,
    /// How long a fetched rate stays usable
    pub fx_ttl_hours: i64,
    /// Timezone that decides which calendar day "today" is
    pub timezone: Timezone,
    /// File backing the pending queue and the persisted rate tier
    pub store_path: PathBuf,
    /// Default tracing filter when `RUST_LOG` is not set
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rate_source_url: "http://localhost:8080".to_string(),
            fx_timeout_secs: 10,
            fx_ttl_hours: DEFAULT_RATE_TTL_HOURS,
            timezone: Timezone::default(),
            store_path: PathBuf::from("ledger-state.json"),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from `LEDGER_*` environment variables
    ///
    /// `LEDGER_FX_TIMEOUT_SECS=5` sets `fx_timeout_secs`, and so on.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("LEDGER").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Reads a `.env` file if present, then loads from the environment
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn rate_source(&self) -> HttpRateSourceConfig {
        HttpRateSourceConfig {
            base_url: self.rate_source_url.clone(),
            timeout: Duration::from_secs(self.fx_timeout_secs),
        }
    }

    pub fn rate_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.fx_ttl_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.fx_ttl_hours, 24);
        assert_eq!(config.timezone, Timezone::default());
        assert_eq!(config.rate_source().timeout, Duration::from_secs(10));
        assert_eq!(config.rate_ttl(), chrono::Duration::hours(24));
    }

    #[test]
    fn test_partial_source_keeps_defaults() {
        let config: EngineConfig = config::Config::builder()
            .set_override("timezone", "Europe/Berlin")
            .unwrap()
            .set_override("fx_timeout_secs", 3)
            .unwrap()
            .set_override("log_format", "json")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.timezone, "Europe/Berlin".parse::<Timezone>().unwrap());
        assert_eq!(config.fx_timeout_secs, 3);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.rate_source_url, "http://localhost:8080");
    }
}
