//! Process-level configuration (§6.4): infrastructure knobs read once at
//! startup from the environment. Everything that can change behavior while
//! the daemon is running -- trading mode, risk caps, cost model, scoring
//! weights -- lives in the `config.settings` store instead and is read
//! through `domain::settings::Settings`, not here.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use rust_decimal::Decimal;

/// Which collaborator implementations to construct. Only `Mock` exists
/// today; the variant still gates `Application::build` so a future broker
/// integration has a seam to land in without touching the rest of the
/// bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMode {
    Mock,
}

impl FromStr for ClientMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(ClientMode::Mock),
            other => anyhow::bail!("invalid SENTINEL_CLIENT_MODE '{other}', only 'mock' is supported"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the seven SQLite store files (§6.1). Created on
    /// startup if missing.
    pub data_dir: PathBuf,
    pub http_addr: String,
    pub log_level: String,
    pub client_mode: ClientMode,
    pub base_currency: String,
    /// Starting cash seeded into the mock broker on a fresh data directory.
    pub mock_starting_cash: Decimal,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let data_dir = env::var("SENTINEL_DATA_DIR").unwrap_or_else(|_| "./data".to_string());
        let http_addr = env::var("SENTINEL_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let log_level = env::var("SENTINEL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let client_mode = env::var("SENTINEL_CLIENT_MODE")
            .unwrap_or_else(|_| "mock".to_string())
            .parse()
            .context("parsing SENTINEL_CLIENT_MODE")?;
        let base_currency = env::var("SENTINEL_BASE_CURRENCY").unwrap_or_else(|_| "USD".to_string());
        let mock_starting_cash = env::var("SENTINEL_MOCK_STARTING_CASH")
            .ok()
            .map(|raw| Decimal::from_str(&raw).context("parsing SENTINEL_MOCK_STARTING_CASH"))
            .transpose()?
            .unwrap_or(Decimal::from(100_000));

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            http_addr,
            log_level,
            client_mode,
            base_currency,
            mock_starting_cash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_mode_rejects_unknown_value() {
        assert!("alpaca".parse::<ClientMode>().is_err());
        assert!(matches!("mock".parse::<ClientMode>(), Ok(ClientMode::Mock)));
    }
}
