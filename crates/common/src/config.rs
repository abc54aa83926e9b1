use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveTime;

use crate::{Error, Result};

/// All runtime configuration loaded from environment variables at startup.
/// Strategy parameters live in the TOML file at `strategy_config_path`.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Strategy config file path
    pub strategy_config_path: PathBuf,

    // Paper broker
    pub paper_data_dir: PathBuf,
    pub paper_account_id: String,
    pub paper_funds: f64,

    // Scanning
    pub scan: ScanSettings,
}

/// Pacing, batching and retry parameters of the scan loop.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Symbols dequeued per buy-scan pass.
    pub chunk_size: usize,
    /// Unconditional delay after every per-symbol request.
    pub pacing_delay: Duration,
    /// Sleep when nothing is actionable (market closed).
    pub idle_sleep: Duration,
    /// Back-off after a connectivity failure.
    pub retry_backoff: Duration,
    /// Upper bound on any single broker call.
    pub broker_timeout: Duration,
    pub market_open: NaiveTime,
    pub market_close: NaiveTime,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            chunk_size: 20,
            pacing_delay: Duration::from_secs(2),
            idle_sleep: Duration::from_secs(60),
            retry_backoff: Duration::from_secs(60),
            broker_timeout: Duration::from_secs(30),
            market_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(),
            market_close: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first
    /// if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ScanSettings::default();

        let scan = ScanSettings {
            chunk_size: parsed(&lookup, "SCAN_CHUNK_SIZE")?.unwrap_or(defaults.chunk_size),
            pacing_delay: seconds(&lookup, "PACING_DELAY_SECS")?.unwrap_or(defaults.pacing_delay),
            idle_sleep: seconds(&lookup, "IDLE_SLEEP_SECS")?.unwrap_or(defaults.idle_sleep),
            retry_backoff: seconds(&lookup, "RETRY_BACKOFF_SECS")?
                .unwrap_or(defaults.retry_backoff),
            broker_timeout: seconds(&lookup, "BROKER_TIMEOUT_SECS")?
                .unwrap_or(defaults.broker_timeout),
            market_open: time_of_day(&lookup, "MARKET_OPEN")?.unwrap_or(defaults.market_open),
            market_close: time_of_day(&lookup, "MARKET_CLOSE")?.unwrap_or(defaults.market_close),
        };

        if scan.chunk_size == 0 {
            return Err(Error::Config("SCAN_CHUNK_SIZE must be at least 1".into()));
        }
        if scan.market_open >= scan.market_close {
            return Err(Error::Config(format!(
                "MARKET_OPEN ({}) must be earlier than MARKET_CLOSE ({})",
                scan.market_open, scan.market_close
            )));
        }

        Ok(Config {
            database_url: lookup("DATABASE_URL").ok_or_else(|| {
                Error::Config(
                    "Required environment variable 'DATABASE_URL' is not set. Check your .env file."
                        .into(),
                )
            })?,
            strategy_config_path: lookup("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategy.toml".to_string())
                .into(),
            paper_data_dir: lookup("PAPER_DATA_DIR")
                .unwrap_or_else(|| "data/bars".to_string())
                .into(),
            paper_account_id: lookup("PAPER_ACCOUNT_ID").unwrap_or_else(|| "DU0000001".into()),
            paper_funds: parsed(&lookup, "PAPER_FUNDS")?.unwrap_or(100_000.0),
            scan,
        })
    }
}

fn parsed<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("{key}='{raw}' is invalid: {e}")))
        })
        .transpose()
}

fn seconds<F>(lookup: &F, key: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    parsed::<F, f64>(lookup, key)?
        .map(|secs| {
            Duration::try_from_secs_f64(secs)
                .map_err(|e| Error::Config(format!("{key}='{secs}' is not a duration: {e}")))
        })
        .transpose()
}

fn time_of_day<F>(lookup: &F, key: &str) -> Result<Option<NaiveTime>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            NaiveTime::parse_from_str(raw.trim(), "%H:%M")
                .map_err(|e| Error::Config(format!("{key}='{raw}' is not HH:MM: {e}")))
        })
        .transpose()
}
