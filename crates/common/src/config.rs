use std::str::FromStr;

use crate::{Error, Result};

/// Process-level settings for the replay driver, loaded from environment
/// variables at startup. Component settings (risk, throttling, indicators)
/// live next to the components that own them.
#[derive(Debug, Clone)]
pub struct Config {
    // Symbols to evaluate, e.g. "BTCUSDT,ETHUSDT"
    pub trading_pairs: Vec<String>,

    // Directory holding one `<SYMBOL>.json` bar file per pair
    pub bars_dir: String,

    // Paper account
    pub initial_balance: f64,
    pub paper_slippage_bps: f64,

    // Strategy config file path
    pub strategy_config_path: String,
}

impl Config {
    /// Load from environment variables, honouring a `.env` file if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let trading_pairs = env_list("TRADING_PAIRS", &["BTCUSDT"])?;
        if trading_pairs.is_empty() {
            return Err(Error::Config("TRADING_PAIRS must name at least one pair".into()));
        }

        let initial_balance: f64 = env_or("INITIAL_BALANCE", 1000.0)?;
        if initial_balance <= 0.0 {
            return Err(Error::Config(format!(
                "INITIAL_BALANCE must be positive, got {initial_balance}"
            )));
        }

        Ok(Config {
            trading_pairs,
            bars_dir: env_or("BARS_DIR", "data/bars".to_string())?,
            initial_balance,
            paper_slippage_bps: env_or("PAPER_SLIPPAGE_BPS", 10.0)?,
            strategy_config_path: env_or(
                "STRATEGY_CONFIG_PATH",
                "config/strategy.toml".to_string(),
            )?,
        })
    }
}

/// Read `key` and parse it, falling back to `default` when unset.
/// A value that is set but unparseable is a configuration error.
pub fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| Error::Config(format!("{key}='{raw}': {e}"))),
        Err(_) => Ok(default),
    }
}

/// Read a boolean flag ("true"/"false", case-insensitive).
pub fn env_flag(key: &str, default: bool) -> Result<bool> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(Error::Config(format!("{key} must be true or false, got '{other}'"))),
        },
        Err(_) => Ok(default),
    }
}

/// Read a comma-separated list of strings.
pub fn env_list(key: &str, default: &[&str]) -> Result<Vec<String>> {
    let items = match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    };
    Ok(items)
}
