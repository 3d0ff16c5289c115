use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use common::{Error, Result};

/// Strategy config file (TOML). Every key is optional.
///
/// Example `config/strategy.toml`:
/// ```toml
/// [indicators]
/// ema_fast = 20
/// ema_slow = 50
/// rsi_period = 14
/// volatility_window = 20
/// atr_period = 14
/// macd_fast = 12
/// macd_slow = 26
/// macd_signal = 9
/// bb_window = 20
/// bb_k = 2.0
/// volume_window = 20
///
/// [signal]
/// oversold = 30.0
/// overbought = 70.0
/// max_volatility = 0.1
/// min_volume_ratio = 0.5
/// min_strength = 0.0
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub indicators: IndicatorConfig,
    pub signal: SignalConfig,
}

/// Window lengths for the indicator engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// Span of the fast EMA.
    pub ema_fast: usize,
    /// Span of the slow EMA.
    pub ema_slow: usize,
    pub rsi_period: usize,
    /// Number of closes in the rolling standard deviation.
    pub volatility_window: usize,
    pub atr_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_window: usize,
    /// Band width in standard deviations.
    pub bb_k: f64,
    /// Bars in the mean the latest volume is compared against.
    pub volume_window: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ema_fast: 20,
            ema_slow: 50,
            rsi_period: 14,
            volatility_window: 20,
            atr_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_window: 20,
            bb_k: 2.0,
            volume_window: 20,
        }
    }
}

/// Filters a crossover must pass to be emitted.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignalConfig {
    /// RSI band, both edges exclusive.
    pub oversold: f64,
    pub overbought: f64,
    /// Largest relative volatility (std / close) a crossover may fire in.
    pub max_volatility: f64,
    /// Smallest latest-to-mean volume ratio a crossover may fire on.
    pub min_volume_ratio: f64,
    /// Minimum confirmation score in percent. 0 disables the gate.
    pub min_strength: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            oversold: 30.0,
            overbought: 70.0,
            max_volatility: 0.1,
            min_volume_ratio: 0.5,
            min_strength: 0.0,
        }
    }
}

impl StrategyConfig {
    /// Load from a TOML file. A missing file yields the defaults; an
    /// unreadable or invalid one is a configuration error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No strategy config file, using defaults");
            let cfg = Self::default();
            cfg.validate()?;
            return Ok(cfg);
        }

        let content = std::fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.indicators.validate()?;
        self.signal.validate()
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ema_fast == 0 || self.ema_fast >= self.ema_slow {
            return Err(Error::Config(format!(
                "ema_fast ({}) must be positive and below ema_slow ({})",
                self.ema_fast, self.ema_slow
            )));
        }
        if self.rsi_period < 2 {
            return Err(Error::Config("rsi_period must be >= 2".into()));
        }
        if self.volatility_window < 2 {
            return Err(Error::Config("volatility_window must be >= 2".into()));
        }
        if self.atr_period == 0 {
            return Err(Error::Config("atr_period must be >= 1".into()));
        }
        if self.macd_fast == 0 || self.macd_fast >= self.macd_slow || self.macd_signal == 0 {
            return Err(Error::Config(format!(
                "MACD periods must satisfy 0 < fast ({}) < slow ({}) and signal ({}) >= 1",
                self.macd_fast, self.macd_slow, self.macd_signal
            )));
        }
        if self.bb_window < 2 || !(self.bb_k.is_finite() && self.bb_k > 0.0) {
            return Err(Error::Config("bb_window must be >= 2 and bb_k positive".into()));
        }
        if self.volume_window == 0 {
            return Err(Error::Config("volume_window must be >= 1".into()));
        }
        Ok(())
    }
}

impl SignalConfig {
    pub fn validate(&self) -> Result<()> {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        if !in_range(self.oversold) || !in_range(self.overbought) || self.oversold >= self.overbought {
            return Err(Error::Config(format!(
                "RSI band must satisfy 0 <= oversold ({}) < overbought ({}) <= 100",
                self.oversold, self.overbought
            )));
        }
        if !(self.max_volatility.is_finite() && self.max_volatility > 0.0) {
            return Err(Error::Config("max_volatility must be positive".into()));
        }
        if !(self.min_volume_ratio.is_finite() && self.min_volume_ratio >= 0.0) {
            return Err(Error::Config("min_volume_ratio must be >= 0".into()));
        }
        if !(0.0..=100.0).contains(&self.min_strength) {
            return Err(Error::Config("min_strength must be within 0..=100".into()));
        }
        Ok(())
    }
}
