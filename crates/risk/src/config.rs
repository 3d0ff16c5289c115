use serde::{Deserialize, Serialize};

use common::config::{env_flag, env_or};
use common::{Error, Result};

/// User-configurable risk parameters. Fractions are of account balance
/// unless noted otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Upper bound on position notional (e.g. 0.10 = 10% of balance).
    pub max_position_size: f64,
    /// Lower bound on position notional.
    pub min_position_size: f64,
    /// Target position notional before clamping.
    pub default_position_size: f64,
    /// Quote-currency notional per trade when `use_fixed_lot` is set.
    pub fixed_lot_size: f64,
    pub use_fixed_lot: bool,
    /// Realized daily P/L magnitude that halts new entries for the day.
    pub max_daily_loss: f64,
    /// Largest loss a single position may risk between entry and stop.
    pub max_position_loss: f64,
    pub max_open_positions: usize,
    /// Base stop-loss distance as a fraction of entry (e.g. 0.02 = 2%).
    pub stop_loss_pct: f64,
    /// Ceiling on the volatility widening added to `stop_loss_pct`.
    pub volatility_stop_cap: f64,
    /// Take-profit distance as a multiple of `stop_loss_pct`.
    pub risk_reward_ratio: f64,
    /// Closed trades kept in memory for statistics.
    pub max_trade_history: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size: 0.10,
            min_position_size: 0.01,
            default_position_size: 0.05,
            fixed_lot_size: 100.0,
            use_fixed_lot: false,
            max_daily_loss: 0.05,
            max_position_loss: 0.02,
            max_open_positions: 3,
            stop_loss_pct: 0.02,
            volatility_stop_cap: 0.02,
            risk_reward_ratio: 2.0,
            max_trade_history: 1000,
        }
    }
}

impl RiskConfig {
    /// Read overrides from the environment on top of the defaults.
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        let cfg = Self {
            max_position_size: env_or("MAX_POSITION_SIZE", d.max_position_size)?,
            min_position_size: env_or("MIN_POSITION_SIZE", d.min_position_size)?,
            default_position_size: env_or("DEFAULT_POSITION_SIZE", d.default_position_size)?,
            fixed_lot_size: env_or("FIXED_LOT_SIZE", d.fixed_lot_size)?,
            use_fixed_lot: env_flag("USE_FIXED_LOT", d.use_fixed_lot)?,
            max_daily_loss: env_or("MAX_DAILY_LOSS", d.max_daily_loss)?,
            max_position_loss: env_or("MAX_POSITION_LOSS", d.max_position_loss)?,
            max_open_positions: env_or("MAX_OPEN_POSITIONS", d.max_open_positions)?,
            stop_loss_pct: env_or("STOP_LOSS_PERCENT", d.stop_loss_pct)?,
            volatility_stop_cap: env_or("VOLATILITY_STOP_CAP", d.volatility_stop_cap)?,
            risk_reward_ratio: env_or("RISK_REWARD_RATIO", d.risk_reward_ratio)?,
            max_trade_history: env_or("MAX_TRADE_HISTORY", d.max_trade_history)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let fraction = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 && v <= 1.0 {
                Ok(())
            } else {
                Err(Error::Config(format!("{name} must be in (0, 1], got {v}")))
            }
        };
        fraction("MAX_POSITION_SIZE", self.max_position_size)?;
        fraction("MIN_POSITION_SIZE", self.min_position_size)?;
        fraction("DEFAULT_POSITION_SIZE", self.default_position_size)?;
        fraction("MAX_DAILY_LOSS", self.max_daily_loss)?;
        fraction("MAX_POSITION_LOSS", self.max_position_loss)?;
        fraction("STOP_LOSS_PERCENT", self.stop_loss_pct)?;

        if self.min_position_size > self.max_position_size {
            return Err(Error::Config(format!(
                "MIN_POSITION_SIZE ({}) exceeds MAX_POSITION_SIZE ({})",
                self.min_position_size, self.max_position_size
            )));
        }
        if !(self.fixed_lot_size.is_finite() && self.fixed_lot_size > 0.0) {
            return Err(Error::Config(format!(
                "FIXED_LOT_SIZE must be positive, got {}",
                self.fixed_lot_size
            )));
        }
        if !(self.volatility_stop_cap.is_finite() && self.volatility_stop_cap >= 0.0) {
            return Err(Error::Config("VOLATILITY_STOP_CAP must be >= 0".into()));
        }
        if !(self.risk_reward_ratio.is_finite() && self.risk_reward_ratio > 0.0) {
            return Err(Error::Config("RISK_REWARD_RATIO must be positive".into()));
        }
        // Both brackets must stay on the positive side of any entry price.
        if self.stop_loss_pct + self.volatility_stop_cap >= 1.0 {
            return Err(Error::Config(format!(
                "STOP_LOSS_PERCENT + VOLATILITY_STOP_CAP must be below 1, got {}",
                self.stop_loss_pct + self.volatility_stop_cap
            )));
        }
        if self.stop_loss_pct * self.risk_reward_ratio >= 1.0 {
            return Err(Error::Config(format!(
                "STOP_LOSS_PERCENT * RISK_REWARD_RATIO must be below 1, got {}",
                self.stop_loss_pct * self.risk_reward_ratio
            )));
        }
        if self.max_open_positions == 0 {
            return Err(Error::Config("MAX_OPEN_POSITIONS must be >= 1".into()));
        }
        if self.max_trade_history == 0 {
            return Err(Error::Config("MAX_TRADE_HISTORY must be >= 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RiskConfig::default().validate().is_ok());
    }

    #[test]
    fn min_above_max_is_rejected() {
        let cfg = RiskConfig {
            min_position_size: 0.2,
            ..RiskConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn target_beyond_entry_is_rejected() {
        let cfg = RiskConfig {
            stop_loss_pct: 0.5,
            risk_reward_ratio: 2.5,
            ..RiskConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn widened_stop_reaching_zero_is_rejected() {
        let cfg = RiskConfig {
            stop_loss_pct: 0.9,
            volatility_stop_cap: 0.1,
            risk_reward_ratio: 1.0,
            ..RiskConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn zero_stop_loss_is_rejected() {
        let cfg = RiskConfig {
            stop_loss_pct: 0.0,
            ..RiskConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
