use std::sync::Arc;

use tracing::{debug, info, warn};

use common::{Clock, Error, OrderSide, RejectionReason, Result, TradeRecord, TradeResult};

use crate::config::RiskConfig;
use crate::daily::DailyRiskState;
use crate::history::{TradeHistory, TradeStats};

/// Position sizing, bracket levels, and the daily-loss circuit breaker.
///
/// Owns the daily risk state and the closed-trade history. The daily state
/// resets lazily: the first operation that observes a new UTC date starts a
/// fresh day before doing anything else. Callers that share one manager
/// across symbols must hold it behind a single lock so that the reset and
/// the check that follows happen together.
pub struct RiskManager {
    config: RiskConfig,
    clock: Arc<dyn Clock>,
    daily: DailyRiskState,
    history: TradeHistory,
}

impl RiskManager {
    pub fn new(config: RiskConfig, clock: Arc<dyn Clock>) -> Self {
        let today = clock.now().date_naive();
        let history = TradeHistory::new(config.max_trade_history);
        Self {
            config,
            clock,
            daily: DailyRiskState::new(today),
            history,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Quantity of the base asset to trade at `price`.
    ///
    /// Fixed-lot mode buys `fixed_lot_size` of quote currency regardless of
    /// balance. Otherwise the notional is `default_position_size` of balance,
    /// clamped into `[min_position_size, max_position_size]`.
    pub fn size_position(&self, balance: f64, price: f64) -> Result<f64> {
        if !(price.is_finite() && price > 0.0) {
            return Err(Error::InvalidInput(format!("price must be positive, got {price}")));
        }

        if !(balance.is_finite() && balance > 0.0) {
            return Err(Error::InvalidInput(format!("balance must be positive, got {balance}")));
        }

        if self.config.use_fixed_lot {
            return Ok(self.config.fixed_lot_size / price);
        }

        let lower = balance * self.config.min_position_size;
        let upper = balance * self.config.max_position_size;
        let notional = (balance * self.config.default_position_size).max(lower).min(upper);
        Ok(notional / price)
    }

    /// Stop-loss level for an entry.
    ///
    /// `volatility` is relative (a fraction of price). It widens the stop by
    /// twice its value, up to `volatility_stop_cap`.
    pub fn stop_loss(&self, entry: f64, side: OrderSide, volatility: Option<f64>) -> Result<f64> {
        if !(entry.is_finite() && entry > 0.0) {
            return Err(Error::InvalidInput(format!("entry price must be positive, got {entry}")));
        }

        let mut pct = self.config.stop_loss_pct;
        match volatility {
            Some(v) if !v.is_finite() || v < 0.0 => {
                return Err(Error::InvalidInput(format!("volatility must be >= 0, got {v}")));
            }
            Some(v) if v > 0.0 => pct += (v * 2.0).min(self.config.volatility_stop_cap),
            _ => {}
        }

        Ok(match side {
            OrderSide::Buy => entry * (1.0 - pct),
            OrderSide::Sell => entry * (1.0 + pct),
        })
    }

    /// Take-profit level: `stop_loss_pct * risk_reward_ratio` away from entry.
    /// `None` uses the configured ratio.
    pub fn take_profit(
        &self,
        entry: f64,
        side: OrderSide,
        risk_reward_ratio: Option<f64>,
    ) -> Result<f64> {
        if !(entry.is_finite() && entry > 0.0) {
            return Err(Error::InvalidInput(format!("entry price must be positive, got {entry}")));
        }
        let ratio = risk_reward_ratio.unwrap_or(self.config.risk_reward_ratio);
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(Error::InvalidInput(format!(
                "risk/reward ratio must be positive, got {ratio}"
            )));
        }

        let pct = self.config.stop_loss_pct * ratio;
        if side == OrderSide::Sell && pct >= 1.0 {
            return Err(Error::InvalidInput(format!(
                "risk/reward ratio {ratio} puts a short target at or below zero"
            )));
        }
        Ok(match side {
            OrderSide::Buy => entry * (1.0 + pct),
            OrderSide::Sell => entry * (1.0 - pct),
        })
    }

    /// Account-wide entry check. `Err(RiskLimitExceeded)` means "not now",
    /// not a failure.
    pub fn check_trade(&mut self, balance: f64, symbol: &str, open_positions: usize) -> Result<()> {
        self.roll_day();

        if !(balance.is_finite() && balance > 0.0) {
            return Err(Error::InvalidInput(format!("balance must be positive, got {balance}")));
        }

        let limit = balance * self.config.max_daily_loss;
        if self.daily.realized_pl.abs() > limit {
            warn!(
                symbol,
                realized_pl = self.daily.realized_pl,
                limit,
                "Daily loss limit reached"
            );
            return Err(Error::RiskLimitExceeded {
                reason: RejectionReason::DailyLossLimit,
            });
        }

        if open_positions >= self.config.max_open_positions {
            warn!(
                symbol,
                open_positions,
                max = self.config.max_open_positions,
                "Maximum number of positions reached"
            );
            return Err(Error::RiskLimitExceeded {
                reason: RejectionReason::MaxOpenPositions,
            });
        }

        Ok(())
    }

    /// Boolean form of [`check_trade`](Self::check_trade).
    pub fn allow_trade(&mut self, balance: f64, symbol: &str, open_positions: usize) -> bool {
        self.check_trade(balance, symbol, open_positions).is_ok()
    }

    /// Record a closed trade in today's totals and the history.
    pub fn record_trade(&mut self, profit_loss: f64, result: TradeResult) {
        self.roll_day();

        self.daily.record(profit_loss, result);
        self.history.push(TradeRecord {
            timestamp: self.clock.now(),
            profit_loss,
            result,
        });

        info!(
            profit_loss,
            result = ?result,
            daily_pl = self.daily.realized_pl,
            daily_trades = self.daily.trade_count,
            "Trade recorded"
        );
    }

    /// Today's totals, after any pending day rollover.
    pub fn daily_stats(&mut self) -> DailyRiskState {
        self.roll_day();
        self.daily.clone()
    }

    /// Aggregates over the retained trade history.
    pub fn stats(&self) -> TradeStats {
        self.history.stats()
    }

    pub fn recent_win_rate(&self, n: usize) -> f64 {
        self.history.recent_win_rate(n)
    }

    pub fn history(&self) -> &TradeHistory {
        &self.history
    }

    /// Scale a size by recent performance: up 20% above a 60% win rate,
    /// down 20% below 40%. Applied once, never compounded.
    pub fn adjust_size(&self, base: f64, recent_win_rate: f64) -> f64 {
        if recent_win_rate > 0.6 {
            base * 1.2
        } else if recent_win_rate < 0.4 {
            base * 0.8
        } else {
            base
        }
    }

    /// Quote-currency amount lost if a position stops out.
    pub fn position_risk(&self, quantity: f64, entry: f64, stop_loss: f64) -> f64 {
        (entry - stop_loss).abs() * quantity
    }

    /// Whether a position's stop distance stays within `max_position_loss`.
    pub fn within_position_loss(
        &self,
        balance: f64,
        quantity: f64,
        entry: f64,
        stop_loss: f64,
    ) -> bool {
        let risk = self.position_risk(quantity, entry, stop_loss);
        let limit = balance * self.config.max_position_loss;
        if risk > limit {
            debug!(risk, limit, "Position risk above per-trade limit");
            return false;
        }
        true
    }

    fn roll_day(&mut self) {
        let today = self.clock.now().date_naive();
        if today != self.daily.date {
            info!(
                previous = %self.daily.date,
                today = %today,
                trades = self.daily.trade_count,
                realized_pl = self.daily.realized_pl,
                "New trading day, daily risk state reset"
            );
            self.daily = DailyRiskState::new(today);
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
