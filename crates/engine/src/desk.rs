use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use common::config::{env_flag, env_or};
use common::{
    ClosedTrade, Error, ExitReason, Fill, IndicatorSnapshot, OrderSide, Position,
    RejectionReason, Result, SignalEvent, TradeResult,
};
use risk::RiskManager;

use crate::lifecycle::TradeLifecycleCoordinator;

/// Indicator-driven exits, checked after the price brackets and max hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitConfig {
    pub indicator_exit: bool,
    /// A short is closed once RSI falls below this.
    pub rsi_oversold: f64,
    /// A long is closed once RSI rises above this.
    pub rsi_overbought: f64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            indicator_exit: true,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
        }
    }
}

impl ExitConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        let cfg = Self {
            indicator_exit: env_flag("INDICATOR_EXIT", d.indicator_exit)?,
            rsi_oversold: env_or("EXIT_RSI_OVERSOLD", d.rsi_oversold)?,
            rsi_overbought: env_or("EXIT_RSI_OVERBOUGHT", d.rsi_overbought)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        if !(in_range(self.rsi_oversold) && in_range(self.rsi_overbought))
            || self.rsi_oversold >= self.rsi_overbought
        {
            return Err(Error::Config(format!(
                "exit RSI band must satisfy 0 <= oversold < overbought <= 100, got {} / {}",
                self.rsi_oversold, self.rsi_overbought
            )));
        }
        Ok(())
    }
}

/// A sized, bracketed entry the driver may now submit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryPlan {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    /// Reference price the plan was sized at.
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Relative volatility used for the stop; reused to re-bracket at fill.
    pub volatility: f64,
    pub signal_id: String,
}

#[derive(Debug, Clone)]
pub enum EntryDecision {
    Approved(EntryPlan),
    Rejected(RejectionReason),
}

/// All state shared between symbols: the risk manager (daily budget and
/// history) and the position registry with its pacing.
///
/// An approved plan reserves its symbol until the driver confirms or aborts
/// it, so concurrent plans see it as an open position.
pub struct Desk {
    risk: RiskManager,
    lifecycle: TradeLifecycleCoordinator,
    exit: ExitConfig,
    reserved: HashSet<String>,
}

impl Desk {
    pub fn new(risk: RiskManager, lifecycle: TradeLifecycleCoordinator) -> Self {
        Self {
            risk,
            lifecycle,
            exit: ExitConfig::default(),
            reserved: HashSet::new(),
        }
    }

    pub fn with_exit_config(mut self, exit: ExitConfig) -> Self {
        self.exit = exit;
        self
    }

    pub fn risk(&self) -> &RiskManager {
        &self.risk
    }

    pub fn risk_mut(&mut self) -> &mut RiskManager {
        &mut self.risk
    }

    pub fn lifecycle(&self) -> &TradeLifecycleCoordinator {
        &self.lifecycle
    }

    pub fn lifecycle_mut(&mut self) -> &mut TradeLifecycleCoordinator {
        &mut self.lifecycle
    }

    /// Open positions plus entries approved but not yet confirmed.
    pub fn open_count(&self) -> usize {
        self.lifecycle.open_count() + self.reserved.len()
    }

    /// Gate, size and bracket a new entry for `signal`.
    ///
    /// Limits that are merely "not now" come back as `Rejected`; bad inputs
    /// are errors.
    pub fn plan_entry(&mut self, signal: &SignalEvent, balance: f64) -> Result<EntryDecision> {
        let symbol = signal.symbol.as_str();

        if self.lifecycle.position(symbol).is_some() || self.reserved.contains(symbol) {
            return Ok(self.reject(symbol, RejectionReason::PositionAlreadyOpen));
        }

        match self.risk.check_trade(balance, symbol, self.open_count()) {
            Ok(()) => {}
            Err(Error::RiskLimitExceeded { reason }) => return Ok(self.reject(symbol, reason)),
            Err(e) => return Err(e),
        }

        if let Err(reason) = self.lifecycle.check_order(symbol) {
            return Ok(self.reject(symbol, reason));
        }

        let side = signal.direction;
        let price = signal.price;
        let volatility = signal.analysis.relative_volatility();
        let quantity = self.risk.size_position(balance, price)?;
        let stop_loss = self.risk.stop_loss(price, side, Some(volatility))?;
        let take_profit = self.risk.take_profit(price, side, None)?;

        if !self.risk.within_position_loss(balance, quantity, price, stop_loss) {
            return Ok(self.reject(symbol, RejectionReason::PositionLossLimit));
        }

        self.reserved.insert(symbol.to_string());
        info!(
            symbol,
            side = %side,
            qty = quantity,
            price,
            stop_loss,
            take_profit,
            "Entry approved"
        );

        Ok(EntryDecision::Approved(EntryPlan {
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
            stop_loss,
            take_profit,
            volatility,
            signal_id: signal.id.clone(),
        }))
    }

    /// Turn an approved plan into an open position once its order filled.
    /// Brackets are recomputed from the actual fill price.
    ///
    /// A fill that does not belong to the plan releases the reservation;
    /// the plan cannot be confirmed afterwards.
    pub fn confirm_entry(&mut self, plan: &EntryPlan, fill: &Fill) -> Result<Position> {
        if fill.pair != plan.symbol || fill.side != plan.side {
            self.reserved.remove(&plan.symbol);
            warn!(symbol = %plan.symbol, pair = %fill.pair, "Fill does not match plan, reservation released");
            return Err(Error::InvalidInput(format!(
                "fill {} {} does not match plan {} {}",
                fill.side, fill.pair, plan.side, plan.symbol
            )));
        }

        let stop_loss = self.risk.stop_loss(fill.fill_price, plan.side, Some(plan.volatility))?;
        let take_profit = self.risk.take_profit(fill.fill_price, plan.side, None)?;
        let position = Position {
            symbol: plan.symbol.clone(),
            side: plan.side,
            entry_price: fill.fill_price,
            quantity: fill.quantity,
            open_time: fill.timestamp,
            stop_loss,
            take_profit,
            signal_id: plan.signal_id.clone(),
        };

        self.lifecycle.open_position(position.clone())?;
        self.reserved.remove(&plan.symbol);
        self.lifecycle.register_order(&plan.symbol);
        Ok(position)
    }

    /// Release the reservation of a plan whose order failed or was skipped.
    pub fn abort_entry(&mut self, symbol: &str) -> bool {
        let released = self.reserved.remove(symbol);
        if released {
            warn!(symbol, "Entry aborted, reservation released");
        }
        released
    }

    /// Exit check for the open position on `symbol` at `price`.
    ///
    /// Brackets and max hold win over indicators; `analysis` is only
    /// consulted when neither fires.
    pub fn check_exit(
        &self,
        symbol: &str,
        price: f64,
        analysis: Option<&IndicatorSnapshot>,
    ) -> Option<ExitReason> {
        let position = self.lifecycle.position(symbol)?;
        if let Some(reason) =
            position.exit_reason(price, self.lifecycle.now(), self.lifecycle.max_hold())
        {
            return Some(reason);
        }
        let analysis = analysis.filter(|_| self.exit.indicator_exit)?;
        position
            .indicators_turned(analysis, self.exit.rsi_oversold, self.exit.rsi_overbought)
            .then_some(ExitReason::Indicators)
    }

    /// Close the position on `symbol` after its exit order filled at
    /// `exit_price`, and book the result.
    pub fn confirm_exit(
        &mut self,
        symbol: &str,
        exit_price: f64,
        reason: ExitReason,
    ) -> Result<ClosedTrade> {
        if !(exit_price.is_finite() && exit_price > 0.0) {
            return Err(Error::InvalidInput(format!("exit price must be positive, got {exit_price}")));
        }

        let position = self.lifecycle.close_position(symbol)?;
        let profit_loss = position.unrealized_pl(exit_price);
        let result = TradeResult::from_pl(profit_loss);
        self.risk.record_trade(profit_loss, result);

        info!(
            symbol,
            entry = position.entry_price,
            exit = exit_price,
            profit_loss,
            reason = %reason,
            "Position closed"
        );

        Ok(ClosedTrade {
            symbol: position.symbol,
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            quantity: position.quantity,
            open_time: position.open_time,
            close_time: self.lifecycle.now(),
            profit_loss,
            result,
            exit_reason: reason,
            signal_id: position.signal_id,
        })
    }

    fn reject(&self, symbol: &str, reason: RejectionReason) -> EntryDecision {
        warn!(symbol, reason = %reason, "Entry rejected");
        EntryDecision::Rejected(reason)
    }
}

/// Cloneable handle that serializes every desk operation through one lock,
/// so symbols evaluated concurrently cannot interleave a check with the
/// update it guards.
#[derive(Clone)]
pub struct SharedDesk {
    inner: Arc<Mutex<Desk>>,
}

impl SharedDesk {
    pub fn new(desk: Desk) -> Self {
        Self {
            inner: Arc::new(Mutex::new(desk)),
        }
    }

    /// Exclusive access for multi-step sequences.
    pub async fn lock(&self) -> MutexGuard<'_, Desk> {
        self.inner.lock().await
    }

    /// Consume one signal-check slot for `symbol` if one is available.
    pub async fn try_begin_signal_check(&self, symbol: &str) -> bool {
        let mut desk = self.inner.lock().await;
        if desk.lifecycle().can_check_signals(symbol) {
            desk.lifecycle_mut().register_signal(symbol);
            true
        } else {
            false
        }
    }

    pub async fn plan_entry(&self, signal: &SignalEvent, balance: f64) -> Result<EntryDecision> {
        self.inner.lock().await.plan_entry(signal, balance)
    }

    pub async fn confirm_entry(&self, plan: &EntryPlan, fill: &Fill) -> Result<Position> {
        self.inner.lock().await.confirm_entry(plan, fill)
    }

    pub async fn abort_entry(&self, symbol: &str) -> bool {
        self.inner.lock().await.abort_entry(symbol)
    }

    pub async fn check_exit(
        &self,
        symbol: &str,
        price: f64,
        analysis: Option<&IndicatorSnapshot>,
    ) -> Option<ExitReason> {
        self.inner.lock().await.check_exit(symbol, price, analysis)
    }

    pub async fn confirm_exit(
        &self,
        symbol: &str,
        exit_price: f64,
        reason: ExitReason,
    ) -> Result<ClosedTrade> {
        self.inner.lock().await.confirm_exit(symbol, exit_price, reason)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use common::ManualClock;
    use risk::RiskConfig;

    use crate::lifecycle::ThrottleConfig;

    fn monday_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap()
    }

    fn make_desk(risk_cfg: RiskConfig) -> (Desk, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(monday_noon()));
        let risk = RiskManager::new(risk_cfg, clock.clone());
        let lifecycle = TradeLifecycleCoordinator::new(ThrottleConfig::default(), clock.clone());
        (Desk::new(risk, lifecycle), clock)
    }

    fn snapshot(close: f64, ema_fast: f64, rsi: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            timestamp: monday_noon(),
            close,
            ema_fast,
            ema_slow: ema_fast,
            rsi,
            volatility: 0.0,
            atr: 0.0,
            macd: 0.0,
            macd_signal: 0.0,
            bb_upper: close * 1.02,
            bb_middle: close,
            bb_lower: close * 0.98,
            volume_ratio: 1.0,
        }
    }

    fn signal(symbol: &str, direction: OrderSide, price: f64) -> SignalEvent {
        SignalEvent::new(symbol, direction, 50.0, snapshot(price, price, 50.0))
    }

    fn fill_for(plan: &EntryPlan, price: f64) -> Fill {
        Fill {
            order_id: "order-1".into(),
            pair: plan.symbol.clone(),
            side: plan.side,
            fill_price: price,
            quantity: plan.quantity,
            timestamp: monday_noon(),
        }
    }

    fn approved(decision: EntryDecision) -> EntryPlan {
        match decision {
            EntryDecision::Approved(plan) => plan,
            EntryDecision::Rejected(reason) => panic!("expected approval, got {reason}"),
        }
    }

    #[test]
    fn full_round_trip_books_the_trade() {
        let (mut desk, clock) = make_desk(RiskConfig::default());
        let sig = signal("BTCUSDT", OrderSide::Buy, 50.0);

        let plan = approved(desk.plan_entry(&sig, 1000.0).unwrap());
        assert!((plan.quantity - 1.0).abs() < 1e-9);
        assert!((plan.stop_loss - 49.0).abs() < 1e-9);
        assert!((plan.take_profit - 52.0).abs() < 1e-9);
        assert_eq!(desk.open_count(), 1);

        let position = desk.confirm_entry(&plan, &fill_for(&plan, 50.0)).unwrap();
        assert_eq!(position.signal_id, sig.id);
        assert_eq!(desk.open_count(), 1);

        clock.advance(Duration::minutes(1));
        assert_eq!(desk.check_exit("BTCUSDT", 50.5, None), None);
        assert_eq!(desk.check_exit("BTCUSDT", 52.5, None), Some(ExitReason::TakeProfit));

        let closed = desk.confirm_exit("BTCUSDT", 52.0, ExitReason::TakeProfit).unwrap();
        assert!((closed.profit_loss - 2.0).abs() < 1e-9);
        assert_eq!(closed.result, TradeResult::Win);
        assert_eq!(desk.open_count(), 0);
        assert_eq!(desk.risk().stats().total_trades, 1);
    }

    #[test]
    fn brackets_follow_the_fill_price() {
        let (mut desk, _) = make_desk(RiskConfig::default());
        let plan = approved(desk.plan_entry(&signal("BTCUSDT", OrderSide::Buy, 100.0), 1000.0).unwrap());
        let position = desk.confirm_entry(&plan, &fill_for(&plan, 101.0)).unwrap();
        assert!((position.stop_loss - 101.0 * 0.98).abs() < 1e-9);
        assert!((position.take_profit - 101.0 * 1.04).abs() < 1e-9);
    }

    #[test]
    fn second_plan_for_same_symbol_is_rejected() {
        let (mut desk, _) = make_desk(RiskConfig::default());
        let sig = signal("BTCUSDT", OrderSide::Buy, 50.0);
        approved(desk.plan_entry(&sig, 1000.0).unwrap());
        assert!(matches!(
            desk.plan_entry(&sig, 1000.0).unwrap(),
            EntryDecision::Rejected(RejectionReason::PositionAlreadyOpen)
        ));
    }

    #[test]
    fn aborted_plan_frees_the_slot() {
        let (mut desk, _) = make_desk(RiskConfig {
            max_open_positions: 1,
            ..RiskConfig::default()
        });
        approved(desk.plan_entry(&signal("BTCUSDT", OrderSide::Buy, 50.0), 1000.0).unwrap());
        assert!(matches!(
            desk.plan_entry(&signal("ETHUSDT", OrderSide::Buy, 50.0), 1000.0).unwrap(),
            EntryDecision::Rejected(RejectionReason::MaxOpenPositions)
        ));
        assert!(desk.abort_entry("BTCUSDT"));
        approved(desk.plan_entry(&signal("ETHUSDT", OrderSide::Buy, 50.0), 1000.0).unwrap());
    }

    #[test]
    fn daily_loss_blocks_plans_until_tomorrow() {
        let (mut desk, clock) = make_desk(RiskConfig::default());
        desk.risk_mut().record_trade(-60.0, TradeResult::Loss);
        assert!(matches!(
            desk.plan_entry(&signal("BTCUSDT", OrderSide::Buy, 50.0), 1000.0).unwrap(),
            EntryDecision::Rejected(RejectionReason::DailyLossLimit)
        ));
        clock.advance(Duration::days(1));
        approved(desk.plan_entry(&signal("BTCUSDT", OrderSide::Buy, 50.0), 1000.0).unwrap());
    }

    #[test]
    fn order_cooldown_applies_after_a_fill() {
        let (mut desk, clock) = make_desk(RiskConfig::default());
        let plan = approved(desk.plan_entry(&signal("BTCUSDT", OrderSide::Sell, 50.0), 1000.0).unwrap());
        desk.confirm_entry(&plan, &fill_for(&plan, 50.0)).unwrap();
        clock.advance(Duration::minutes(1));
        desk.confirm_exit("BTCUSDT", 49.0, ExitReason::Manual).unwrap();

        assert!(matches!(
            desk.plan_entry(&signal("BTCUSDT", OrderSide::Sell, 50.0), 1000.0).unwrap(),
            EntryDecision::Rejected(RejectionReason::OrderCooldown)
        ));
    }

    #[test]
    fn mismatched_fill_is_refused() {
        let (mut desk, _) = make_desk(RiskConfig::default());
        let plan = approved(desk.plan_entry(&signal("BTCUSDT", OrderSide::Buy, 50.0), 1000.0).unwrap());
        let mut fill = fill_for(&plan, 50.0);
        fill.pair = "ETHUSDT".into();
        assert!(matches!(desk.confirm_entry(&plan, &fill), Err(Error::InvalidInput(_))));
        assert_eq!(desk.open_count(), 0);
        assert!(desk.lifecycle().position("BTCUSDT").is_none());
        approved(desk.plan_entry(&signal("BTCUSDT", OrderSide::Buy, 50.0), 1000.0).unwrap());
    }

    #[test]
    fn indicators_close_a_long_inside_its_brackets() {
        let (mut desk, clock) = make_desk(RiskConfig::default());
        let plan = approved(desk.plan_entry(&signal("BTCUSDT", OrderSide::Buy, 50.0), 1000.0).unwrap());
        desk.confirm_entry(&plan, &fill_for(&plan, 50.0)).unwrap();
        clock.advance(Duration::minutes(1));

        let healthy = snapshot(50.5, 50.2, 60.0);
        let faded = snapshot(50.1, 50.2, 60.0);
        assert_eq!(desk.check_exit("BTCUSDT", 50.5, Some(&healthy)), None);
        assert_eq!(desk.check_exit("BTCUSDT", 50.1, Some(&faded)), Some(ExitReason::Indicators));
        assert_eq!(
            desk.check_exit("BTCUSDT", 52.5, Some(&faded)),
            Some(ExitReason::TakeProfit)
        );
    }

    #[test]
    fn indicator_exit_can_be_disabled() {
        let (desk, clock) = make_desk(RiskConfig::default());
        let mut desk = desk.with_exit_config(ExitConfig {
            indicator_exit: false,
            ..ExitConfig::default()
        });
        let plan = approved(desk.plan_entry(&signal("BTCUSDT", OrderSide::Sell, 50.0), 1000.0).unwrap());
        desk.confirm_entry(&plan, &fill_for(&plan, 50.0)).unwrap();
        clock.advance(Duration::minutes(1));

        let oversold = snapshot(49.8, 50.0, 20.0);
        assert_eq!(desk.check_exit("BTCUSDT", 49.8, Some(&oversold)), None);
    }

    #[test]
    fn inverted_exit_band_is_rejected() {
        let cfg = ExitConfig {
            rsi_oversold: 70.0,
            rsi_overbought: 30.0,
            ..ExitConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
        assert!(ExitConfig::default().validate().is_ok());
    }

    #[test]
    fn exit_without_position_is_a_conflict() {
        let (mut desk, _) = make_desk(RiskConfig::default());
        assert!(matches!(
            desk.confirm_exit("BTCUSDT", 50.0, ExitReason::Manual),
            Err(Error::StateConflict(_))
        ));
    }

    #[test]
    fn invalid_balance_is_an_error_not_a_rejection() {
        let (mut desk, _) = make_desk(RiskConfig::default());
        let result = desk.plan_entry(&signal("BTCUSDT", OrderSide::Buy, 50.0), 0.0);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn concurrent_plans_respect_the_position_cap() {
        let (desk, _) = make_desk(RiskConfig {
            max_open_positions: 1,
            ..RiskConfig::default()
        });
        let shared = SharedDesk::new(desk);

        let handles: Vec<_> = ["BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT"]
            .into_iter()
            .map(|symbol| {
                let shared = shared.clone();
                tokio::spawn(async move {
                    shared
                        .plan_entry(&signal(symbol, OrderSide::Buy, 50.0), 1000.0)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut approvals = 0;
        for handle in handles {
            if let EntryDecision::Approved(_) = handle.await.unwrap() {
                approvals += 1;
            }
        }
        assert_eq!(approvals, 1);
        assert_eq!(shared.lock().await.open_count(), 1);
    }

    #[tokio::test]
    async fn signal_check_slot_is_consumed_once() {
        let (desk, _) = make_desk(RiskConfig::default());
        let shared = SharedDesk::new(desk);
        assert!(shared.try_begin_signal_check("BTCUSDT").await);
        assert!(!shared.try_begin_signal_check("BTCUSDT").await);
        assert!(shared.try_begin_signal_check("ETHUSDT").await);
    }
}
