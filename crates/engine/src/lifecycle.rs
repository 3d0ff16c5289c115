use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use common::config::{env_list, env_or};
use common::{Clock, Error, Position, RejectionReason, Result};

/// Signal and order pacing, plus the trading-hours window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Minimum seconds between two signal checks of one symbol.
    pub signal_check_interval_secs: i64,
    /// Minimum seconds between two orders on one symbol.
    pub order_cooldown_secs: i64,
    /// Orders allowed per symbol per UTC day.
    pub max_daily_orders: u32,
    /// First trading hour (UTC, inclusive).
    pub trading_hours_start: u32,
    /// Last trading hour (UTC, exclusive).
    pub trading_hours_end: u32,
    /// ISO weekdays trading is allowed on, 1 = Monday.
    pub trading_days: Vec<u32>,
    /// Positions held longer than this are closed.
    pub max_position_time_mins: i64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            signal_check_interval_secs: 300,
            order_cooldown_secs: 1800,
            max_daily_orders: 10,
            trading_hours_start: 9,
            trading_hours_end: 21,
            trading_days: vec![1, 2, 3, 4, 5],
            max_position_time_mins: 10,
        }
    }
}

impl ThrottleConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        let trading_days = env_list("TRADING_DAYS", &["1", "2", "3", "4", "5"])?
            .iter()
            .map(|s| {
                s.parse::<u32>()
                    .map_err(|_| Error::Config(format!("TRADING_DAYS contains non-numeric day '{s}'")))
            })
            .collect::<Result<Vec<_>>>()?;

        let cfg = Self {
            signal_check_interval_secs: env_or("SIGNAL_CHECK_INTERVAL", d.signal_check_interval_secs)?,
            order_cooldown_secs: env_or("ORDER_COOLDOWN", d.order_cooldown_secs)?,
            max_daily_orders: env_or("MAX_DAILY_ORDERS", d.max_daily_orders)?,
            trading_hours_start: env_or("TRADING_HOURS_START", d.trading_hours_start)?,
            trading_hours_end: env_or("TRADING_HOURS_END", d.trading_hours_end)?,
            trading_days,
            max_position_time_mins: env_or("MAX_POSITION_TIME", d.max_position_time_mins)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.signal_check_interval_secs < 0 || self.order_cooldown_secs < 0 {
            return Err(Error::Config("intervals must not be negative".into()));
        }
        if self.trading_hours_start >= self.trading_hours_end || self.trading_hours_end > 24 {
            return Err(Error::Config(format!(
                "trading hours must satisfy start < end <= 24, got {}..{}",
                self.trading_hours_start, self.trading_hours_end
            )));
        }
        if self.trading_days.is_empty() || self.trading_days.iter().any(|d| !(1..=7).contains(d)) {
            return Err(Error::Config(format!(
                "TRADING_DAYS must be ISO weekdays 1-7, got {:?}",
                self.trading_days
            )));
        }
        if self.max_position_time_mins <= 0 {
            return Err(Error::Config("MAX_POSITION_TIME must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct SymbolThrottle {
    last_signal_check: Option<DateTime<Utc>>,
    last_order: Option<DateTime<Utc>>,
    orders_date: NaiveDate,
    orders_today: u32,
}

impl SymbolThrottle {
    fn new(today: NaiveDate) -> Self {
        Self {
            last_signal_check: None,
            last_order: None,
            orders_date: today,
            orders_today: 0,
        }
    }

    fn roll_day(&mut self, today: NaiveDate) {
        if self.orders_date != today {
            self.orders_date = today;
            self.orders_today = 0;
        }
    }
}

/// Point-in-time view of throttling state, for dashboards and logs.
#[derive(Debug, Clone, Serialize)]
pub struct TradingStatus {
    pub now: DateTime<Utc>,
    pub is_trading_time: bool,
    pub trading_hours: String,
    pub max_daily_orders: u32,
    pub open_positions: usize,
    pub symbols: BTreeMap<String, SymbolStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolStatus {
    pub next_signal_check: DateTime<Utc>,
    pub next_order: DateTime<Utc>,
    pub orders_today: u32,
    pub position_open: bool,
}

/// Per-symbol position registry and pacing.
///
/// Each symbol moves Idle → Open → Idle, and only on confirmed fills. A
/// second open for a symbol that already has a position is a protocol
/// violation by the caller and is reported, never resolved by overwriting.
pub struct TradeLifecycleCoordinator {
    config: ThrottleConfig,
    clock: Arc<dyn Clock>,
    positions: HashMap<String, Position>,
    throttles: HashMap<String, SymbolThrottle>,
}

impl TradeLifecycleCoordinator {
    pub fn new(config: ThrottleConfig, clock: Arc<dyn Clock>) -> Self {
        info!(
            check_interval = config.signal_check_interval_secs,
            order_cooldown = config.order_cooldown_secs,
            max_daily_orders = config.max_daily_orders,
            hours = %format!("{}:00-{}:00 UTC", config.trading_hours_start, config.trading_hours_end),
            days = ?config.trading_days,
            "Trade lifecycle coordinator initialized"
        );
        Self {
            config,
            clock,
            positions: HashMap::new(),
            throttles: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    pub fn max_hold(&self) -> Duration {
        Duration::minutes(self.config.max_position_time_mins)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_trading_time(&self) -> bool {
        self.is_trading_time_at(self.clock.now())
    }

    fn is_trading_time_at(&self, at: DateTime<Utc>) -> bool {
        let weekday = at.weekday().number_from_monday();
        if !self.config.trading_days.contains(&weekday) {
            return false;
        }
        (self.config.trading_hours_start..self.config.trading_hours_end).contains(&at.hour())
    }

    // ── Signal pacing ─────────────────────────────────────────────────────

    /// True at most once per check interval per symbol, inside trading hours.
    pub fn can_check_signals(&self, symbol: &str) -> bool {
        let now = self.clock.now();
        if let Some(last) = self.throttles.get(symbol).and_then(|t| t.last_signal_check) {
            if now - last < Duration::seconds(self.config.signal_check_interval_secs) {
                debug!(symbol, "Signal check skipped: interval not elapsed");
                return false;
            }
        }
        if !self.is_trading_time_at(now) {
            debug!(symbol, "Signal check skipped: outside trading hours");
            return false;
        }
        true
    }

    pub fn register_signal(&mut self, symbol: &str) {
        let now = self.clock.now();
        self.throttle_mut(symbol).last_signal_check = Some(now);
        debug!(symbol, at = %now, "Signal check registered");
    }

    pub fn next_signal_time(&self, symbol: &str) -> DateTime<Utc> {
        let now = self.clock.now();
        match self.throttles.get(symbol).and_then(|t| t.last_signal_check) {
            Some(last) => (last + Duration::seconds(self.config.signal_check_interval_secs)).max(now),
            None => now,
        }
    }

    // ── Order pacing ──────────────────────────────────────────────────────

    /// Why an order on `symbol` may not be placed right now, if anything.
    pub fn check_order(&mut self, symbol: &str) -> Result<(), RejectionReason> {
        let now = self.clock.now();
        let max_daily_orders = self.config.max_daily_orders;
        let cooldown = Duration::seconds(self.config.order_cooldown_secs);

        let throttle = self.throttle_mut(symbol);
        throttle.roll_day(now.date_naive());

        if throttle.orders_today >= max_daily_orders {
            info!(symbol, orders_today = throttle.orders_today, "Order skipped: daily limit reached");
            return Err(RejectionReason::DailyOrderLimit);
        }
        if let Some(last) = throttle.last_order {
            if now - last < cooldown {
                debug!(symbol, "Order skipped: cooldown not elapsed");
                return Err(RejectionReason::OrderCooldown);
            }
        }
        if !self.is_trading_time_at(now) {
            debug!(symbol, "Order skipped: outside trading hours");
            return Err(RejectionReason::OutsideTradingHours);
        }
        Ok(())
    }

    pub fn can_place_order(&mut self, symbol: &str) -> bool {
        self.check_order(symbol).is_ok()
    }

    pub fn register_order(&mut self, symbol: &str) {
        let now = self.clock.now();
        let throttle = self.throttle_mut(symbol);
        throttle.roll_day(now.date_naive());
        throttle.last_order = Some(now);
        throttle.orders_today += 1;
        info!(symbol, orders_today = throttle.orders_today, "Order registered");
    }

    pub fn next_order_time(&self, symbol: &str) -> DateTime<Utc> {
        let now = self.clock.now();
        match self.throttles.get(symbol).and_then(|t| t.last_order) {
            Some(last) => (last + Duration::seconds(self.config.order_cooldown_secs)).max(now),
            None => now,
        }
    }

    // ── Position registry ─────────────────────────────────────────────────

    /// Record a confirmed entry fill.
    pub fn open_position(&mut self, position: Position) -> Result<()> {
        if let Some(existing) = self.positions.get(&position.symbol) {
            warn!(
                symbol = %position.symbol,
                existing_entry = existing.entry_price,
                "Open rejected: position already open"
            );
            return Err(Error::StateConflict(format!(
                "position already open for {} (entry {}, signal {})",
                position.symbol, existing.entry_price, existing.signal_id
            )));
        }
        info!(
            symbol = %position.symbol,
            side = %position.side,
            entry = position.entry_price,
            qty = position.quantity,
            stop_loss = position.stop_loss,
            take_profit = position.take_profit,
            "Position opened"
        );
        self.positions.insert(position.symbol.clone(), position);
        Ok(())
    }

    /// Remove and return the open position for `symbol` after a confirmed
    /// exit fill.
    pub fn close_position(&mut self, symbol: &str) -> Result<Position> {
        let position = self.positions.remove(symbol).ok_or_else(|| {
            warn!(symbol, "Close rejected: no open position");
            Error::StateConflict(format!("no open position for {symbol}"))
        })?;
        info!(symbol, entry = position.entry_price, "Position removed from registry");
        Ok(position)
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    pub fn status(&self) -> TradingStatus {
        let now = self.clock.now();
        let today = now.date_naive();
        let mut symbols = BTreeMap::new();
        for (symbol, throttle) in &self.throttles {
            let orders_today = if throttle.orders_date == today { throttle.orders_today } else { 0 };
            symbols.insert(
                symbol.clone(),
                SymbolStatus {
                    next_signal_check: self.next_signal_time(symbol),
                    next_order: self.next_order_time(symbol),
                    orders_today,
                    position_open: self.positions.contains_key(symbol),
                },
            );
        }
        TradingStatus {
            now,
            is_trading_time: self.is_trading_time_at(now),
            trading_hours: format!(
                "{}:00 - {}:00 UTC",
                self.config.trading_hours_start, self.config.trading_hours_end
            ),
            max_daily_orders: self.config.max_daily_orders,
            open_positions: self.positions.len(),
            symbols,
        }
    }

    fn throttle_mut(&mut self, symbol: &str) -> &mut SymbolThrottle {
        let today = self.clock.now().date_naive();
        self.throttles
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolThrottle::new(today))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
