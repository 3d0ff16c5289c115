use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One closed OHLC candle. Per symbol, bars arrive oldest first with
/// strictly increasing timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The side that flattens a position opened on `self`.
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// An order to be submitted to the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub pair: String,
    pub side: OrderSide,
    pub quantity: f64,
    /// `None` = market order; `Some(price)` = limit order.
    pub price: Option<f64>,
}

impl Order {
    pub fn market(pair: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pair: pair.into(),
            side,
            quantity,
            price: None,
        }
    }
}

/// Confirmation of a filled order returned by the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub pair: String,
    pub side: OrderSide,
    pub fill_price: f64,
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
}

/// Indicator values as of one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    /// Timestamp of the bar the values were computed for.
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    /// 0..=100
    pub rsi: f64,
    /// Rolling standard deviation of close, in price units.
    pub volatility: f64,
    pub atr: f64,
    /// MACD line (fast EMA minus slow EMA) and its signal line.
    pub macd: f64,
    pub macd_signal: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
    /// Latest volume over the rolling mean volume; 1.0 when no volume traded.
    pub volume_ratio: f64,
}

impl IndicatorSnapshot {
    /// Volatility as a fraction of the close, the unit the stop-loss
    /// widening expects.
    pub fn relative_volatility(&self) -> f64 {
        if self.close > 0.0 {
            self.volatility / self.close
        } else {
            0.0
        }
    }
}

/// A detected EMA crossover that passed the RSI filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEvent {
    pub id: String,
    pub symbol: String,
    pub direction: OrderSide,
    /// Close of the bar the crossover completed on.
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    /// Confirmation score in percent, 0..=100.
    pub strength: f64,
    pub analysis: IndicatorSnapshot,
}

impl SignalEvent {
    pub fn new(
        symbol: impl Into<String>,
        direction: OrderSide,
        strength: f64,
        analysis: IndicatorSnapshot,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            direction,
            price: analysis.close,
            timestamp: analysis.timestamp,
            strength,
            analysis,
        }
    }
}

/// Why an open position should be closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    MaxHoldTime,
    /// Indicators turned against the position before either bracket hit.
    Indicators,
    Manual,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop-loss triggered"),
            ExitReason::TakeProfit => write!(f, "take-profit reached"),
            ExitReason::MaxHoldTime => write!(f, "maximum position time exceeded"),
            ExitReason::Indicators => write!(f, "technical indicators suggest exit"),
            ExitReason::Manual => write!(f, "closed manually"),
        }
    }
}

/// An open position. At most one exists per symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: OrderSide,
    pub entry_price: f64,
    pub quantity: f64,
    pub open_time: DateTime<Utc>,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub signal_id: String,
}

impl Position {
    /// Profit or loss in quote currency if closed at `price`.
    pub fn unrealized_pl(&self, price: f64) -> f64 {
        match self.side {
            OrderSide::Buy => (price - self.entry_price) * self.quantity,
            OrderSide::Sell => (self.entry_price - price) * self.quantity,
        }
    }

    /// Bracket and hold-time check. Price levels take precedence over time.
    pub fn exit_reason(
        &self,
        price: f64,
        now: DateTime<Utc>,
        max_hold: Duration,
    ) -> Option<ExitReason> {
        let (stopped, target_hit) = match self.side {
            OrderSide::Buy => (price <= self.stop_loss, price >= self.take_profit),
            OrderSide::Sell => (price >= self.stop_loss, price <= self.take_profit),
        };

        if stopped {
            Some(ExitReason::StopLoss)
        } else if target_hit {
            Some(ExitReason::TakeProfit)
        } else if now - self.open_time > max_hold {
            Some(ExitReason::MaxHoldTime)
        } else {
            None
        }
    }

    /// Whether the latest indicators argue for leaving early: RSI past the
    /// far band edge, close back through the fast EMA, or MACD through its
    /// signal line against the position.
    pub fn indicators_turned(
        &self,
        analysis: &IndicatorSnapshot,
        oversold: f64,
        overbought: f64,
    ) -> bool {
        match self.side {
            OrderSide::Buy => {
                analysis.rsi > overbought
                    || analysis.close < analysis.ema_fast
                    || analysis.macd < analysis.macd_signal
            }
            OrderSide::Sell => {
                analysis.rsi < oversold
                    || analysis.close > analysis.ema_fast
                    || analysis.macd > analysis.macd_signal
            }
        }
    }
}

/// Outcome class of a closed trade. Break-even counts as a loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeResult {
    Win,
    Loss,
}

impl TradeResult {
    pub fn from_pl(profit_loss: f64) -> Self {
        if profit_loss > 0.0 {
            TradeResult::Win
        } else {
            TradeResult::Loss
        }
    }
}

/// One entry of the bounded trade history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub profit_loss: f64,
    pub result: TradeResult,
}

/// A fully closed round trip, handed to the persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub symbol: String,
    pub side: OrderSide,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub profit_loss: f64,
    pub result: TradeResult,
    pub exit_reason: ExitReason,
    pub signal_id: String,
}

/// Reason a new entry was not allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectionReason {
    DailyLossLimit,
    MaxOpenPositions,
    PositionLossLimit,
    DailyOrderLimit,
    OrderCooldown,
    OutsideTradingHours,
    PositionAlreadyOpen,
    Other(String),
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::DailyLossLimit => write!(f, "daily loss limit reached"),
            RejectionReason::MaxOpenPositions => write!(f, "maximum open positions reached"),
            RejectionReason::PositionLossLimit => write!(f, "position risk above per-trade limit"),
            RejectionReason::DailyOrderLimit => write!(f, "daily order limit reached"),
            RejectionReason::OrderCooldown => write!(f, "order cooldown active"),
            RejectionReason::OutsideTradingHours => write!(f, "outside trading hours"),
            RejectionReason::PositionAlreadyOpen => write!(f, "position already open"),
            RejectionReason::Other(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn position(side: OrderSide) -> Position {
        Position {
            symbol: "BTCUSDT".into(),
            side,
            entry_price: 100.0,
            quantity: 2.0,
            open_time: Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap(),
            stop_loss: if side == OrderSide::Buy { 98.0 } else { 102.0 },
            take_profit: if side == OrderSide::Buy { 104.0 } else { 96.0 },
            signal_id: "sig".into(),
        }
    }

    #[test]
    fn unrealized_pl_respects_side() {
        assert_eq!(position(OrderSide::Buy).unrealized_pl(101.0), 2.0);
        assert_eq!(position(OrderSide::Sell).unrealized_pl(101.0), -2.0);
    }

    #[test]
    fn long_bracket_exits() {
        let pos = position(OrderSide::Buy);
        let now = pos.open_time + Duration::minutes(1);
        let hold = Duration::minutes(10);
        assert_eq!(pos.exit_reason(97.5, now, hold), Some(ExitReason::StopLoss));
        assert_eq!(pos.exit_reason(104.0, now, hold), Some(ExitReason::TakeProfit));
        assert_eq!(pos.exit_reason(101.0, now, hold), None);
    }

    #[test]
    fn short_bracket_exits() {
        let pos = position(OrderSide::Sell);
        let now = pos.open_time + Duration::minutes(1);
        let hold = Duration::minutes(10);
        assert_eq!(pos.exit_reason(102.5, now, hold), Some(ExitReason::StopLoss));
        assert_eq!(pos.exit_reason(95.0, now, hold), Some(ExitReason::TakeProfit));
    }

    #[test]
    fn max_hold_time_exit() {
        let pos = position(OrderSide::Buy);
        let now = pos.open_time + Duration::minutes(11);
        assert_eq!(
            pos.exit_reason(100.0, now, Duration::minutes(10)),
            Some(ExitReason::MaxHoldTime)
        );
    }

    fn analysis(
        close: f64,
        ema_fast: f64,
        rsi: f64,
        macd: f64,
        macd_signal: f64,
    ) -> IndicatorSnapshot {
        IndicatorSnapshot {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 12, 5, 0).unwrap(),
            close,
            ema_fast,
            ema_slow: 100.0,
            rsi,
            volatility: 1.0,
            atr: 1.0,
            macd,
            macd_signal,
            bb_upper: 105.0,
            bb_middle: 100.0,
            bb_lower: 95.0,
            volume_ratio: 1.0,
        }
    }

    #[test]
    fn indicator_exit_for_long() {
        let pos = position(OrderSide::Buy);
        assert!(!pos.indicators_turned(&analysis(101.0, 100.5, 60.0, 0.2, 0.1), 30.0, 70.0));
        assert!(pos.indicators_turned(&analysis(101.0, 100.5, 75.0, 0.2, 0.1), 30.0, 70.0));
        assert!(pos.indicators_turned(&analysis(100.0, 100.5, 60.0, 0.2, 0.1), 30.0, 70.0));
        assert!(pos.indicators_turned(&analysis(101.0, 100.5, 60.0, 0.1, 0.2), 30.0, 70.0));
    }

    #[test]
    fn indicator_exit_for_short_is_mirrored() {
        let pos = position(OrderSide::Sell);
        assert!(!pos.indicators_turned(&analysis(99.0, 99.5, 40.0, -0.2, -0.1), 30.0, 70.0));
        assert!(pos.indicators_turned(&analysis(99.0, 99.5, 25.0, -0.2, -0.1), 30.0, 70.0));
        assert!(pos.indicators_turned(&analysis(100.0, 99.5, 40.0, -0.2, -0.1), 30.0, 70.0));
    }

    #[test]
    fn break_even_counts_as_loss() {
        assert_eq!(TradeResult::from_pl(0.0), TradeResult::Loss);
        assert_eq!(TradeResult::from_pl(0.01), TradeResult::Win);
    }
}
