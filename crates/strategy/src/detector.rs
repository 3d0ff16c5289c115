use std::collections::HashMap;

use tracing::{debug, info};

use common::{IndicatorSnapshot, OrderSide, SignalEvent};

use crate::config::SignalConfig;

#[derive(Debug, Clone, Copy)]
struct Crossover {
    direction: OrderSide,
    emitted: bool,
}

#[derive(Debug, Clone)]
struct SymbolState {
    last: IndicatorSnapshot,
    /// Most recent crossover, whether it was emitted or filtered out.
    last_cross: Option<Crossover>,
}

/// RSI range the strength score treats as neither stretched nor exhausted.
const NEUTRAL_RSI: (f64, f64) = (35.0, 65.0);

/// Edge-triggered EMA crossover detector with an RSI band filter.
///
/// Keeps the previous snapshot per symbol. A signal fires only on the bar
/// where the fast EMA moves to the other side of the slow EMA, never while
/// it merely stays there. Crossovers in overheated volatility or on thin
/// volume are treated as false signals. After an emitted signal, the same
/// direction cannot fire again until an opposite crossover has happened.
#[derive(Debug, Clone)]
pub struct SignalDetector {
    config: SignalConfig,
    state: HashMap<String, SymbolState>,
}

impl SignalDetector {
    pub fn new(config: SignalConfig) -> Self {
        Self {
            config,
            state: HashMap::new(),
        }
    }

    /// Whether a previous snapshot is held for `symbol`.
    pub fn has_history(&self, symbol: &str) -> bool {
        self.state.contains_key(symbol)
    }

    /// Forget everything seen for `symbol`.
    pub fn reset(&mut self, symbol: &str) {
        self.state.remove(symbol);
    }

    /// Feed the next snapshot for `symbol`. Returns at most one signal.
    ///
    /// Snapshots not newer than the last one seen are ignored.
    pub fn on_snapshot(&mut self, symbol: &str, snapshot: IndicatorSnapshot) -> Option<SignalEvent> {
        let Some(state) = self.state.get_mut(symbol) else {
            self.state.insert(
                symbol.to_string(),
                SymbolState {
                    last: snapshot,
                    last_cross: None,
                },
            );
            return None;
        };

        if snapshot.timestamp <= state.last.timestamp {
            debug!(symbol, at = %snapshot.timestamp, "Stale snapshot ignored");
            return None;
        }

        let previous = std::mem::replace(&mut state.last, snapshot);
        let direction = crossover(&previous, &snapshot)?;

        if let Some(last) = state.last_cross {
            if last.emitted && last.direction == direction {
                debug!(symbol, side = %direction, "Repeated crossover without reversal, suppressed");
                return None;
            }
        }
        state.last_cross = Some(Crossover {
            direction,
            emitted: false,
        });

        if snapshot.rsi <= self.config.oversold || snapshot.rsi >= self.config.overbought {
            debug!(
                symbol,
                side = %direction,
                rsi = snapshot.rsi,
                "Crossover filtered: RSI outside band"
            );
            return None;
        }
        if snapshot.relative_volatility() > self.config.max_volatility {
            debug!(
                symbol,
                side = %direction,
                volatility = snapshot.relative_volatility(),
                "Crossover filtered: volatility too high"
            );
            return None;
        }
        if snapshot.volume_ratio < self.config.min_volume_ratio {
            debug!(
                symbol,
                side = %direction,
                volume_ratio = snapshot.volume_ratio,
                "Crossover filtered: volume too thin"
            );
            return None;
        }

        let strength = signal_strength(direction, &snapshot);
        if strength < self.config.min_strength {
            debug!(symbol, side = %direction, strength, "Crossover filtered: weak confirmation");
            return None;
        }

        state.last_cross = Some(Crossover {
            direction,
            emitted: true,
        });
        let event = SignalEvent::new(symbol, direction, strength, snapshot);
        info!(
            symbol,
            side = %direction,
            price = event.price,
            rsi = snapshot.rsi,
            ema_fast = snapshot.ema_fast,
            ema_slow = snapshot.ema_slow,
            strength,
            "Crossover signal"
        );
        Some(event)
    }
}

/// Weighted share of indicators that agree with `direction`, in percent.
///
/// Price vs fast EMA and fast vs slow EMA weigh 1.2, MACD vs its signal line
/// 1.1; a neutral RSI, price vs the middle band and above-average volume
/// weigh 1.0 each.
pub fn signal_strength(direction: OrderSide, s: &IndicatorSnapshot) -> f64 {
    let (price, trend, momentum, band) = match direction {
        OrderSide::Buy => (
            s.close > s.ema_fast,
            s.ema_fast > s.ema_slow,
            s.macd > s.macd_signal,
            s.close > s.bb_middle,
        ),
        OrderSide::Sell => (
            s.close < s.ema_fast,
            s.ema_fast < s.ema_slow,
            s.macd < s.macd_signal,
            s.close < s.bb_middle,
        ),
    };
    let conditions = [
        (price, 1.2),
        (trend, 1.2),
        (s.rsi > NEUTRAL_RSI.0 && s.rsi < NEUTRAL_RSI.1, 1.0),
        (momentum, 1.1),
        (band, 1.0),
        (s.volume_ratio >= 1.0, 1.0),
    ];
    let total: f64 = conditions.iter().map(|(_, w)| w).sum();
    let met: f64 = conditions.iter().filter(|(ok, _)| *ok).map(|(_, w)| w).sum();
    met / total * 100.0
}

/// BUY when fast moves from at-or-below slow to above it; SELL on the mirror.
fn crossover(previous: &IndicatorSnapshot, current: &IndicatorSnapshot) -> Option<OrderSide> {
    if previous.ema_fast <= previous.ema_slow && current.ema_fast > current.ema_slow {
        Some(OrderSide::Buy)
    } else if previous.ema_fast >= previous.ema_slow && current.ema_fast < current.ema_slow {
        Some(OrderSide::Sell)
    } else {
        None
    }
}
