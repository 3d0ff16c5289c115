pub mod analysis;
pub mod config;
pub mod detector;
pub mod indicators;

pub use analysis::IndicatorEngine;
pub use config::{IndicatorConfig, SignalConfig, StrategyConfig};
pub use detector::{signal_strength, SignalDetector};

use common::{IndicatorSnapshot, OhlcBar, Result, SignalEvent};

/// All strategy implementations must satisfy this trait.
pub trait Strategy: Send + Sync {
    /// Human-readable name of this strategy instance.
    fn name(&self) -> &str;

    /// Evaluate the full bar history of `symbol` (oldest first) after a new
    /// bar closed. Returns the latest indicator snapshot and the signal, if
    /// one fired on this bar.
    fn evaluate(
        &mut self,
        symbol: &str,
        bars: &[OhlcBar],
    ) -> Result<(IndicatorSnapshot, Option<SignalEvent>)>;

    /// Indicator snapshot for the latest bar, without touching detector
    /// state. Used to judge exits on open positions.
    fn analyze(&self, bars: &[OhlcBar]) -> Result<IndicatorSnapshot>;
}

/// EMA fast/slow crossover, filtered by RSI.
pub struct EmaCrossStrategy {
    name: String,
    engine: IndicatorEngine,
    detector: SignalDetector,
}

impl EmaCrossStrategy {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            name: format!(
                "EMA {}/{} cross, RSI {} band {}-{}",
                config.indicators.ema_fast,
                config.indicators.ema_slow,
                config.indicators.rsi_period,
                config.signal.oversold,
                config.signal.overbought
            ),
            engine: IndicatorEngine::new(&config.indicators),
            detector: SignalDetector::new(config.signal.clone()),
        }
    }

    /// Bars needed before the first evaluation can succeed.
    pub fn warmup_bars(&self) -> usize {
        self.engine.min_bars() + 1
    }
}

impl Strategy for EmaCrossStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &mut self,
        symbol: &str,
        bars: &[OhlcBar],
    ) -> Result<(IndicatorSnapshot, Option<SignalEvent>)> {
        let (previous, current) = self.engine.compute_latest_two(bars)?;
        // A cold detector gets the previous bar first so the very first
        // evaluation can already see an edge.
        if !self.detector.has_history(symbol) {
            self.detector.on_snapshot(symbol, previous);
        }
        let signal = self.detector.on_snapshot(symbol, current);
        Ok((current, signal))
    }

    fn analyze(&self, bars: &[OhlcBar]) -> Result<IndicatorSnapshot> {
        self.engine.compute(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use common::{Error, OrderSide};

    fn config() -> StrategyConfig {
        StrategyConfig {
            indicators: IndicatorConfig {
                ema_fast: 2,
                ema_slow: 4,
                rsi_period: 3,
                volatility_window: 3,
                atr_period: 2,
                macd_fast: 2,
                macd_slow: 3,
                macd_signal: 2,
                bb_window: 3,
                bb_k: 2.0,
                volume_window: 3,
            },
            signal: SignalConfig {
                oversold: 5.0,
                overbought: 95.0,
                ..SignalConfig::default()
            },
        }
    }

    fn bars(closes: &[f64]) -> Vec<OhlcBar> {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| OhlcBar {
                timestamp: start + Duration::minutes(i as i64),
                open: c,
                high: c + 0.5,
                low: c - 0.5,
                close: c,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn warmup_is_reported_as_insufficient_data() {
        let mut s = EmaCrossStrategy::new(&config());
        assert_eq!(s.warmup_bars(), 5);
        let err = s.evaluate("BTCUSDT", &bars(&[1.0, 2.0, 3.0])).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { .. }));
    }

    #[test]
    fn downtrend_reversal_emits_buy_once() {
        let mut s = EmaCrossStrategy::new(&config());
        // Falling then a mixed rebound keeps RSI off the extremes.
        let closes = [20.0, 19.0, 18.0, 17.0, 16.0, 15.0, 16.0, 15.5, 17.0, 16.5, 18.0];
        let mut buys = 0;
        for n in s.warmup_bars()..=closes.len() {
            let (_, signal) = s.evaluate("BTCUSDT", &bars(&closes[..n])).unwrap();
            if let Some(sig) = signal {
                assert_eq!(sig.direction, OrderSide::Buy);
                buys += 1;
            }
        }
        assert_eq!(buys, 1);
    }

    #[test]
    fn analyze_leaves_detector_cold() {
        let s = EmaCrossStrategy::new(&config());
        let closes = [20.0, 19.0, 18.0, 17.0, 16.0, 15.0];
        let snap = s.analyze(&bars(&closes)).unwrap();
        assert_eq!(snap.close, 15.0);
        assert!(snap.ema_fast < snap.ema_slow);
        assert!(!s.detector.has_history("BTCUSDT"));
    }
}
