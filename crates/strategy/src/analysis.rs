use common::{Error, IndicatorSnapshot, OhlcBar, Result};

use crate::config::IndicatorConfig;
use crate::indicators::{
    AtrIndicator, BollingerIndicator, EmaIndicator, MacdIndicator, RsiIndicator, StdDevIndicator,
    VolumeRatioIndicator,
};

/// Turns a bar history into indicator snapshots.
///
/// Stateless between calls: every snapshot is recomputed from the bars it
/// is given, so two engines with the same config agree on the same input.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    ema_fast: EmaIndicator,
    ema_slow: EmaIndicator,
    rsi: RsiIndicator,
    volatility: StdDevIndicator,
    atr: AtrIndicator,
    macd: MacdIndicator,
    bollinger: BollingerIndicator,
    volume: VolumeRatioIndicator,
}

impl IndicatorEngine {
    pub fn new(config: &IndicatorConfig) -> Self {
        Self {
            ema_fast: EmaIndicator::new(config.ema_fast),
            ema_slow: EmaIndicator::new(config.ema_slow),
            rsi: RsiIndicator::new(config.rsi_period),
            volatility: StdDevIndicator::new(config.volatility_window),
            atr: AtrIndicator::new(config.atr_period),
            macd: MacdIndicator::new(config.macd_fast, config.macd_slow, config.macd_signal),
            bollinger: BollingerIndicator::new(config.bb_window, config.bb_k),
            volume: VolumeRatioIndicator::new(config.volume_window),
        }
    }

    /// Bars needed for one complete snapshot: the largest window any
    /// indicator requires.
    pub fn min_bars(&self) -> usize {
        self.ema_slow
            .span
            .max(self.rsi.period + 1)
            .max(self.volatility.window)
            .max(self.atr.period + 1)
            .max(self.macd.min_len())
            .max(self.bollinger.window)
            .max(self.volume.window)
    }

    /// Snapshot for the latest bar.
    pub fn compute(&self, bars: &[OhlcBar]) -> Result<IndicatorSnapshot> {
        validate_series(bars)?;
        self.require(bars.len(), self.min_bars())?;
        self.snapshot(bars)
    }

    /// Snapshots for the second-to-last and last bar, `(previous, current)`.
    pub fn compute_latest_two(
        &self,
        bars: &[OhlcBar],
    ) -> Result<(IndicatorSnapshot, IndicatorSnapshot)> {
        validate_series(bars)?;
        self.require(bars.len(), self.min_bars() + 1)?;
        let previous = self.snapshot(&bars[..bars.len() - 1])?;
        let current = self.snapshot(bars)?;
        Ok((previous, current))
    }

    fn require(&self, available: usize, required: usize) -> Result<()> {
        if available < required {
            return Err(Error::InsufficientData { required, available });
        }
        Ok(())
    }

    fn snapshot(&self, bars: &[OhlcBar]) -> Result<IndicatorSnapshot> {
        let insufficient = || Error::InsufficientData {
            required: self.min_bars(),
            available: bars.len(),
        };
        let last = bars.last().ok_or_else(insufficient)?;
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

        let macd = self.macd.compute(&closes).ok_or_else(insufficient)?;
        let bands = self.bollinger.compute(&closes).ok_or_else(insufficient)?;

        let snapshot = IndicatorSnapshot {
            timestamp: last.timestamp,
            close: last.close,
            ema_fast: self.ema_fast.compute(&closes).ok_or_else(insufficient)?,
            ema_slow: self.ema_slow.compute(&closes).ok_or_else(insufficient)?,
            rsi: self.rsi.compute(&closes).ok_or_else(insufficient)?,
            volatility: self.volatility.compute(&closes).ok_or_else(insufficient)?,
            atr: self.atr.compute(bars).ok_or_else(insufficient)?,
            macd: macd.macd,
            macd_signal: macd.signal,
            bb_upper: bands.upper,
            bb_middle: bands.middle,
            bb_lower: bands.lower,
            volume_ratio: self.volume.compute(bars).ok_or_else(insufficient)?,
        };

        let values = [
            snapshot.ema_fast,
            snapshot.ema_slow,
            snapshot.rsi,
            snapshot.volatility,
            snapshot.atr,
            snapshot.macd,
            snapshot.macd_signal,
            snapshot.bb_upper,
            snapshot.bb_lower,
            snapshot.volume_ratio,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "non-finite indicator value at {}",
                snapshot.timestamp
            )));
        }
        Ok(snapshot)
    }
}

/// Bars must be finite and strictly increasing in time.
fn validate_series(bars: &[OhlcBar]) -> Result<()> {
    for bar in bars {
        if ![bar.open, bar.high, bar.low, bar.close].iter().all(|p| p.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "non-finite price in bar at {}",
                bar.timestamp
            )));
        }
        if !(bar.volume.is_finite() && bar.volume >= 0.0) {
            return Err(Error::InvalidInput(format!(
                "invalid volume {} in bar at {}",
                bar.volume, bar.timestamp
            )));
        }
    }
    if let Some(w) = bars.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
        return Err(Error::InvalidInput(format!(
            "bars out of order or duplicated at {}",
            w[1].timestamp
        )));
    }
    Ok(())
}
