use common::OhlcBar;

/// Rolling sample standard deviation (n - 1 denominator) of the last
/// `window` closes.
#[derive(Debug, Clone)]
pub struct StdDevIndicator {
    pub window: usize,
}

impl StdDevIndicator {
    pub fn new(window: usize) -> Self {
        assert!(window >= 2, "Volatility window must be >= 2");
        Self { window }
    }

    /// Returns `None` if there are fewer than `window` closes.
    pub fn compute(&self, closes: &[f64]) -> Option<f64> {
        if closes.len() < self.window {
            return None;
        }
        let slice = &closes[closes.len() - self.window..];
        let n = self.window as f64;
        let mean = slice.iter().sum::<f64>() / n;
        let variance = slice.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
        Some(variance.sqrt())
    }
}

/// Average True Range: plain mean of the last `period` true ranges.
#[derive(Debug, Clone)]
pub struct AtrIndicator {
    pub period: usize,
}

impl AtrIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self { period }
    }

    /// Needs `period + 1` bars: every true range looks at the previous close.
    pub fn compute(&self, bars: &[OhlcBar]) -> Option<f64> {
        if bars.len() < self.period + 1 {
            return None;
        }
        let window = &bars[bars.len() - (self.period + 1)..];
        let sum: f64 = window
            .windows(2)
            .map(|w| true_range(&w[1], w[0].close))
            .sum();
        Some(sum / self.period as f64)
    }
}

/// `max(high - low, |high - prev_close|, |low - prev_close|)`
pub fn true_range(bar: &OhlcBar, prev_close: f64) -> f64 {
    (bar.high - bar.low)
        .max((bar.high - prev_close).abs())
        .max((bar.low - prev_close).abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(i: i64, high: f64, low: f64, close: f64) -> OhlcBar {
        OhlcBar {
            timestamp: Utc.timestamp_opt(1_700_000_000 + i * 60, 0).unwrap(),
            open: close,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn stddev_of_constant_series_is_zero() {
        let sd = StdDevIndicator::new(5);
        assert_eq!(sd.compute(&[3.0; 5]), Some(0.0));
    }

    #[test]
    fn stddev_uses_sample_denominator() {
        let sd = StdDevIndicator::new(4);
        // mean 5, squared deviations 9+1+1+9 = 20, / 3
        let value = sd.compute(&[2.0, 4.0, 6.0, 8.0]).unwrap();
        assert!((value - (20.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn stddev_needs_full_window() {
        assert!(StdDevIndicator::new(5).compute(&[1.0, 2.0]).is_none());
    }

    #[test]
    fn true_range_accounts_for_gaps() {
        // Gap up: prev close 90, bar range 100..105
        let b = bar(1, 105.0, 100.0, 103.0);
        assert_eq!(true_range(&b, 90.0), 15.0);
        // Inside bar
        assert_eq!(true_range(&b, 102.0), 5.0);
    }

    #[test]
    fn atr_averages_true_ranges() {
        let atr = AtrIndicator::new(2);
        let bars = vec![
            bar(0, 11.0, 9.0, 10.0),
            bar(1, 12.0, 10.0, 11.0), // TR = max(2, 2, 0) = 2
            bar(2, 15.0, 11.0, 14.0), // TR = max(4, 4, 0) = 4
        ];
        assert_eq!(atr.compute(&bars), Some(3.0));
    }

    #[test]
    fn atr_needs_period_plus_one_bars() {
        let atr = AtrIndicator::new(2);
        assert!(atr.compute(&[bar(0, 1.0, 1.0, 1.0), bar(1, 1.0, 1.0, 1.0)]).is_none());
    }
}
