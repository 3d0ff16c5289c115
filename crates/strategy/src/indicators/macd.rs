use super::ema::EmaIndicator;

/// MACD (Moving Average Convergence/Divergence).
///
/// MACD line = EMA(fast) − EMA(slow), signal = EMA(macd_line, signal). Both
/// EMAs use the same first-close seeding as the crossover EMAs.
#[derive(Debug, Clone)]
pub struct MacdIndicator {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

/// MACD line and signal line as of the last close.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
}

impl MacdValue {
    pub fn histogram(&self) -> f64 {
        self.macd - self.signal
    }
}

impl MacdIndicator {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast >= 1 && signal >= 1, "MACD periods must be >= 1");
        assert!(fast < slow, "MACD fast period must be less than slow period");
        Self { fast, slow, signal }
    }

    /// Closes needed before the signal line has seen `signal` MACD values
    /// past the slow warm-up.
    pub fn min_len(&self) -> usize {
        self.slow + self.signal - 1
    }

    /// Returns `None` if there are fewer than `min_len()` closes.
    pub fn compute(&self, closes: &[f64]) -> Option<MacdValue> {
        if closes.len() < self.min_len() {
            return None;
        }
        let fast = EmaIndicator::new(self.fast).series(closes);
        let slow = EmaIndicator::new(self.slow).series(closes);
        let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = EmaIndicator::new(self.signal).compute(&line)?;
        Some(MacdValue {
            macd: *line.last()?,
            signal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending_up(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64 * 0.5).collect()
    }

    #[test]
    fn macd_returns_none_with_insufficient_data() {
        let macd = MacdIndicator::new(12, 26, 9);
        assert_eq!(macd.min_len(), 34);
        assert!(macd.compute(&[100.0; 33]).is_none());
        assert!(macd.compute(&[100.0; 34]).is_some());
    }

    #[test]
    fn macd_is_flat_on_constant_prices() {
        let value = MacdIndicator::new(3, 6, 3).compute(&[50.0; 20]).unwrap();
        assert_eq!(value.macd, 0.0);
        assert_eq!(value.signal, 0.0);
    }

    #[test]
    fn macd_leads_signal_in_steady_uptrend() {
        let value = MacdIndicator::new(3, 6, 3).compute(&trending_up(40)).unwrap();
        assert!(value.macd > 0.0);
        assert!(value.histogram() > 0.0);
    }

    #[test]
    fn macd_turns_below_signal_after_reversal() {
        let mut prices = trending_up(30);
        prices.extend((0..5).map(|i| 114.5 - i as f64 * 2.0));
        let value = MacdIndicator::new(3, 6, 3).compute(&prices).unwrap();
        assert!(value.histogram() < 0.0);
    }
}
