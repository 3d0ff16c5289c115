/// Exponential Moving Average.
///
/// `ema_t = price_t * k + ema_{t-1} * (1 - k)` with `k = 2 / (span + 1)`,
/// seeded with the first close of the series (no SMA warm-up).
#[derive(Debug, Clone)]
pub struct EmaIndicator {
    pub span: usize,
}

impl EmaIndicator {
    pub fn new(span: usize) -> Self {
        assert!(span >= 1, "EMA span must be >= 1");
        Self { span }
    }

    pub fn smoothing(&self) -> f64 {
        2.0 / (self.span as f64 + 1.0)
    }

    /// EMA of the whole series as of its last value.
    /// Returns `None` for an empty slice.
    pub fn compute(&self, closes: &[f64]) -> Option<f64> {
        let (&first, rest) = closes.split_first()?;
        let k = self.smoothing();
        Some(rest.iter().fold(first, |ema, &price| price * k + ema * (1.0 - k)))
    }

    /// EMA value at every point of the series.
    pub fn series(&self, closes: &[f64]) -> Vec<f64> {
        let k = self.smoothing();
        let mut out = Vec::with_capacity(closes.len());
        let mut prev: Option<f64> = None;
        for &price in closes {
            let next = match prev {
                Some(ema) => price * k + ema * (1.0 - k),
                None => price,
            };
            out.push(next);
            prev = Some(next);
        }
        out
    }
}
