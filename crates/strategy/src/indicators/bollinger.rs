use super::volatility::StdDevIndicator;

/// Bollinger Bands: SMA of the last `window` closes ± `k` sample standard
/// deviations.
#[derive(Debug, Clone)]
pub struct BollingerIndicator {
    pub window: usize,
    pub k: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl BollingerIndicator {
    pub fn new(window: usize, k: f64) -> Self {
        assert!(window >= 2, "Bollinger window must be >= 2");
        Self { window, k }
    }

    pub fn compute(&self, closes: &[f64]) -> Option<Bands> {
        let std = StdDevIndicator::new(self.window).compute(closes)?;
        let slice = &closes[closes.len() - self.window..];
        let middle = slice.iter().sum::<f64>() / self.window as f64;
        Some(Bands {
            upper: middle + self.k * std,
            middle,
            lower: middle - self.k * std,
        })
    }
}
