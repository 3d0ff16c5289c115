use common::OhlcBar;

/// Latest bar's volume relative to the mean volume of the last `window` bars
/// (the latest included).
#[derive(Debug, Clone)]
pub struct VolumeRatioIndicator {
    pub window: usize,
}

impl VolumeRatioIndicator {
    pub fn new(window: usize) -> Self {
        assert!(window >= 1, "Volume window must be >= 1");
        Self { window }
    }

    /// A window with no traded volume reports 1.0.
    pub fn compute(&self, bars: &[OhlcBar]) -> Option<f64> {
        if bars.len() < self.window {
            return None;
        }
        let slice = &bars[bars.len() - self.window..];
        let mean = slice.iter().map(|b| b.volume).sum::<f64>() / self.window as f64;
        let current = slice.last()?.volume;
        if mean > 0.0 {
            Some(current / mean)
        } else {
            Some(1.0)
        }
    }
}
