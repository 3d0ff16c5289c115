pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod volatility;
pub mod volume;

pub use bollinger::{Bands, BollingerIndicator};
pub use ema::EmaIndicator;
pub use macd::{MacdIndicator, MacdValue};
pub use rsi::RsiIndicator;
pub use volatility::{AtrIndicator, StdDevIndicator};
pub use volume::VolumeRatioIndicator;
