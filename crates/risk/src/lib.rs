pub mod config;
pub mod daily;
pub mod history;
pub mod manager;

pub use config::RiskConfig;
pub use daily::DailyRiskState;
pub use history::{TradeHistory, TradeStats};
pub use manager::RiskManager;
