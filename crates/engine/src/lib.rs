pub mod desk;
pub mod lifecycle;

pub use desk::{Desk, EntryDecision, EntryPlan, ExitConfig, SharedDesk};
pub use lifecycle::{SymbolStatus, ThrottleConfig, TradeLifecycleCoordinator, TradingStatus};
