pub mod clock;
pub mod config;
pub mod error;
pub mod exchange;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use exchange::ExchangeClient;
pub use types::*;
