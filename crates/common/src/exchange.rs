use async_trait::async_trait;

use crate::{Fill, Order, Result};

/// Abstraction over the exchange connection.
///
/// The decision core never calls this itself. The driver owns the client,
/// fetches prices and balance through it, and hands the plain values to the
/// core. Approved entry plans come back as orders which the driver submits
/// here; the resulting `Fill` is what confirms a position open or close.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Submit an order and return the fill confirmation.
    async fn submit_order(&self, order: &Order) -> Result<Fill>;

    /// Get the latest price for a trading pair.
    async fn current_price(&self, pair: &str) -> Result<f64>;

    /// Free quote-currency balance available for sizing.
    async fn balance(&self) -> Result<f64>;
}
