use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{Clock, Error, ExchangeClient, Fill, Order, OrderSide, Result};

/// Simulated exchange client for replays and paper trading.
///
/// Fills happen at the latest known price with configurable slippage and are
/// timestamped by the injected clock. The cash balance moves by each fill's
/// notional: buys debit it, sells credit it.
pub struct PaperClient {
    /// Quote-currency cash.
    balance: RwLock<f64>,
    /// Latest known price per pair, updated via `update_price`.
    prices: RwLock<HashMap<String, f64>>,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
    clock: Arc<dyn Clock>,
}

impl PaperClient {
    pub fn new(initial_balance: f64, slippage_bps: f64, clock: Arc<dyn Clock>) -> Self {
        info!(balance = initial_balance, slippage_bps, "PaperClient initialized");
        Self {
            balance: RwLock::new(initial_balance),
            prices: RwLock::new(HashMap::new()),
            slippage_bps,
            clock,
        }
    }

    /// Update the latest price for a pair (called once per replayed bar).
    pub async fn update_price(&self, pair: &str, price: f64) {
        self.prices.write().await.insert(pair.to_string(), price);
    }

    fn slipped(&self, mid: f64, side: OrderSide) -> f64 {
        match side {
            OrderSide::Buy => mid * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => mid * (1.0 - self.slippage_bps / 10_000.0),
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperClient {
    async fn submit_order(&self, order: &Order) -> Result<Fill> {
        if !(order.quantity.is_finite() && order.quantity > 0.0) {
            return Err(Error::InvalidInput(format!(
                "order quantity must be positive, got {}",
                order.quantity
            )));
        }

        let mid_price = self.current_price(&order.pair).await?;
        let fill_price = self.slipped(mid_price, order.side);
        let notional = fill_price * order.quantity;

        let mut balance = self.balance.write().await;
        match order.side {
            OrderSide::Buy => {
                if notional > *balance {
                    return Err(Error::Exchange(format!(
                        "insufficient paper balance: need {notional:.2}, have {:.2}",
                        *balance
                    )));
                }
                *balance -= notional;
            }
            OrderSide::Sell => *balance += notional,
        }

        debug!(
            pair = %order.pair,
            side = %order.side,
            mid = mid_price,
            fill = fill_price,
            qty = order.quantity,
            balance = *balance,
            "Paper fill simulated"
        );

        Ok(Fill {
            order_id: order.id.clone(),
            pair: order.pair.clone(),
            side: order.side,
            fill_price,
            quantity: order.quantity,
            timestamp: self.clock.now(),
        })
    }

    async fn current_price(&self, pair: &str) -> Result<f64> {
        self.prices
            .read()
            .await
            .get(pair)
            .copied()
            .ok_or_else(|| Error::Exchange(format!("No price available for {pair}")))
    }

    async fn balance(&self) -> Result<f64> {
        Ok(*self.balance.read().await)
    }
}
