use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use common::TradeResult;

/// Realized results for one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRiskState {
    pub date: NaiveDate,
    pub trade_count: u32,
    pub realized_pl: f64,
    pub win_count: u32,
    pub loss_count: u32,
}

impl DailyRiskState {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            trade_count: 0,
            realized_pl: 0.0,
            win_count: 0,
            loss_count: 0,
        }
    }

    pub fn record(&mut self, profit_loss: f64, result: TradeResult) {
        self.trade_count += 1;
        self.realized_pl += profit_loss;
        match result {
            TradeResult::Win => self.win_count += 1,
            TradeResult::Loss => self.loss_count += 1,
        }
    }

    /// Fraction of today's trades that won; 0 with no trades.
    pub fn win_rate(&self) -> f64 {
        if self.trade_count == 0 {
            0.0
        } else {
            self.win_count as f64 / self.trade_count as f64
        }
    }
}
