use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use common::{TradeRecord, TradeResult};

/// Closed-trade records, oldest first. Once `capacity` is exceeded the
/// oldest records are dropped.
#[derive(Debug, Clone)]
pub struct TradeHistory {
    records: VecDeque<TradeRecord>,
    capacity: usize,
}

/// Aggregates over the retained history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    /// Fraction in [0, 1].
    pub win_rate: f64,
    pub total_pl: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
}

impl TradeHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, record: TradeRecord) {
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TradeRecord> {
        self.records.iter()
    }

    pub fn stats(&self) -> TradeStats {
        let total_trades = self.records.len();
        if total_trades == 0 {
            return TradeStats::default();
        }

        let (mut wins, mut win_sum, mut loss_sum, mut total_pl) = (0usize, 0.0, 0.0, 0.0);
        for r in &self.records {
            total_pl += r.profit_loss;
            match r.result {
                TradeResult::Win => {
                    wins += 1;
                    win_sum += r.profit_loss;
                }
                TradeResult::Loss => loss_sum += r.profit_loss,
            }
        }
        let losses = total_trades - wins;

        TradeStats {
            total_trades,
            wins,
            losses,
            win_rate: wins as f64 / total_trades as f64,
            total_pl,
            avg_win: if wins > 0 { win_sum / wins as f64 } else { 0.0 },
            avg_loss: if losses > 0 { loss_sum / losses as f64 } else { 0.0 },
        }
    }

    /// Win rate over the most recent `n` trades; 0 with no trades.
    pub fn recent_win_rate(&self, n: usize) -> f64 {
        let taken = self.records.len().min(n);
        if taken == 0 {
            return 0.0;
        }
        let wins = self
            .records
            .iter()
            .rev()
            .take(taken)
            .filter(|r| r.result == TradeResult::Win)
            .count();
        wins as f64 / taken as f64
    }
}
