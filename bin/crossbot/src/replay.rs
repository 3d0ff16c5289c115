use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use common::{
    ClosedTrade, Error, ExchangeClient, ExitReason, ManualClock, OhlcBar, Order, Position, Result,
    SignalEvent,
};
use engine::{EntryDecision, SharedDesk, TradingStatus};
use paper::PaperClient;
use risk::TradeStats;
use strategy::{EmaCrossStrategy, Strategy};

/// What a finished replay prints.
#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub closed_trades: Vec<ClosedTrade>,
    pub open_positions: Vec<Position>,
    pub stats: TradeStats,
    pub final_balance: f64,
    pub status: TradingStatus,
}

/// Feeds stored bars through the decision core in timestamp order, with the
/// clock pinned to each bar and a paper exchange filling the orders.
pub struct Replay {
    clock: Arc<ManualClock>,
    exchange: Arc<PaperClient>,
    desk: SharedDesk,
    strategy: EmaCrossStrategy,
    series: BTreeMap<String, Vec<OhlcBar>>,
    closed: Vec<ClosedTrade>,
}

impl Replay {
    pub fn new(
        clock: Arc<ManualClock>,
        exchange: Arc<PaperClient>,
        desk: SharedDesk,
        strategy: EmaCrossStrategy,
        series: BTreeMap<String, Vec<OhlcBar>>,
    ) -> Self {
        Self {
            clock,
            exchange,
            desk,
            strategy,
            series,
            closed: Vec::new(),
        }
    }

    pub async fn run(mut self) -> Result<ReplayReport> {
        let timeline = self.timeline();
        info!(steps = timeline.len(), symbols = self.series.len(), "Replay started");

        for (at, symbol, index) in timeline {
            self.clock.set(at);
            self.step(&symbol, index).await?;
        }

        let desk = self.desk.lock().await;
        let report = ReplayReport {
            closed_trades: self.closed,
            open_positions: desk.lifecycle().positions().cloned().collect(),
            stats: desk.risk().stats(),
            final_balance: self.exchange.balance().await?,
            status: desk.lifecycle().status(),
        };
        info!(
            trades = report.stats.total_trades,
            win_rate = report.stats.win_rate,
            total_pl = report.stats.total_pl,
            "Replay finished"
        );
        Ok(report)
    }

    /// Every bar of every symbol, oldest first; ties ordered by symbol.
    fn timeline(&self) -> Vec<(DateTime<Utc>, String, usize)> {
        let mut steps: Vec<_> = self
            .series
            .iter()
            .flat_map(|(symbol, bars)| {
                bars.iter()
                    .enumerate()
                    .map(move |(i, bar)| (bar.timestamp, symbol.clone(), i))
            })
            .collect();
        steps.sort();
        steps
    }

    async fn step(&mut self, symbol: &str, index: usize) -> Result<()> {
        let bars = match self.series.get(symbol) {
            Some(series) => &series[..=index],
            None => return Ok(()),
        };
        let close = bars[index].close;
        self.exchange.update_price(symbol, close).await;

        let warm = bars.len() >= self.strategy.warmup_bars();
        let analysis = if warm { self.strategy.analyze(bars).ok() } else { None };
        if let Some(reason) = self.desk.check_exit(symbol, close, analysis.as_ref()).await {
            match self.exit(symbol, reason).await {
                Ok(trade) => self.closed.push(trade),
                Err(e) if e.is_recoverable() => {
                    warn!(symbol, error = %e, "Exit failed, retrying next bar")
                }
                Err(e) => return Err(e),
            }
        }

        if !warm || !self.desk.try_begin_signal_check(symbol).await {
            return Ok(());
        }

        match self.strategy.evaluate(symbol, bars) {
            Ok((_, Some(signal))) => self.enter(signal).await,
            Ok((_, None)) => Ok(()),
            Err(e) if e.is_recoverable() => {
                debug!(symbol, error = %e, "Evaluation skipped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn exit(&self, symbol: &str, reason: ExitReason) -> Result<ClosedTrade> {
        let position = self
            .desk
            .lock()
            .await
            .lifecycle()
            .position(symbol)
            .cloned()
            .ok_or_else(|| Error::StateConflict(format!("no open position for {symbol}")))?;

        let order = Order::market(symbol, position.side.opposite(), position.quantity);
        let fill = self.exchange.submit_order(&order).await?;
        self.desk.confirm_exit(symbol, fill.fill_price, reason).await
    }

    async fn enter(&self, signal: SignalEvent) -> Result<()> {
        info!(
            symbol = %signal.symbol,
            direction = %signal.direction,
            price = signal.price,
            rsi = signal.analysis.rsi,
            "Signal detected"
        );

        let balance = self.exchange.balance().await?;
        let plan = match self.desk.plan_entry(&signal, balance).await {
            Ok(EntryDecision::Approved(plan)) => plan,
            Ok(EntryDecision::Rejected(_)) => return Ok(()),
            Err(e) if e.is_recoverable() => {
                warn!(symbol = %signal.symbol, error = %e, "Entry planning failed");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let order = Order::market(&plan.symbol, plan.side, plan.quantity);
        match self.exchange.submit_order(&order).await {
            Ok(fill) => {
                self.desk.confirm_entry(&plan, &fill).await?;
            }
            Err(e) => {
                warn!(symbol = %plan.symbol, error = %e, "Entry order failed");
                self.desk.abort_entry(&plan.symbol).await;
            }
        }
        Ok(())
    }
}
