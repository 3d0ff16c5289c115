mod replay;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use common::{Config, ManualClock, OhlcBar};
use engine::{Desk, ExitConfig, SharedDesk, ThrottleConfig, TradeLifecycleCoordinator};
use paper::PaperClient;
use risk::{RiskConfig, RiskManager};
use strategy::{EmaCrossStrategy, Strategy, StrategyConfig};

use crate::replay::Replay;

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env()?;
    let risk_cfg = RiskConfig::from_env()?;
    let throttle_cfg = ThrottleConfig::from_env()?;
    let exit_cfg = ExitConfig::from_env()?;
    let strategy_cfg = StrategyConfig::load(&cfg.strategy_config_path)?;
    info!(pairs = ?cfg.trading_pairs, bars_dir = %cfg.bars_dir, "Crossbot starting");

    // ── Bars ──────────────────────────────────────────────────────────────────
    let mut series = BTreeMap::new();
    for pair in &cfg.trading_pairs {
        let path = Path::new(&cfg.bars_dir).join(format!("{pair}.json"));
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading bars from {}", path.display()))?;
        let bars: Vec<OhlcBar> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing bars in {}", path.display()))?;
        info!(pair = %pair, bars = bars.len(), "Bars loaded");
        series.insert(pair.clone(), bars);
    }

    // ── Decision core ─────────────────────────────────────────────────────────
    let start = series
        .values()
        .filter_map(|bars| bars.first().map(|b| b.timestamp))
        .min()
        .unwrap_or_else(Utc::now);
    let clock = Arc::new(ManualClock::new(start));
    let exchange = Arc::new(PaperClient::new(
        cfg.initial_balance,
        cfg.paper_slippage_bps,
        clock.clone(),
    ));
    let desk = SharedDesk::new(
        Desk::new(
            RiskManager::new(risk_cfg, clock.clone()),
            TradeLifecycleCoordinator::new(throttle_cfg, clock.clone()),
        )
        .with_exit_config(exit_cfg),
    );
    let strategy = EmaCrossStrategy::new(&strategy_cfg);
    info!(strategy = strategy.name(), "Strategy loaded");

    // ── Replay ────────────────────────────────────────────────────────────────
    let report = Replay::new(clock, exchange, desk, strategy, series).run().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
