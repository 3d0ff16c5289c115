use std::sync::Arc;

use chrono::{TimeZone, Utc};
use common::{ManualClock, OrderSide, TradeResult};
use proptest::prelude::*;
use risk::{RiskConfig, RiskManager};

fn manager(config: RiskConfig) -> RiskManager {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap(),
    ));
    RiskManager::new(config, clock)
}

proptest! {
    /// Percentage-mode notional always lands inside [min, max] of balance.
    #[test]
    fn sized_notional_stays_in_band(
        balance in 0.01f64..10_000_000.0f64,
        price in 0.0001f64..1_000_000.0f64,
        default_pct in 0.0001f64..1.0f64,
    ) {
        let config = RiskConfig {
            default_position_size: default_pct,
            ..RiskConfig::default()
        };
        let rm = manager(config.clone());
        let qty = rm.size_position(balance, price).unwrap();
        prop_assert!(qty >= 0.0);
        let notional = qty * price;
        let eps = 1e-9 * balance;
        prop_assert!(notional >= balance * config.min_position_size - eps);
        prop_assert!(notional <= balance * config.max_position_size + eps);
    }

    /// Fixed-lot quantity does not depend on balance.
    #[test]
    fn fixed_lot_is_constant_in_balance(
        a in 0.01f64..10_000_000.0f64,
        b in 0.01f64..10_000_000.0f64,
        price in 0.0001f64..1_000_000.0f64,
    ) {
        let rm = manager(RiskConfig { use_fixed_lot: true, ..RiskConfig::default() });
        prop_assert_eq!(rm.size_position(a, price).unwrap(), rm.size_position(b, price).unwrap());
    }

    /// Brackets always sit on the correct side of entry.
    #[test]
    fn brackets_straddle_entry(
        entry in 0.0001f64..1_000_000.0f64,
        volatility in prop::option::of(0.0f64..1.0f64),
        buy in any::<bool>(),
    ) {
        let rm = manager(RiskConfig::default());
        let side = if buy { OrderSide::Buy } else { OrderSide::Sell };
        let stop = rm.stop_loss(entry, side, volatility).unwrap();
        let target = rm.take_profit(entry, side, None).unwrap();
        match side {
            OrderSide::Buy => prop_assert!(stop < entry && entry < target),
            OrderSide::Sell => prop_assert!(target < entry && entry < stop),
        }
    }

    /// Once realized losses pass the daily budget, no entry is allowed.
    #[test]
    fn daily_budget_halts_entries(
        losses in prop::collection::vec(0.0f64..100.0f64, 1..20),
        balance in 100.0f64..10_000.0f64,
    ) {
        let mut rm = manager(RiskConfig::default());
        let mut realized = 0.0;
        for loss in &losses {
            rm.record_trade(-loss, TradeResult::Loss);
            realized -= loss;
        }
        let over_budget = f64::abs(realized) > balance * 0.05;
        prop_assert_eq!(rm.allow_trade(balance, "TESTUSDT", 0), !over_budget);
    }
}
