use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use common::Bar;
use strategy::filters::{
    base_trend, BreakoutExhaustionFilter, StrengthFilter, TrailingStopFilter, TrendFilter,
    VolumeFilter,
};
use strategy::signals::signal_events;
use strategy::{IndicatorFrame, PositionSizer, SignalPipeline, StrategyConfig};

fn test_config() -> StrategyConfig {
    StrategyConfig {
        sma_slow: 20,
        ema_fast: 8,
        volume_window: 10,
        adx_window: 7,
        breakout_window: 30,
        warmup_bars: 20,
        ..StrategyConfig::default()
    }
}

fn build_bars(steps: &[(f64, f64, f64)]) -> Vec<Bar> {
    let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    let mut close = 100.0;
    steps
        .iter()
        .enumerate()
        .map(|(i, &(change, range, volume))| {
            close = (close + change).max(1.0);
            Bar {
                date: start + Duration::days(i as i64),
                open: close - change / 2.0,
                high: close + range,
                low: (close - range).max(0.5),
                close,
                volume,
            }
        })
        .collect()
}

fn bar_steps() -> impl Strategy<Value = Vec<(f64, f64, f64)>> {
    prop::collection::vec(
        (-3.0f64..3.0, 0.1f64..4.0, 100.0f64..10_000.0),
        40..140,
    )
}

proptest! {
    /// Appending future bars never changes indicator values already computed.
    #[test]
    fn indicators_are_causal(steps in bar_steps(), cut in 0.2f64..0.9) {
        let cfg = test_config();
        let pipeline = SignalPipeline::new(cfg);
        let bars = build_bars(&steps);
        let k = ((bars.len() as f64) * cut) as usize;
        prop_assume!(k >= 2);

        let full = pipeline.frame("T", &bars);
        let prefix = pipeline.frame("T", &bars[..k]);

        for i in 0..k {
            let (a, b) = (&prefix.rows()[i], &full.rows()[i]);
            prop_assert_eq!(a.sma_slow, b.sma_slow);
            prop_assert_eq!(a.ema_fast, b.ema_fast);
            prop_assert_eq!(a.volume_sma, b.volume_sma);
            prop_assert_eq!(a.atr, b.atr);
            prop_assert_eq!(a.adx, b.adx);
            prop_assert_eq!(a.trailing_stop, b.trailing_stop);
            prop_assert_eq!(a.breakout_high, b.breakout_high);
            // The latest row is exempt from the volume filter, so only
            // earlier rows must agree on trend.
            if i + 1 < k {
                prop_assert_eq!(a.trend, b.trend);
            }
        }
    }

    /// No filter ever turns a 0 into a 1.
    #[test]
    fn filters_only_clear_trend(steps in bar_steps()) {
        let cfg = test_config();
        let bars = build_bars(&steps);
        let filters: Vec<Box<dyn TrendFilter>> = vec![
            Box::new(VolumeFilter),
            Box::new(StrengthFilter { threshold: cfg.adx_threshold }),
            Box::new(TrailingStopFilter { window: cfg.ema_fast, multiplier: cfg.atr_stop_multiplier }),
            Box::new(BreakoutExhaustionFilter { window: cfg.breakout_window }),
        ];

        let mut frame = base_trend(IndicatorFrame::compute("T", &bars, &cfg));
        for filter in &filters {
            let before = frame.trend();
            frame = filter.apply(frame);
            for (b, a) in before.iter().zip(frame.trend()) {
                prop_assert!(a <= *b, "{} re-enabled a trend", filter.name());
            }
        }
    }

    /// Cumulative signal events telescope to the change in trend state.
    #[test]
    fn signal_events_telescope(steps in bar_steps()) {
        let pipeline = SignalPipeline::new(test_config());
        let frame = pipeline.frame("T", &build_bars(&steps));
        let trend = frame.trend();
        let events = signal_events(&frame);

        prop_assert_eq!(events[0], None);
        let mut sum: i32 = 0;
        for j in 1..events.len() {
            sum += events[j].unwrap() as i32;
            prop_assert_eq!(sum, trend[j] as i32 - trend[0] as i32);
        }
    }

    /// Sizing never drops below one share and never exceeds either cap
    /// (beyond the one-share floor).
    #[test]
    fn sizing_respects_bounds(
        capital in 1_000.0f64..10_000_000.0,
        close in 0.5f64..5_000.0,
        atr in 0.0f64..200.0,
        risk in 0.001f64..0.05,
        max_pct in 0.01f64..0.5,
    ) {
        let sizer = PositionSizer {
            risk_per_trade_pct: risk,
            atr_stop_multiplier: 2.0,
            max_position_pct: max_pct,
            max_position_usd: 50_000.0,
        };
        let sizing = sizer.size(capital, close, atr);
        prop_assert!(sizing.target_shares >= 1);
        prop_assert!(sizing.target_shares <= sizer.risk_shares(capital, atr).max(1));
        prop_assert!(sizing.target_shares <= sizer.max_capital_shares(capital, close).max(1));
        prop_assert!(sizing.target_weight <= 1.0);
        prop_assert!(sizing.target_weight > 0.0);
    }
}
