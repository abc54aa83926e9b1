use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{Action, Bar};

use crate::config::StrategyConfig;
use crate::filters::FilterChain;
use crate::frame::IndicatorFrame;
use crate::signals::{live_action, transition_events, SellRule, TradeEvent};
use crate::sizing::{PositionSizer, PositionSizing};
use crate::Strategy;

/// The live decision for one symbol, read from its latest bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalReport {
    pub symbol: String,
    pub date: NaiveDate,
    pub action: Action,
    /// Latest close; the reference price for any order.
    pub price: f64,
    pub atr: f64,
    pub sizing: PositionSizing,
}

/// Indicators -> filter chain -> signal extraction -> sizing.
pub struct SignalPipeline {
    cfg: StrategyConfig,
    chain: FilterChain,
    sizer: PositionSizer,
    sell_rule: SellRule,
}

impl SignalPipeline {
    pub fn new(cfg: StrategyConfig) -> Self {
        let sell_rule = if cfg.sell_on_flat {
            SellRule::OnFlat
        } else {
            SellRule::OnTransition
        };
        Self {
            chain: FilterChain::standard(&cfg),
            sizer: PositionSizer::from_config(&cfg),
            sell_rule,
            cfg,
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.cfg
    }

    /// Computed and fully filtered frame.
    pub fn frame(&self, symbol: &str, bars: &[Bar]) -> IndicatorFrame {
        self.chain
            .run(IndicatorFrame::compute(symbol, bars, &self.cfg))
    }

    /// Entry/exit transitions after the warmup rows, discrete diff only.
    pub fn historical_events(&self, symbol: &str, bars: &[Bar]) -> Vec<TradeEvent> {
        transition_events(&self.frame(symbol, bars), self.cfg.warmup_bars)
    }
}

impl Strategy for SignalPipeline {
    fn name(&self) -> &str {
        "ema-sma-trend"
    }

    fn lookback_days(&self) -> u32 {
        self.cfg.lookback_days
    }

    fn evaluate(&self, symbol: &str, bars: &[Bar], capital: f64) -> Option<SignalReport> {
        if bars.len() <= self.cfg.warmup_bars {
            debug!(symbol, bars = bars.len(), warmup = self.cfg.warmup_bars, "Not enough history for a decision");
            return None;
        }

        let frame = self.frame(symbol, bars);
        let last = frame.last()?;
        let action = live_action(&frame, self.sell_rule);

        Some(SignalReport {
            symbol: symbol.to_string(),
            date: last.date,
            action,
            price: last.close,
            atr: last.atr,
            sizing: self.sizer.size(capital, last.close, last.atr),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn bars(closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                date: start + Duration::days(i as i64),
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 1_000.0 + 10.0 * i as f64,
            })
            .collect()
    }

    #[test]
    fn empty_series_yields_no_decision() {
        let pipeline = SignalPipeline::new(StrategyConfig::default());
        assert!(pipeline.evaluate("AAPL", &[], 100_000.0).is_none());
    }

    #[test]
    fn warmup_only_series_yields_no_decision() {
        let pipeline = SignalPipeline::new(StrategyConfig::default());
        let closes: Vec<f64> = (0..50).map(|i| 100.0 + i as f64).collect();
        assert!(pipeline.evaluate("AAPL", &bars(&closes), 100_000.0).is_none());
    }

    #[test]
    fn steady_uptrend_holds() {
        let pipeline = SignalPipeline::new(StrategyConfig::default());
        let closes: Vec<f64> = (0..120).map(|i| 100.0 + i as f64).collect();
        let report = pipeline
            .evaluate("AAPL", &bars(&closes), 100_000.0)
            .expect("enough history");
        assert_eq!(report.action, Action::Hold);
        assert_eq!(report.price, 219.0);
        assert!(report.sizing.target_shares >= 1);
    }

    #[test]
    fn transition_rule_follows_config() {
        let cfg = StrategyConfig {
            sell_on_flat: false,
            ..StrategyConfig::default()
        };
        let pipeline = SignalPipeline::new(cfg);
        let closes: Vec<f64> = (0..120).map(|i| 300.0 - i as f64).collect();
        let report = pipeline.evaluate("AAPL", &bars(&closes), 100_000.0).unwrap();
        // Steady downtrend: flat throughout, no transition on the last bar.
        assert_eq!(report.action, Action::Hold);

        let pipeline = SignalPipeline::new(StrategyConfig::default());
        let report = pipeline.evaluate("AAPL", &bars(&closes), 100_000.0).unwrap();
        assert_eq!(report.action, Action::Sell);
    }
}
