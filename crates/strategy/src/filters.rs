//! Trend filter chain.
//!
//! `base_trend` builds the raw crossover flag; every `TrendFilter` after it
//! may only clear a row's trend from 1 to 0. A filter whose inputs are still
//! in warmup (`None`) leaves the row untouched.

use tracing::debug;

use crate::config::StrategyConfig;
use crate::frame::IndicatorFrame;
use crate::indicators::rolling_max;

pub trait TrendFilter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Take a frame, return it with trend flags cleared where this filter
    /// rejects the posture.
    fn apply(&self, frame: IndicatorFrame) -> IndicatorFrame;
}

/// Raw crossover: trend = 1 where the fast EMA is above the slow SMA.
pub fn base_trend(mut frame: IndicatorFrame) -> IndicatorFrame {
    for row in &mut frame.rows {
        row.trend = match row.sma_slow {
            Some(slow) if row.ema_fast > slow => 1,
            _ => 0,
        };
    }
    frame
}

/// Clears trend where volume does not exceed its average. The latest row is
/// exempt: its volume is still accumulating while the session is open.
pub struct VolumeFilter;

impl TrendFilter for VolumeFilter {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn apply(&self, mut frame: IndicatorFrame) -> IndicatorFrame {
        let last = frame.rows.len().saturating_sub(1);
        for (i, row) in frame.rows.iter_mut().enumerate() {
            if i == last {
                continue;
            }
            if let Some(avg) = row.volume_sma {
                if row.volume <= avg {
                    row.trend = 0;
                }
            }
        }
        frame
    }
}

/// Clears trend where ADX is below `threshold`.
pub struct StrengthFilter {
    pub threshold: f64,
}

impl TrendFilter for StrengthFilter {
    fn name(&self) -> &'static str {
        "strength"
    }

    fn apply(&self, mut frame: IndicatorFrame) -> IndicatorFrame {
        for row in &mut frame.rows {
            if row.adx < self.threshold {
                row.trend = 0;
            }
        }
        frame
    }
}

/// Trailing stop = highest close over `window` bars minus ATR * `multiplier`.
/// Clears trend where the close is below the stop.
pub struct TrailingStopFilter {
    pub window: usize,
    pub multiplier: f64,
}

impl TrendFilter for TrailingStopFilter {
    fn name(&self) -> &'static str {
        "trailing_stop"
    }

    fn apply(&self, mut frame: IndicatorFrame) -> IndicatorFrame {
        let closes: Vec<f64> = frame.rows.iter().map(|r| r.close).collect();
        let highest = rolling_max(&closes, self.window, 1);
        for (row, high) in frame.rows.iter_mut().zip(highest) {
            row.trailing_stop = high.map(|h| h - row.atr * self.multiplier);
            if let Some(stop) = row.trailing_stop {
                if row.close < stop {
                    row.trend = 0;
                }
            }
        }
        frame
    }
}

/// Blocks fresh entries at or above the prior `window`-bar high.
///
/// The high excludes the current bar. Only rows whose previous bar was flat
/// are cleared, so a position already held through a new high is kept.
pub struct BreakoutExhaustionFilter {
    pub window: usize,
}

impl TrendFilter for BreakoutExhaustionFilter {
    fn name(&self) -> &'static str {
        "breakout_exhaustion"
    }

    fn apply(&self, mut frame: IndicatorFrame) -> IndicatorFrame {
        let highs: Vec<f64> = frame.rows.iter().map(|r| r.high).collect();
        let rolling = rolling_max(&highs, self.window, self.window);

        for i in 0..frame.rows.len() {
            let prior_high = i.checked_sub(1).and_then(|p| rolling[p]);
            frame.rows[i].breakout_high = prior_high;

            let Some(prior_high) = prior_high else {
                continue;
            };
            let previously_flat = frame.rows[i - 1].trend == 0;
            if previously_flat && frame.rows[i].close >= prior_high {
                frame.rows[i].trend = 0;
            }
        }
        frame
    }
}

/// Ordered filters applied after the base trend.
pub struct FilterChain {
    filters: Vec<Box<dyn TrendFilter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Box<dyn TrendFilter>>) -> Self {
        Self { filters }
    }

    /// Volume, strength, trailing stop, breakout exhaustion.
    pub fn standard(cfg: &StrategyConfig) -> Self {
        Self::new(vec![
            Box::new(VolumeFilter),
            Box::new(StrengthFilter {
                threshold: cfg.adx_threshold,
            }),
            Box::new(TrailingStopFilter {
                window: cfg.ema_fast,
                multiplier: cfg.atr_stop_multiplier,
            }),
            Box::new(BreakoutExhaustionFilter {
                window: cfg.breakout_window,
            }),
        ])
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Build the base trend, then run every filter in order.
    pub fn run(&self, frame: IndicatorFrame) -> IndicatorFrame {
        let mut frame = base_trend(frame);
        for filter in &self.filters {
            let before = frame.trend();
            frame = filter.apply(frame);
            debug_assert!(
                before.iter().zip(frame.rows()).all(|(&b, r)| r.trend <= b),
                "filter '{}' re-enabled a trend",
                filter.name()
            );
            let cleared = before
                .iter()
                .zip(frame.rows())
                .filter(|(b, r)| r.trend < **b)
                .count();
            if cleared > 0 {
                debug!(symbol = %frame.symbol, filter = filter.name(), cleared, "Trend rows cleared");
            }
        }
        frame
    }
}
