use chrono::NaiveDate;

use common::Bar;

use crate::config::StrategyConfig;
use crate::indicators::{adx, atr, ema, sma};

/// One bar plus its derived indicator columns and trend flag.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,

    pub sma_slow: Option<f64>,
    pub ema_fast: f64,
    pub volume_sma: Option<f64>,
    pub atr: f64,
    pub adx: f64,
    /// Filled in by the trailing-stop filter.
    pub trailing_stop: Option<f64>,
    /// Prior-bars high used by the breakout-exhaustion filter.
    pub breakout_high: Option<f64>,

    /// 1 = bullish posture permitted, 0 = flat/blocked.
    pub trend: u8,
}

/// A symbol's bar series augmented with indicator columns.
///
/// Filters take a frame by value and hand back the updated frame, so a
/// stage can be run, reordered or tested on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorFrame {
    pub symbol: String,
    pub(crate) rows: Vec<IndicatorRow>,
}

impl IndicatorFrame {
    /// Compute every indicator column for `bars`. Trend starts at 0
    /// everywhere; `filters::base_trend` sets the raw crossover flag.
    pub fn compute(symbol: impl Into<String>, bars: &[Bar], cfg: &StrategyConfig) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

        let sma_slow = sma(&closes, cfg.sma_slow);
        let ema_fast = ema(&closes, cfg.ema_fast);
        let volume_sma = sma(&volumes, cfg.volume_window);
        let atr = atr(bars, cfg.adx_window);
        let adx = adx(bars, cfg.adx_window);

        let rows = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| IndicatorRow {
                date: bar.date,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                sma_slow: sma_slow[i],
                ema_fast: ema_fast[i],
                volume_sma: volume_sma[i],
                atr: atr[i],
                adx: adx[i],
                trailing_stop: None,
                breakout_high: None,
                trend: 0,
            })
            .collect();

        Self {
            symbol: symbol.into(),
            rows,
        }
    }

    pub fn from_rows(symbol: impl Into<String>, rows: Vec<IndicatorRow>) -> Self {
        Self {
            symbol: symbol.into(),
            rows,
        }
    }

    pub fn rows(&self) -> &[IndicatorRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last(&self) -> Option<&IndicatorRow> {
        self.rows.last()
    }

    pub fn trend(&self) -> Vec<u8> {
        self.rows.iter().map(|r| r.trend).collect()
    }
}
