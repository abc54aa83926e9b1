use std::path::Path;

use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// Top-level strategy config file (TOML).
///
/// Example `config/strategy.toml`:
/// ```toml
/// [strategy]
/// account_capital = 100000.0
/// risk_per_trade_pct = 0.01
/// atr_stop_multiplier = 2.0
/// sma_slow = 50
/// ema_fast = 20
/// adx_threshold = 25.0
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    #[serde(default)]
    pub strategy: StrategyConfig,
}

impl StrategyFileConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read strategy config at '{}': {e}", path.display()))
        })?;
        Self::parse(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse strategy config: {e}")))
    }
}

const TRADING_DAYS_PER_YEAR: usize = 252;

/// Indicator windows, filter thresholds and sizing limits.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StrategyConfig {
    // Account & risk
    /// Capital base used when the broker does not report net liquidation.
    pub account_capital: f64,
    /// Fraction of capital risked per trade (0.01 = 1%).
    pub risk_per_trade_pct: f64,
    pub atr_stop_multiplier: f64,
    /// Cap on a single position as a fraction of capital.
    pub max_position_pct: f64,
    /// Absolute cap on a single position in account currency.
    pub max_position_usd: f64,

    // Indicators
    pub sma_slow: usize,
    pub ema_fast: usize,
    pub volume_window: usize,
    pub adx_window: usize,
    pub adx_threshold: f64,
    pub breakout_window: usize,

    // Data
    /// Calendar days of history requested per symbol.
    pub lookback_days: u32,
    /// Leading rows that must exist before any decision is trusted.
    pub warmup_bars: usize,

    /// Sell whenever the filtered trend is flat on the latest bar, rather
    /// than only on the exact 1 -> 0 transition bar.
    pub sell_on_flat: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            account_capital: 100_000.0,
            risk_per_trade_pct: 0.01,
            atr_stop_multiplier: 2.0,
            max_position_pct: 0.10,
            max_position_usd: 20_000.0,
            sma_slow: 50,
            ema_fast: 20,
            volume_window: 20,
            adx_window: 14,
            adx_threshold: 25.0,
            breakout_window: 252,
            lookback_days: 550,
            warmup_bars: 50,
            sell_on_flat: true,
        }
    }
}

impl StrategyConfig {
    /// Inconsistencies worth a startup warning. None of them are fatal.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.risk_per_trade_pct >= self.max_position_pct {
            out.push(format!(
                "risk_per_trade_pct ({}) >= max_position_pct ({}); the position cap will dominate sizing",
                self.risk_per_trade_pct, self.max_position_pct
            ));
        }
        for (name, window) in [
            ("sma_slow", self.sma_slow),
            ("ema_fast", self.ema_fast),
            ("volume_window", self.volume_window),
            ("adx_window", self.adx_window),
            ("breakout_window", self.breakout_window),
        ] {
            if window == 0 {
                out.push(format!("{name} is 0; the indicator will never be defined"));
            }
        }
        if self.ema_fast >= self.sma_slow {
            out.push(format!(
                "ema_fast ({}) >= sma_slow ({}); the crossover will lag rather than lead",
                self.ema_fast, self.sma_slow
            ));
        }
        if self.warmup_bars < self.sma_slow {
            out.push(format!(
                "warmup_bars ({}) < sma_slow ({}); decisions may be read before the slow average exists",
                self.warmup_bars, self.sma_slow
            ));
        }
        let trading_days = self.lookback_days as usize * TRADING_DAYS_PER_YEAR / 365;
        if trading_days <= self.breakout_window {
            out.push(format!(
                "lookback_days ({}) yields about {trading_days} trading bars, not more than breakout_window ({}); the breakout filter will never engage",
                self.lookback_days, self.breakout_window
            ));
        }
        if self.account_capital <= 0.0 {
            out.push("account_capital must be positive".to_string());
        }
        out
    }
}
