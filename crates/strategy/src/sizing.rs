use serde::{Deserialize, Serialize};

use crate::config::StrategyConfig;

/// Floor for the stop distance so a zero ATR never divides by zero.
pub const MIN_STOP_DISTANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSizing {
    /// Always at least 1.
    pub target_shares: u64,
    /// Position value as a fraction of capital, at most 1.0.
    pub target_weight: f64,
}

/// Volatility-based sizing: risk a fixed fraction of capital against an
/// ATR stop, capped by a percentage and an absolute position limit.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    pub risk_per_trade_pct: f64,
    pub atr_stop_multiplier: f64,
    pub max_position_pct: f64,
    pub max_position_usd: f64,
}

impl PositionSizer {
    pub fn from_config(cfg: &StrategyConfig) -> Self {
        Self {
            risk_per_trade_pct: cfg.risk_per_trade_pct,
            atr_stop_multiplier: cfg.atr_stop_multiplier,
            max_position_pct: cfg.max_position_pct,
            max_position_usd: cfg.max_position_usd,
        }
    }

    /// Shares the risk budget allows against an ATR stop.
    pub fn risk_shares(&self, capital: f64, atr: f64) -> u64 {
        let dollar_risk = capital * self.risk_per_trade_pct;
        let stop_distance = (atr * self.atr_stop_multiplier).max(MIN_STOP_DISTANCE);
        whole_shares(dollar_risk / stop_distance)
    }

    /// Shares the position caps allow at `close`.
    pub fn max_capital_shares(&self, capital: f64, close: f64) -> u64 {
        if close <= 0.0 || !close.is_finite() {
            return 0;
        }
        let max_value = (capital * self.max_position_pct).min(self.max_position_usd);
        whole_shares(max_value / close)
    }

    pub fn size(&self, capital: f64, close: f64, atr: f64) -> PositionSizing {
        let target_shares = self
            .risk_shares(capital, atr)
            .min(self.max_capital_shares(capital, close))
            .max(1);
        let target_weight = if capital > 0.0 {
            (target_shares as f64 * close / capital).min(1.0)
        } else {
            1.0
        };
        PositionSizing {
            target_shares,
            target_weight,
        }
    }
}

fn whole_shares(raw: f64) -> u64 {
    if raw.is_nan() || raw <= 0.0 {
        0
    } else {
        // `as` saturates at u64::MAX for huge or infinite values.
        raw.floor() as u64
    }
}
