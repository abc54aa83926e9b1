pub mod config;
pub mod filters;
pub mod frame;
pub mod indicators;
pub mod pipeline;
pub mod signals;
pub mod sizing;

pub use config::{StrategyConfig, StrategyFileConfig};
pub use filters::{FilterChain, TrendFilter};
pub use frame::{IndicatorFrame, IndicatorRow};
pub use pipeline::{SignalPipeline, SignalReport};
pub use signals::{SellRule, TradeEvent};
pub use sizing::{PositionSizer, PositionSizing};

use common::Bar;

/// Turns a symbol's daily bars into a live decision.
pub trait Strategy: Send + Sync {
    /// Human-readable name of this strategy instance.
    fn name(&self) -> &str;

    /// Calendar days of history to request per symbol.
    fn lookback_days(&self) -> u32;

    /// Evaluate the latest bar. Returns `None` when the series is too short
    /// (or empty) for a decision; the caller skips the symbol this cycle.
    fn evaluate(&self, symbol: &str, bars: &[Bar], capital: f64) -> Option<SignalReport>;
}
