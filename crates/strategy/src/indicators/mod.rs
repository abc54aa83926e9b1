//! Causal indicator recurrences over daily bars.
//!
//! Every function returns one value per input row, and the value at row `i`
//! only reads rows `0..=i`. Columns that need a full window before they are
//! meaningful return `None` during warmup; exponential recurrences are
//! defined from the first row.

pub mod adx;
pub mod atr;
pub mod moving_average;

pub use adx::adx;
pub use atr::{atr, true_range};
pub use moving_average::{ema, ewm, rolling_max, sma};
