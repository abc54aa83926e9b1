pub mod account;
pub mod cycle;
pub mod deadline;
pub mod executor;
pub mod lifecycle;
pub mod market_hours;
pub mod scheduler;
pub mod store;

pub use cycle::{CycleContext, CycleReport, Trader};
pub use executor::{spawn_fill_monitor, OrderExecutor};
pub use lifecycle::{Engine, StepOutcome};
pub use market_hours::{Clock, FixedClock, MarketHours, SystemClock};
pub use scheduler::{Phase, ScanScheduler, ScanState};
pub use store::ScanStore;
