use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{Bar, Fill, OpenOrder, Order, Result};

/// Abstraction over the broker session.
///
/// `PaperBroker` implements this for simulation. Only the engine's
/// `OrderExecutor` calls `submit_order`; every buy or sell reaches it
/// through the `ExecutionGuard` first.
#[async_trait]
pub trait Broker: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Establish (or re-establish) the session.
    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self);

    /// Account ids managed by this session.
    async fn managed_accounts(&self) -> Result<Vec<String>>;

    /// The broker-reported account type (e.g. "CASH"), if any.
    async fn account_type(&self) -> Result<Option<String>>;

    async fn available_funds(&self) -> Result<f64>;

    /// Total account equity (cash plus held securities), if reported.
    async fn net_liquidation(&self) -> Result<Option<f64>>;

    /// Signed quantity per symbol. Zero-quantity entries are excluded.
    async fn open_positions(&self) -> Result<BTreeMap<String, f64>>;

    async fn open_orders(&self) -> Result<Vec<OpenOrder>>;

    /// Daily bars, ascending. May be empty.
    async fn fetch_bars(&self, symbol: &str, lookback_days: u32) -> Result<Vec<Bar>>;

    /// Submit an order and return the broker's order id. Fills arrive
    /// asynchronously on `subscribe_fills`.
    async fn submit_order(&self, order: &Order) -> Result<String>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    fn subscribe_fills(&self) -> broadcast::Receiver<Fill>;
}

/// Source of the tradable symbol universe, refreshed once per calendar day.
#[async_trait]
pub trait SymbolUniverse: Send + Sync {
    async fn symbols(&self) -> Result<Vec<String>>;
}
