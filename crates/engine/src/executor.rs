use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use common::{Broker, OrderIntent, Result};

use crate::deadline::within;
use crate::store::ScanStore;

/// Turns guarded intents into broker orders.
///
/// This is the ONLY component that calls `Broker::submit_order`.
pub struct OrderExecutor {
    broker: Arc<dyn Broker>,
    timeout: Duration,
}

impl OrderExecutor {
    pub fn new(broker: Arc<dyn Broker>, timeout: Duration) -> Self {
        Self { broker, timeout }
    }

    /// Submit `intent` and return the broker's order id. Buys go out as
    /// limit orders at the reference price, sells at market.
    pub async fn submit(&self, intent: &OrderIntent) -> Result<String> {
        let order = intent.clone().into_order();
        match order.limit_price {
            Some(limit) => info!(
                symbol = %order.symbol,
                side = %order.side,
                qty = order.quantity,
                limit,
                "Transmitting limit order"
            ),
            None => info!(
                symbol = %order.symbol,
                side = %order.side,
                qty = order.quantity,
                "Transmitting market order"
            ),
        }

        let order_id = within(self.timeout, "submit_order", self.broker.submit_order(&order))
            .await
            .map_err(|e| {
                error!(symbol = %order.symbol, error = %e, "Order submission failed");
                e
            })?;
        info!(symbol = %order.symbol, order_id = %order_id, "Order accepted");
        Ok(order_id)
    }
}

/// Follow the broker's fill notifications: log partial vs full fills and
/// journal each one. Call once at startup; the task ends when the broker
/// drops its fill channel.
pub fn spawn_fill_monitor(broker: &dyn Broker, store: ScanStore) -> JoinHandle<()> {
    let mut fills = broker.subscribe_fills();
    tokio::spawn(async move {
        loop {
            match fills.recv().await {
                Ok(fill) => {
                    let status = if fill.is_partial() {
                        "PARTIAL FILL"
                    } else {
                        "FULL FILL"
                    };
                    info!(
                        symbol = %fill.symbol,
                        side = %fill.side,
                        qty = fill.quantity,
                        price = fill.price,
                        remaining = fill.remaining,
                        order_id = %fill.order_id,
                        "{status}"
                    );
                    if let Err(e) = store.record_fill(&fill).await {
                        error!(order_id = %fill.order_id, error = %e, "Failed to persist fill");
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Fill monitor lagged; some fills were not journaled");
                }
                Err(RecvError::Closed) => {
                    warn!("Fill channel closed, fill monitor exiting");
                    break;
                }
            }
        }
    })
}
