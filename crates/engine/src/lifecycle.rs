use std::sync::Arc;

use tracing::{debug, error, info, warn};

use common::Result;

use crate::account::verify_account;
use crate::cycle::{CycleContext, CycleReport, Trader};
use crate::deadline::within;
use crate::market_hours::{Clock, MarketHours};

/// Result of one successful pass of the resilience loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Traded(CycleReport),
    /// Outside the session window; nothing to do but wait.
    Idle,
}

/// The resilience loop: keeps the broker session up, re-verifies the
/// account after every reconnect and drives trading cycles during market
/// hours. Connectivity failures tear the session down and retry after a
/// back-off with scan state intact; safety violations end the loop.
pub struct Engine {
    trader: Trader,
    ctx: CycleContext,
    clock: Arc<dyn Clock>,
    hours: MarketHours,
}

impl Engine {
    pub fn new(trader: Trader, ctx: CycleContext, clock: Arc<dyn Clock>) -> Self {
        let hours = MarketHours::from_settings(trader.settings());
        Self {
            trader,
            ctx,
            clock,
            hours,
        }
    }

    pub fn context(&self) -> &CycleContext {
        &self.ctx
    }

    pub fn trader(&self) -> &Trader {
        &self.trader
    }

    async fn ensure_connected(&self) -> Result<()> {
        let broker = self.trader.broker();
        if broker.is_connected() {
            return Ok(());
        }
        let timeout = self.trader.settings().broker_timeout;
        warn!("Broker connection lost or not started, connecting");
        within(timeout, "connect", broker.connect()).await?;
        info!("Connected to broker");

        if let Err(e) = verify_account(broker.as_ref(), timeout).await {
            // Never leave an unverified session behind for the next step.
            broker.disconnect().await;
            return Err(e);
        }
        Ok(())
    }

    /// One pass: connect if needed, then either trade or idle depending on
    /// the clock. The first idle pass after the close cancels working
    /// orders.
    pub async fn step(&mut self) -> Result<StepOutcome> {
        self.ensure_connected().await?;

        let now = self.clock.now();
        let today = now.date();
        if !self.hours.is_open(now) {
            if self.hours.is_after_close(now) && self.ctx.last_sweep != Some(today) {
                let cancelled = self.trader.cancel_working_orders().await?;
                info!(cancelled, date = %today, "End-of-day sweep complete");
                self.ctx.last_sweep = Some(today);
            }
            return Ok(StepOutcome::Idle);
        }

        let report = self.trader.run_cycle(&mut self.ctx, today).await?;
        Ok(StepOutcome::Traded(report))
    }

    /// Run until a fatal error. Call from `tokio::spawn` or race it
    /// against a shutdown signal.
    pub async fn run(mut self) -> Result<()> {
        let settings = self.trader.settings().clone();
        info!(
            chunk_size = self.ctx.scheduler.chunk_size(),
            open = %self.hours.open,
            close = %self.hours.close,
            "Engine started"
        );

        loop {
            match self.step().await {
                Ok(StepOutcome::Traded(report)) => {
                    info!(
                        monitored = report.monitored,
                        scanned = report.scanned,
                        skipped = report.skipped,
                        buys = report.buys,
                        sells = report.sells,
                        "Cycle complete"
                    );
                    if report.is_empty() {
                        tokio::time::sleep(settings.idle_sleep).await;
                    }
                }
                Ok(StepOutcome::Idle) => {
                    debug!(sleep = ?settings.idle_sleep, "Market closed, idling");
                    tokio::time::sleep(settings.idle_sleep).await;
                }
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Fatal safety violation, aborting to prevent real trades");
                    self.trader.broker().disconnect().await;
                    return Err(e);
                }
                Err(e) if e.is_connectivity() => {
                    warn!(
                        error = %e,
                        backoff = ?settings.retry_backoff,
                        "Connectivity failure, reconnecting after back-off"
                    );
                    self.trader.broker().disconnect().await;
                    tokio::time::sleep(settings.retry_backoff).await;
                }
                Err(e) => {
                    error!(error = %e, backoff = ?settings.retry_backoff, "Cycle failed");
                    tokio::time::sleep(settings.retry_backoff).await;
                }
            }
        }
    }
}
