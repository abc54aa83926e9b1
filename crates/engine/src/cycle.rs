use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

use common::config::ScanSettings;
use common::{Action, Broker, Error, OpenOrder, Result, SymbolUniverse};
use risk::ExecutionGuard;
use strategy::{SignalReport, Strategy};

use crate::deadline::within;
use crate::executor::OrderExecutor;
use crate::scheduler::ScanScheduler;
use crate::store::ScanStore;

/// Mutable state threaded through every cycle. Owned by the resilience loop
/// and only ever touched from its task.
#[derive(Debug, Clone)]
pub struct CycleContext {
    pub scheduler: ScanScheduler,
    /// Trading day whose end-of-day order sweep already ran.
    pub last_sweep: Option<NaiveDate>,
}

impl CycleContext {
    pub fn new(scheduler: ScanScheduler) -> Self {
        Self {
            scheduler,
            last_sweep: None,
        }
    }
}

/// What one trading cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Held symbols evaluated for exit.
    pub monitored: usize,
    /// Chunk symbols evaluated for entry.
    pub scanned: usize,
    pub skipped: usize,
    pub buys: usize,
    pub sells: usize,
}

impl CycleReport {
    pub fn is_empty(&self) -> bool {
        self.monitored == 0 && self.scanned == 0 && self.skipped == 0
    }
}

/// One monitor-then-scan pass over the broker: exits on held positions
/// first, then entries on the next chunk of the universe.
pub struct Trader {
    broker: Arc<dyn Broker>,
    universe: Arc<dyn SymbolUniverse>,
    strategy: Box<dyn Strategy>,
    executor: OrderExecutor,
    store: ScanStore,
    settings: ScanSettings,
    /// Sizing capital when the broker reports no net liquidation value.
    account_capital: f64,
}

impl Trader {
    pub fn new(
        broker: Arc<dyn Broker>,
        universe: Arc<dyn SymbolUniverse>,
        strategy: Box<dyn Strategy>,
        store: ScanStore,
        settings: ScanSettings,
        account_capital: f64,
    ) -> Self {
        let executor = OrderExecutor::new(broker.clone(), settings.broker_timeout);
        Self {
            broker,
            universe,
            strategy,
            executor,
            store,
            settings,
            account_capital,
        }
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn store(&self) -> &ScanStore {
        &self.store
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    async fn call<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        within(self.settings.broker_timeout, what, fut).await
    }

    /// Monitor held positions, then scan the next buy chunk. A new calendar
    /// day first takes a fresh universe snapshot.
    pub async fn run_cycle(&self, ctx: &mut CycleContext, today: NaiveDate) -> Result<CycleReport> {
        if ctx.scheduler.needs_reset(today) {
            self.refresh_universe(ctx, today).await?;
        }

        let mut report = CycleReport::default();
        self.monitor_positions(&mut report).await?;
        self.scan_chunk(ctx, &mut report).await?;
        Ok(report)
    }

    pub async fn refresh_universe(&self, ctx: &mut CycleContext, today: NaiveDate) -> Result<()> {
        let fetched = self.call("symbols", self.universe.symbols()).await?;
        let denied = self.store.denylist().await?;
        let total = fetched.len();
        let symbols: Vec<String> = fetched
            .into_iter()
            .filter(|s| !denied.contains(s))
            .collect();
        info!(
            fetched = total,
            denied = total - symbols.len(),
            "Fetched symbol universe"
        );

        ctx.scheduler.reset(today, symbols);
        self.persist(ctx).await
    }

    async fn persist(&self, ctx: &CycleContext) -> Result<()> {
        match ctx.scheduler.state() {
            Some(state) => self.store.save(state).await,
            None => Ok(()),
        }
    }

    /// Net liquidation keeps the sizing base stable while cash is tied up
    /// in positions.
    async fn capital(&self) -> Result<f64> {
        let net = self
            .call("net_liquidation", self.broker.net_liquidation())
            .await?;
        Ok(match net {
            Some(value) if value > 0.0 => value,
            _ => {
                debug!(
                    fallback = self.account_capital,
                    "Net liquidation unavailable, using configured capital"
                );
                self.account_capital
            }
        })
    }

    async fn evaluate(&self, symbol: &str, capital: f64) -> Result<Option<SignalReport>> {
        let bars = self
            .call(
                "fetch_bars",
                self.broker.fetch_bars(symbol, self.strategy.lookback_days()),
            )
            .await?;
        if bars.is_empty() {
            debug!(symbol, "No bars returned");
            return Ok(None);
        }
        let report = self.strategy.evaluate(symbol, &bars, capital);
        match &report {
            Some(r) => debug!(symbol, action = %r.action, price = r.price, "Scanned"),
            None => debug!(symbol, bars = bars.len(), "Not enough history for a decision"),
        }
        Ok(report)
    }

    /// Route a per-symbol failure. Connectivity and safety errors abort the
    /// cycle; everything else is logged and the cycle moves on.
    async fn handle_symbol_error(&self, symbol: &str, err: Error) -> Result<()> {
        if err.is_connectivity() || err.is_fatal() {
            return Err(err);
        }
        match err {
            Error::InvalidInstrument { reason, .. } => {
                warn!(symbol, reason = %reason, "Broker rejected instrument");
                if let Err(e) = self.store.deny(symbol, &reason).await {
                    error!(symbol, error = %e, "Failed to record denylist entry");
                }
            }
            other => warn!(symbol, error = %other, "Error processing symbol, skipping"),
        }
        Ok(())
    }

    pub async fn monitor_positions(&self, report: &mut CycleReport) -> Result<()> {
        let positions = self
            .call("open_positions", self.broker.open_positions())
            .await?;
        if positions.is_empty() {
            debug!("No open positions to monitor");
            return Ok(());
        }
        info!(positions = positions.len(), "Monitoring open positions");

        let orders = self.call("open_orders", self.broker.open_orders()).await?;
        let capital = self.capital().await?;
        let mut guard = ExecutionGuard::new(0.0);

        for (symbol, &held) in &positions {
            if held <= 0.0 {
                debug!(symbol = %symbol, qty = held, "Short position, not monitored");
                continue;
            }
            if let Err(reason) = guard.sell_quantity(symbol, held, &orders) {
                info!(symbol = %symbol, reason = %reason, "Skipping SELL");
                report.skipped += 1;
                continue;
            }

            tokio::time::sleep(self.settings.pacing_delay).await;
            report.monitored += 1;
            match self
                .exit_if_signalled(&mut guard, symbol, held, &orders, capital)
                .await
            {
                Ok(true) => report.sells += 1,
                Ok(false) => {}
                Err(e) => self.handle_symbol_error(symbol, e).await?,
            }
        }
        Ok(())
    }

    async fn exit_if_signalled(
        &self,
        guard: &mut ExecutionGuard,
        symbol: &str,
        held: f64,
        orders: &[OpenOrder],
        capital: f64,
    ) -> Result<bool> {
        let Some(signal) = self.evaluate(symbol, capital).await? else {
            return Ok(false);
        };
        if signal.action != Action::Sell {
            return Ok(false);
        }
        let intent = match guard.approve_sell(symbol, held, orders, signal.price) {
            Ok(intent) => intent,
            Err(reason) => {
                info!(symbol, reason = %reason, "Skipping SELL");
                return Ok(false);
            }
        };
        info!(symbol, qty = intent.quantity, "Executing SELL");
        let order_id = self.executor.submit(&intent).await?;
        guard.record_submitted(&order_id, &intent);
        Ok(true)
    }

    /// Save the scan state with `pending` still queued ahead of the rest.
    /// Written after every symbol so a process killed mid-chunk resumes from
    /// the first symbol it had not finished.
    async fn checkpoint(&self, ctx: &CycleContext, pending: &[String]) {
        let Some(state) = ctx.scheduler.state() else {
            return;
        };
        let mut snapshot = state.clone();
        snapshot.requeue_front(pending);
        if let Err(e) = self.store.save(&snapshot).await {
            error!(error = %e, pending = pending.len(), "Failed to checkpoint scan state");
        }
    }

    pub async fn scan_chunk(&self, ctx: &mut CycleContext, report: &mut CycleReport) -> Result<()> {
        let chunk = ctx.scheduler.next_chunk();
        if chunk.is_empty() {
            debug!("Universe is empty, nothing to scan");
            return Ok(());
        }
        self.checkpoint(ctx, &chunk).await;
        info!(
            chunk = chunk.len(),
            remaining = ctx.scheduler.state().map_or(0, |s| s.remaining.len()),
            "Scanning buy chunk"
        );

        let result = self.scan_symbols(ctx, &chunk, report).await;
        if let Err((failed_at, err)) = result {
            // Resume from the failed symbol on the next cycle.
            ctx.scheduler.requeue_front(&chunk[failed_at..]);
            warn!(
                symbol = %chunk[failed_at],
                requeued = chunk.len() - failed_at,
                error = %err,
                "Buy scan interrupted"
            );
            if let Err(e) = self.persist(ctx).await {
                error!(error = %e, "Failed to persist requeued scan state");
            }
            return Err(err);
        }
        Ok(())
    }

    /// On an aborting error, returns the index of the symbol that failed.
    async fn scan_symbols(
        &self,
        ctx: &CycleContext,
        chunk: &[String],
        report: &mut CycleReport,
    ) -> std::result::Result<(), (usize, Error)> {
        let with_index = |i: usize| move |e: Error| (i, e);

        let funds = self
            .call("available_funds", self.broker.available_funds())
            .await
            .map_err(with_index(0))?;
        let positions: BTreeMap<String, f64> = self
            .call("open_positions", self.broker.open_positions())
            .await
            .map_err(with_index(0))?;
        let orders = self
            .call("open_orders", self.broker.open_orders())
            .await
            .map_err(with_index(0))?;
        let capital = self.capital().await.map_err(with_index(0))?;
        info!(available = funds, capital, "Buy scan funds");

        let mut guard = ExecutionGuard::new(funds);
        for (i, symbol) in chunk.iter().enumerate() {
            if let Err(reason) = guard.screen_buy(symbol, &positions, &orders) {
                debug!(symbol = %symbol, reason = %reason, "Skipping BUY");
                report.skipped += 1;
            } else {
                tokio::time::sleep(self.settings.pacing_delay).await;
                report.scanned += 1;
                match self
                    .enter_if_signalled(&mut guard, symbol, &positions, &orders, capital)
                    .await
                {
                    Ok(true) => report.buys += 1,
                    Ok(false) => {}
                    Err(e) => self
                        .handle_symbol_error(symbol, e)
                        .await
                        .map_err(with_index(i))?,
                }
            }
            self.checkpoint(ctx, &chunk[i + 1..]).await;
        }
        Ok(())
    }

    async fn enter_if_signalled(
        &self,
        guard: &mut ExecutionGuard,
        symbol: &str,
        positions: &BTreeMap<String, f64>,
        orders: &[OpenOrder],
        capital: f64,
    ) -> Result<bool> {
        let Some(signal) = self.evaluate(symbol, capital).await? else {
            return Ok(false);
        };
        if signal.action != Action::Buy {
            return Ok(false);
        }
        let intent = match guard.approve_buy(&signal, positions, orders) {
            Ok(intent) => intent,
            Err(reason) => {
                info!(symbol, reason = %reason, "Skipping BUY");
                return Ok(false);
            }
        };
        info!(
            symbol,
            qty = intent.quantity,
            price = intent.reference_price,
            weight = signal.sizing.target_weight,
            "Executing BUY"
        );
        let order_id = self.executor.submit(&intent).await?;
        guard.record_submitted(&order_id, &intent);
        Ok(true)
    }

    /// End-of-day sweep: cancel every order still working so no stale
    /// limit order carries overnight. Returns how many were cancelled.
    pub async fn cancel_working_orders(&self) -> Result<usize> {
        let orders = self.call("open_orders", self.broker.open_orders()).await?;
        let working: Vec<&OpenOrder> = orders.iter().filter(|o| o.remaining() > 0.0).collect();
        if working.is_empty() {
            return Ok(0);
        }
        info!(orders = working.len(), "End of day: cancelling open orders");
        for order in &working {
            info!(
                symbol = %order.symbol,
                side = %order.side,
                qty = order.total_quantity,
                order_id = %order.order_id,
                "Cancelling order"
            );
            self.call("cancel_order", self.broker.cancel_order(&order.order_id))
                .await?;
        }
        Ok(working.len())
    }
}
