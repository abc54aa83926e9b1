use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use common::{
    Bar, Broker, Error, Fill, OpenOrder, Order, OrderSide, Result, SymbolUniverse,
};

/// Simulated account state.
#[derive(Debug, Default)]
struct Book {
    funds: f64,
    positions: BTreeMap<String, f64>,
    /// Resting orders with their fill price.
    orders: Vec<(OpenOrder, f64)>,
}

/// Simulated broker for paper trading and tests.
///
/// Daily bars are held in memory (usually loaded from `<SYMBOL>.csv`
/// files). Limit buys fill at their limit price, market orders at the last
/// close. No real orders are ever sent anywhere.
pub struct PaperBroker {
    account_id: String,
    account_type: Option<String>,
    bars: HashMap<String, Vec<Bar>>,
    /// Listed in the universe but rejected by `fetch_bars`.
    unknown_symbols: Vec<String>,
    book: RwLock<Book>,
    fills_tx: broadcast::Sender<Fill>,
    connected: AtomicBool,
    /// Successful `connect` calls so far.
    connects: AtomicUsize,
    /// When set, orders rest as open instead of filling on submission.
    resting: AtomicBool,
    /// Symbols whose next `fetch_bars` drops the session.
    drop_on_fetch: Mutex<HashSet<String>>,
    /// Symbols whose next `fetch_bars` never answers.
    hang_on_fetch: Mutex<HashSet<String>>,
}

impl PaperBroker {
    pub fn new(account_id: impl Into<String>, funds: f64) -> Self {
        let (fills_tx, _) = broadcast::channel(256);
        Self {
            account_id: account_id.into(),
            account_type: Some("CASH".into()),
            bars: HashMap::new(),
            unknown_symbols: Vec::new(),
            book: RwLock::new(Book {
                funds,
                ..Book::default()
            }),
            fills_tx,
            connected: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            resting: AtomicBool::new(false),
            drop_on_fetch: Mutex::new(HashSet::new()),
            hang_on_fetch: Mutex::new(HashSet::new()),
        }
    }

    /// Load every `<SYMBOL>.csv` in `dir` (columns
    /// `date,open,high,low,close,volume`).
    pub fn from_csv_dir(dir: &Path, account_id: impl Into<String>, funds: f64) -> Result<Self> {
        let mut broker = Self::new(account_id, funds);
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let Some(symbol) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let bars = read_bars(&path)?;
            debug!(symbol, bars = bars.len(), "Loaded paper bars");
            broker = broker.with_bars(symbol.to_uppercase(), bars);
        }
        info!(
            dir = %dir.display(),
            symbols = broker.bars.len(),
            "PaperBroker loaded bar files"
        );
        Ok(broker)
    }

    /// Set the series for `symbol`. Sorted by date; duplicate dates keep
    /// the first row.
    pub fn with_bars(mut self, symbol: impl Into<String>, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        self.bars.insert(symbol.into(), bars);
        self
    }

    /// List `symbol` in the universe without any data behind it.
    pub fn with_unknown_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.unknown_symbols.push(symbol.into());
        self
    }

    pub fn with_account_type(mut self, account_type: Option<&str>) -> Self {
        self.account_type = account_type.map(str::to_string);
        self
    }

    pub fn with_position(mut self, symbol: impl Into<String>, quantity: f64) -> Self {
        self.book.get_mut().positions.insert(symbol.into(), quantity);
        self
    }

    pub fn set_resting(&self, resting: bool) {
        self.resting.store(resting, Ordering::SeqCst);
    }

    /// The next `fetch_bars` for `symbol` fails with a connectivity error
    /// and leaves the session disconnected.
    pub async fn drop_connection_on(&self, symbol: impl Into<String>) {
        self.drop_on_fetch.lock().await.insert(symbol.into());
    }

    /// The next `fetch_bars` for `symbol` stalls forever with the session
    /// still nominally up.
    pub async fn hang_on(&self, symbol: impl Into<String>) {
        self.hang_on_fetch.lock().await.insert(symbol.into());
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn last_close(&self, symbol: &str) -> Option<f64> {
        self.bars.get(symbol).and_then(|b| b.last()).map(|b| b.close)
    }

    fn require_connection(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::Connectivity("paper broker session is not connected".into()))
        }
    }

    /// Fill `quantity` of a resting order. Publishes the fill and drops the
    /// order once nothing remains.
    pub async fn fill_resting(&self, order_id: &str, quantity: f64) -> Result<()> {
        let fill = {
            let mut book = self.book.write().await;
            let idx = book
                .orders
                .iter()
                .position(|(o, _)| o.order_id == order_id)
                .ok_or_else(|| Error::Other(format!("no resting order {order_id}")))?;
            let (order, price) = &mut book.orders[idx];
            let quantity = quantity.min(order.remaining());
            order.filled += quantity;
            let fill = Fill {
                order_id: order.order_id.clone(),
                symbol: order.symbol.clone(),
                side: order.side,
                price: *price,
                quantity,
                remaining: order.remaining(),
                timestamp: Utc::now(),
            };
            if fill.remaining <= 0.0 {
                book.orders.remove(idx);
            }
            apply_fill(&mut book, &fill);
            fill
        };
        let _ = self.fills_tx.send(fill);
        Ok(())
    }
}

fn apply_fill(book: &mut Book, fill: &Fill) {
    let notional = fill.quantity * fill.price;
    let signed = match fill.side {
        OrderSide::Buy => {
            book.funds -= notional;
            fill.quantity
        }
        OrderSide::Sell => {
            book.funds += notional;
            -fill.quantity
        }
    };
    let held = book.positions.entry(fill.symbol.clone()).or_insert(0.0);
    *held += signed;
    if held.abs() < 1e-9 {
        book.positions.remove(&fill.symbol);
    }
}

fn read_bars(path: &Path) -> Result<Vec<Bar>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut bars = Vec::new();
    for row in reader.deserialize::<Bar>() {
        bars.push(row?);
    }
    Ok(bars)
}

#[async_trait]
impl Broker for PaperBroker {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        self.connects.fetch_add(1, Ordering::SeqCst);
        info!(account = %self.account_id, "PaperBroker connected");
        Ok(())
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("PaperBroker disconnected");
        }
    }

    async fn managed_accounts(&self) -> Result<Vec<String>> {
        self.require_connection()?;
        Ok(vec![self.account_id.clone()])
    }

    async fn account_type(&self) -> Result<Option<String>> {
        self.require_connection()?;
        Ok(self.account_type.clone())
    }

    async fn available_funds(&self) -> Result<f64> {
        self.require_connection()?;
        Ok(self.book.read().await.funds)
    }

    async fn net_liquidation(&self) -> Result<Option<f64>> {
        self.require_connection()?;
        let book = self.book.read().await;
        let holdings: f64 = book
            .positions
            .iter()
            .map(|(symbol, qty)| qty * self.last_close(symbol).unwrap_or(0.0))
            .sum();
        Ok(Some(book.funds + holdings))
    }

    async fn open_positions(&self) -> Result<BTreeMap<String, f64>> {
        self.require_connection()?;
        Ok(self
            .book
            .read()
            .await
            .positions
            .iter()
            .filter(|(_, qty)| **qty != 0.0)
            .map(|(s, q)| (s.clone(), *q))
            .collect())
    }

    async fn open_orders(&self) -> Result<Vec<OpenOrder>> {
        self.require_connection()?;
        Ok(self
            .book
            .read()
            .await
            .orders
            .iter()
            .map(|(o, _)| o.clone())
            .collect())
    }

    async fn fetch_bars(&self, symbol: &str, lookback_days: u32) -> Result<Vec<Bar>> {
        self.require_connection()?;
        if self.drop_on_fetch.lock().await.remove(symbol) {
            self.connected.store(false, Ordering::SeqCst);
            warn!(symbol, "Simulated connection drop");
            return Err(Error::Connectivity(format!(
                "socket disconnected while fetching {symbol}"
            )));
        }
        let hang = self.hang_on_fetch.lock().await.remove(symbol);
        if hang {
            warn!(symbol, "Simulated stalled request");
            std::future::pending::<()>().await;
        }
        let bars = self.bars.get(symbol).ok_or_else(|| Error::InvalidInstrument {
            symbol: symbol.to_string(),
            reason: "no security definition found".into(),
        })?;
        let Some(last) = bars.last() else {
            return Ok(Vec::new());
        };
        let since = last.date - Duration::days(i64::from(lookback_days));
        Ok(bars.iter().filter(|b| b.date > since).cloned().collect())
    }

    async fn submit_order(&self, order: &Order) -> Result<String> {
        self.require_connection()?;
        if order.quantity <= 0.0 {
            return Err(Error::Other(format!(
                "order quantity must be positive, got {}",
                order.quantity
            )));
        }
        let last = self
            .last_close(&order.symbol)
            .ok_or_else(|| Error::InvalidInstrument {
                symbol: order.symbol.clone(),
                reason: "no price available".into(),
            })?;
        let price = order.limit_price.unwrap_or(last);

        if self.resting.load(Ordering::SeqCst) {
            debug!(symbol = %order.symbol, order_id = %order.id, "Paper order resting");
            self.book.write().await.orders.push((
                OpenOrder {
                    order_id: order.id.clone(),
                    symbol: order.symbol.clone(),
                    side: order.side,
                    total_quantity: order.quantity,
                    filled: 0.0,
                },
                price,
            ));
            return Ok(order.id.clone());
        }

        let fill = Fill {
            order_id: order.id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            price,
            quantity: order.quantity,
            remaining: 0.0,
            timestamp: Utc::now(),
        };
        debug!(
            symbol = %fill.symbol,
            side = %fill.side,
            price,
            qty = fill.quantity,
            "Paper fill simulated"
        );
        apply_fill(&mut *self.book.write().await, &fill);
        let _ = self.fills_tx.send(fill);
        Ok(order.id.clone())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.require_connection()?;
        let mut book = self.book.write().await;
        let before = book.orders.len();
        book.orders.retain(|(o, _)| o.order_id != order_id);
        if book.orders.len() == before {
            return Err(Error::Other(format!("no working order {order_id}")));
        }
        Ok(())
    }

    fn subscribe_fills(&self) -> broadcast::Receiver<Fill> {
        self.fills_tx.subscribe()
    }
}

#[async_trait]
impl SymbolUniverse for PaperBroker {
    async fn symbols(&self) -> Result<Vec<String>> {
        let mut symbols: Vec<String> = self
            .bars
            .keys()
            .chain(self.unknown_symbols.iter())
            .cloned()
            .collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }
}
