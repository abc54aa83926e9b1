use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One daily OHLCV row. Series are ascending by date with no duplicate dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Live decision read from the last row of a filtered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

/// A sized request to trade, produced by the signal pipeline and consumed
/// once by the execution guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub reference_price: f64,
}

impl OrderIntent {
    /// Buys go out as limit orders at the reference price rounded to cents,
    /// sells as market orders.
    pub fn into_order(self) -> Order {
        match self.side {
            OrderSide::Buy => {
                let limit = (self.reference_price * 100.0).round() / 100.0;
                Order::limit(self.symbol, OrderSide::Buy, self.quantity, limit)
            }
            OrderSide::Sell => Order::market(self.symbol, OrderSide::Sell, self.quantity),
        }
    }
}

/// An order to be submitted to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    /// `None` = market order; `Some(price)` = limit order.
    pub limit_price: Option<f64>,
}

impl Order {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            quantity,
            limit_price: None,
        }
    }

    pub fn limit(symbol: impl Into<String>, side: OrderSide, quantity: f64, price: f64) -> Self {
        Self {
            limit_price: Some(price),
            ..Self::market(symbol, side, quantity)
        }
    }
}

/// A working order as reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub total_quantity: f64,
    pub filled: f64,
}

impl OpenOrder {
    pub fn remaining(&self) -> f64 {
        self.total_quantity - self.filled
    }
}

/// Fill notification pushed by the broker. `remaining` is what is still
/// working on the parent order after this fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub price: f64,
    pub quantity: f64,
    pub remaining: f64,
    pub timestamp: DateTime<Utc>,
}

impl Fill {
    pub fn is_partial(&self) -> bool {
        self.remaining > 0.0
    }
}

/// Reason the execution guard declined to produce an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    AlreadyHeld,
    PendingBuy { shares: f64 },
    CoveredByPendingSells { held: f64, pending: f64 },
    InsufficientFunds { cost: f64, available: f64 },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AlreadyHeld => write!(f, "position already held"),
            SkipReason::PendingBuy { shares } => {
                write!(f, "{shares} shares already pending purchase")
            }
            SkipReason::CoveredByPendingSells { held, pending } => {
                write!(f, "all {held} shares covered by {pending} pending sale")
            }
            SkipReason::InsufficientFunds { cost, available } => {
                write!(f, "insufficient funds: cost {cost:.2}, available {available:.2}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_intent_becomes_rounded_limit_order() {
        let order = OrderIntent {
            symbol: "AAPL".into(),
            side: OrderSide::Buy,
            quantity: 10.0,
            reference_price: 187.456,
        }
        .into_order();
        assert_eq!(order.limit_price, Some(187.46));
        assert_eq!(order.side, OrderSide::Buy);
    }

    #[test]
    fn sell_intent_becomes_market_order() {
        let order = OrderIntent {
            symbol: "AAPL".into(),
            side: OrderSide::Sell,
            quantity: 5.0,
            reference_price: 190.0,
        }
        .into_order();
        assert!(order.limit_price.is_none());
        assert_eq!(order.quantity, 5.0);
    }

    #[test]
    fn open_order_remaining() {
        let o = OpenOrder {
            order_id: "1".into(),
            symbol: "MSFT".into(),
            side: OrderSide::Buy,
            total_quantity: 100.0,
            filled: 40.0,
        };
        assert_eq!(o.remaining(), 60.0);
    }
}
