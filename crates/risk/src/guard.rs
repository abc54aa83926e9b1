use std::collections::BTreeMap;

use tracing::{info, warn};

use common::{OpenOrder, OrderIntent, OrderSide, SkipReason};
use strategy::SignalReport;

/// Quantities at or below this are treated as zero.
const QTY_EPSILON: f64 = 1e-9;

/// Shares still working across open orders for `symbol` on `side`:
/// the sum of `total_quantity - filled` over matching orders.
pub fn pending_shares(orders: &[OpenOrder], symbol: &str, side: OrderSide) -> f64 {
    orders
        .iter()
        .filter(|o| o.symbol == symbol && o.side == side)
        .map(OpenOrder::remaining)
        .filter(|r| *r > 0.0)
        .sum()
}

/// The gatekeeper between the signal pipeline and the order executor.
///
/// One guard lives for one scan chunk (or one monitoring pass). It skips
/// buys for symbols already held or with a buy already working, sizes sells
/// net of working sells, and keeps a running funds balance that is
/// decremented locally for every submitted buy because the broker balance
/// is not re-queried mid-chunk.
#[derive(Debug, Clone)]
pub struct ExecutionGuard {
    available_funds: f64,
    /// Orders submitted through this guard, by broker order id. Until the
    /// broker lists an order as open it counts as pending here.
    submitted: Vec<(String, OrderIntent)>,
}

impl ExecutionGuard {
    pub fn new(available_funds: f64) -> Self {
        Self {
            available_funds,
            submitted: Vec::new(),
        }
    }

    pub fn available_funds(&self) -> f64 {
        self.available_funds
    }

    fn pending(&self, orders: &[OpenOrder], symbol: &str, side: OrderSide) -> f64 {
        let unreported: f64 = self
            .submitted
            .iter()
            .filter(|(id, intent)| {
                intent.symbol == symbol
                    && intent.side == side
                    && !orders.iter().any(|o| &o.order_id == id)
            })
            .map(|(_, intent)| intent.quantity)
            .sum();
        pending_shares(orders, symbol, side) + unreported
    }

    /// Cheap pre-check before any bars are fetched for `symbol`.
    pub fn screen_buy(
        &self,
        symbol: &str,
        positions: &BTreeMap<String, f64>,
        orders: &[OpenOrder],
    ) -> Result<(), SkipReason> {
        if positions.contains_key(symbol) {
            return Err(SkipReason::AlreadyHeld);
        }
        let pending = self.pending(orders, symbol, OrderSide::Buy);
        if pending > QTY_EPSILON {
            return Err(SkipReason::PendingBuy { shares: pending });
        }
        Ok(())
    }

    /// Turn a BUY report into an intent if the symbol is free and the
    /// running balance covers the estimated cost.
    pub fn approve_buy(
        &self,
        report: &SignalReport,
        positions: &BTreeMap<String, f64>,
        orders: &[OpenOrder],
    ) -> Result<OrderIntent, SkipReason> {
        self.screen_buy(&report.symbol, positions, orders)?;

        let quantity = report.sizing.target_shares as f64;
        let cost = quantity * report.price;
        if cost > self.available_funds {
            warn!(
                symbol = %report.symbol,
                cost,
                available = self.available_funds,
                "Insufficient funds for buy"
            );
            return Err(SkipReason::InsufficientFunds {
                cost,
                available: self.available_funds,
            });
        }

        Ok(OrderIntent {
            symbol: report.symbol.clone(),
            side: OrderSide::Buy,
            quantity,
            reference_price: report.price,
        })
    }

    /// Shares to sell after netting out sells already working.
    pub fn sell_quantity(
        &self,
        symbol: &str,
        held: f64,
        orders: &[OpenOrder],
    ) -> Result<f64, SkipReason> {
        let pending = self.pending(orders, symbol, OrderSide::Sell);
        let shares_to_sell = held - pending;
        if shares_to_sell <= QTY_EPSILON {
            return Err(SkipReason::CoveredByPendingSells { held, pending });
        }
        Ok(shares_to_sell)
    }

    pub fn approve_sell(
        &self,
        symbol: &str,
        held: f64,
        orders: &[OpenOrder],
        reference_price: f64,
    ) -> Result<OrderIntent, SkipReason> {
        let quantity = self.sell_quantity(symbol, held, orders)?;
        Ok(OrderIntent {
            symbol: symbol.to_string(),
            side: OrderSide::Sell,
            quantity,
            reference_price,
        })
    }

    /// Record an intent the broker accepted under `order_id`. Buys draw
    /// down the running balance.
    pub fn record_submitted(&mut self, order_id: &str, intent: &OrderIntent) {
        self.submitted.push((order_id.to_string(), intent.clone()));

        if intent.side == OrderSide::Buy {
            self.available_funds -= intent.quantity * intent.reference_price;
        }
        info!(
            symbol = %intent.symbol,
            side = %intent.side,
            qty = intent.quantity,
            order_id,
            available = self.available_funds,
            "Order recorded against guard"
        );
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use common::Action;
    use strategy::PositionSizing;

    fn open_order(symbol: &str, side: OrderSide, total: f64, filled: f64) -> OpenOrder {
        OpenOrder {
            order_id: format!("{symbol}-{side}"),
            symbol: symbol.into(),
            side,
            total_quantity: total,
            filled,
        }
    }

    fn buy_report(symbol: &str, shares: u64, price: f64) -> SignalReport {
        SignalReport {
            symbol: symbol.into(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            action: Action::Buy,
            price,
            atr: 1.0,
            sizing: PositionSizing {
                target_shares: shares,
                target_weight: 0.01,
            },
        }
    }

    #[test]
    fn pending_shares_sums_unfilled_matching_orders() {
        let orders = vec![
            open_order("AAPL", OrderSide::Buy, 100.0, 40.0),
            open_order("AAPL", OrderSide::Buy, 10.0, 0.0),
            open_order("AAPL", OrderSide::Sell, 50.0, 0.0),
            open_order("MSFT", OrderSide::Buy, 70.0, 0.0),
            open_order("AAPL", OrderSide::Buy, 5.0, 5.0),
        ];
        assert_eq!(pending_shares(&orders, "AAPL", OrderSide::Buy), 70.0);
        assert_eq!(pending_shares(&orders, "AAPL", OrderSide::Sell), 50.0);
        assert_eq!(pending_shares(&orders, "TSLA", OrderSide::Buy), 0.0);
    }

    #[test]
    fn held_symbol_is_skipped() {
        let guard = ExecutionGuard::new(10_000.0);
        let positions = BTreeMap::from([("AAPL".to_string(), 10.0)]);
        assert_eq!(
            guard.screen_buy("AAPL", &positions, &[]),
            Err(SkipReason::AlreadyHeld)
        );
    }

    #[test]
    fn partially_filled_buy_blocks_resubmission() {
        let guard = ExecutionGuard::new(10_000.0);
        let orders = vec![open_order("AAPL", OrderSide::Buy, 100.0, 60.0)];
        assert_eq!(
            guard.approve_buy(&buy_report("AAPL", 5, 10.0), &BTreeMap::new(), &orders),
            Err(SkipReason::PendingBuy { shares: 40.0 })
        );
    }

    #[test]
    fn running_funds_gate_buys_within_a_chunk() {
        let mut guard = ExecutionGuard::new(1_000.0);
        let positions = BTreeMap::new();

        let first = guard
            .approve_buy(&buy_report("AAPL", 6, 100.0), &positions, &[])
            .unwrap();
        guard.record_submitted("o-1", &first);
        assert_eq!(guard.available_funds(), 400.0);

        let second = guard.approve_buy(&buy_report("MSFT", 5, 100.0), &positions, &[]);
        assert_eq!(
            second,
            Err(SkipReason::InsufficientFunds {
                cost: 500.0,
                available: 400.0
            })
        );

        let third = guard
            .approve_buy(&buy_report("KO", 4, 100.0), &positions, &[])
            .unwrap();
        guard.record_submitted("o-3", &third);
        assert_eq!(guard.available_funds(), 0.0);
    }

    #[test]
    fn submitted_buy_is_not_repeated_before_broker_reports_it() {
        let mut guard = ExecutionGuard::new(10_000.0);
        let report = buy_report("AAPL", 5, 10.0);
        let intent = guard.approve_buy(&report, &BTreeMap::new(), &[]).unwrap();
        guard.record_submitted("o-1", &intent);

        assert_eq!(
            guard.approve_buy(&report, &BTreeMap::new(), &[]),
            Err(SkipReason::PendingBuy { shares: 5.0 })
        );

        // Once the broker lists the order it is not counted twice.
        let listed = vec![OpenOrder {
            order_id: "o-1".into(),
            ..open_order("AAPL", OrderSide::Buy, 5.0, 0.0)
        }];
        assert_eq!(
            guard.approve_buy(&report, &BTreeMap::new(), &listed),
            Err(SkipReason::PendingBuy { shares: 5.0 })
        );
    }

    #[test]
    fn sell_is_netted_against_working_sells() {
        let guard = ExecutionGuard::new(0.0);
        let orders = vec![open_order("AAPL", OrderSide::Sell, 30.0, 10.0)];
        let intent = guard.approve_sell("AAPL", 100.0, &orders, 50.0).unwrap();
        assert_eq!(intent.quantity, 80.0);
        assert_eq!(intent.side, OrderSide::Sell);
    }

    #[test]
    fn fully_covered_sell_is_skipped() {
        let guard = ExecutionGuard::new(0.0);
        let orders = vec![open_order("AAPL", OrderSide::Sell, 100.0, 0.0)];
        assert_eq!(
            guard.approve_sell("AAPL", 100.0, &orders, 50.0),
            Err(SkipReason::CoveredByPendingSells {
                held: 100.0,
                pending: 100.0
            })
        );
    }

    #[test]
    fn recorded_sell_covers_position() {
        let mut guard = ExecutionGuard::new(0.0);
        let working = vec![open_order("AAPL", OrderSide::Sell, 30.0, 0.0)];
        let intent = guard.approve_sell("AAPL", 100.0, &working, 50.0).unwrap();
        assert_eq!(intent.quantity, 70.0);
        guard.record_submitted("o-2", &intent);
        assert!(guard.approve_sell("AAPL", 100.0, &working, 50.0).is_err());
        // Sells do not touch the buy balance.
        assert_eq!(guard.available_funds(), 0.0);
    }
}
