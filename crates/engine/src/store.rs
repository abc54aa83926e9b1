use std::collections::{HashSet, VecDeque};

use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use common::{Error, Fill, Result};

use crate::scheduler::ScanState;

/// SQLite persistence for scan progress, the instrument denylist and the
/// fill journal.
#[derive(Clone)]
pub struct ScanStore {
    db: SqlitePool,
}

impl ScanStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.db).await?;
        Ok(())
    }

    /// The persisted scan state, if it belongs to `today`.
    pub async fn load(&self, today: NaiveDate) -> Result<Option<ScanState>> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT scan_date, all_symbols, remaining_symbols FROM scan_state WHERE id = 1",
        )
        .fetch_optional(&self.db)
        .await?;

        let Some((scan_date, all, remaining)) = row else {
            return Ok(None);
        };
        let scan_date = NaiveDate::parse_from_str(&scan_date, "%Y-%m-%d")
            .map_err(|e| Error::Other(format!("stored scan_date '{scan_date}': {e}")))?;
        if scan_date != today {
            debug!(stored = %scan_date, today = %today, "Discarding stale scan state");
            return Ok(None);
        }

        let state = ScanState {
            scan_date,
            all_symbols: serde_json::from_str(&all)?,
            remaining: serde_json::from_str::<VecDeque<String>>(&remaining)?,
        };
        info!(
            date = %scan_date,
            remaining = state.remaining.len(),
            total = state.all_symbols.len(),
            "Resuming persisted scan state"
        );
        Ok(Some(state))
    }

    pub async fn save(&self, state: &ScanState) -> Result<()> {
        let all = serde_json::to_string(&state.all_symbols)?;
        let remaining = serde_json::to_string(&state.remaining)?;
        sqlx::query(
            r#"
            INSERT INTO scan_state (id, scan_date, all_symbols, remaining_symbols, updated_at)
            VALUES (1, ?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                scan_date = excluded.scan_date,
                all_symbols = excluded.all_symbols,
                remaining_symbols = excluded.remaining_symbols,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(state.scan_date.format("%Y-%m-%d").to_string())
        .bind(all)
        .bind(remaining)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn denylist(&self) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT symbol FROM denylist")
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(|(symbol,)| symbol).collect())
    }

    /// Exclude `symbol` from future universe fetches.
    pub async fn deny(&self, symbol: &str, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO denylist (symbol, reason, added_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(symbol) DO NOTHING
            "#,
        )
        .bind(symbol)
        .bind(reason)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;
        info!(symbol, reason, "Symbol added to denylist");
        Ok(())
    }

    pub async fn record_fill(&self, fill: &Fill) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fills (order_id, symbol, side, price, quantity, remaining, filled_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&fill.order_id)
        .bind(&fill.symbol)
        .bind(fill.side)
        .bind(fill.price)
        .bind(fill.quantity)
        .bind(fill.remaining)
        .bind(fill.timestamp.to_rfc3339())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Journaled fills for one order, oldest first.
    pub async fn fills_for_order(&self, order_id: &str) -> Result<Vec<(f64, f64)>> {
        let rows: Vec<(f64, f64)> = sqlx::query_as(
            "SELECT quantity, remaining FROM fills WHERE order_id = ?1 ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderSide;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> ScanStore {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = ScanStore::new(db);
        store.migrate().await.unwrap();
        store
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[tokio::test]
    async fn scan_state_round_trips_for_same_day_only() {
        let store = memory_store().await;
        assert!(store.load(day(4)).await.unwrap().is_none());

        let mut state = ScanState::new(day(4), vec!["A".into(), "B".into(), "C".into()]);
        state.next_chunk(2);
        store.save(&state).await.unwrap();

        assert_eq!(store.load(day(4)).await.unwrap(), Some(state.clone()));
        assert!(store.load(day(5)).await.unwrap().is_none());

        // Overwrites the single row.
        state.next_chunk(2);
        store.save(&state).await.unwrap();
        let loaded = store.load(day(4)).await.unwrap().unwrap();
        assert!(loaded.remaining.is_empty());
    }

    #[tokio::test]
    async fn denylist_is_idempotent() {
        let store = memory_store().await;
        store.deny("XYZ", "no security definition").await.unwrap();
        store.deny("XYZ", "again").await.unwrap();
        let denied = store.denylist().await.unwrap();
        assert_eq!(denied.len(), 1);
        assert!(denied.contains("XYZ"));
    }

    #[tokio::test]
    async fn fills_are_journaled() {
        let store = memory_store().await;
        for (qty, remaining) in [(40.0, 60.0), (60.0, 0.0)] {
            store
                .record_fill(&Fill {
                    order_id: "o-1".into(),
                    symbol: "AAPL".into(),
                    side: OrderSide::Buy,
                    price: 101.25,
                    quantity: qty,
                    remaining,
                    timestamp: Utc::now(),
                })
                .await
                .unwrap();
        }
        let fills = store.fills_for_order("o-1").await.unwrap();
        assert_eq!(fills, vec![(40.0, 60.0), (60.0, 0.0)]);
    }
}
