use std::time::Duration;

use async_trait::async_trait;
use sqlx::{AnyPool, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::collector::types::{MarketSnapshot, Trade};
use crate::indicators::IndicatorSnapshot;
use crate::storage::repository::{MarketRepository, SnapshotKind, StorageError};
use crate::time::now_ms;

/// SQLx-backed implementation of MarketRepository.
/// Responsible only for persistence and row mapping.
pub struct SqlxMarketRepository {
    pool: AnyPool,
}

impl SqlxMarketRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    async fn insert_document(
        &self,
        table: &'static str,
        symbol: &str,
        ts_ms: u64,
        payload: String,
    ) -> Result<(), StorageError> {
        let sql = format!("INSERT INTO {table} (id, symbol, ts_ms, payload) VALUES (?, ?, ?, ?);");
        sqlx::query(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(symbol)
            .bind(ts_ms as i64)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MarketRepository for SqlxMarketRepository {
    async fn store_market_snapshot(&self, snapshot: &MarketSnapshot) -> Result<(), StorageError> {
        let payload = serde_json::to_string(snapshot)?;

        sqlx::query(
            r#"
INSERT INTO market_snapshots (id, symbol, ts_ms, price, payload)
VALUES (?, ?, ?, ?, ?);
"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&snapshot.symbol)
        .bind(snapshot.ts_ms as i64)
        .bind(snapshot.price)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        debug!(symbol = %snapshot.symbol, ts_ms = snapshot.ts_ms, "stored market snapshot");
        Ok(())
    }

    async fn store_indicator_snapshot(
        &self,
        snapshot: &IndicatorSnapshot,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_string(snapshot)?;
        self.insert_document("indicator_snapshots", &snapshot.symbol, snapshot.ts_ms, payload)
            .await?;

        debug!(symbol = %snapshot.symbol, ts_ms = snapshot.ts_ms, "stored indicator snapshot");
        Ok(())
    }

    async fn store_trades(
        &self,
        symbol: &str,
        ts_ms: u64,
        trades: &[Trade],
    ) -> Result<(), StorageError> {
        if trades.is_empty() {
            return Ok(());
        }
        let payload = serde_json::to_string(trades)?;
        self.insert_document("trades", symbol, ts_ms, payload).await?;

        debug!(symbol = %symbol, count = trades.len(), "stored trade batch");
        Ok(())
    }

    async fn store_api_metric(
        &self,
        endpoint: &str,
        metric_type: &str,
        value: f64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
INSERT INTO api_metrics (id, endpoint, metric_type, value, ts_ms)
VALUES (?, ?, ?, ?, ?);
"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(endpoint)
        .bind(metric_type)
        .bind(value)
        .bind(now_ms() as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn store_monitoring_event(
        &self,
        endpoint: &str,
        event_type: &str,
        details: serde_json::Value,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
INSERT INTO monitoring_events (id, endpoint, event_type, details, ts_ms)
VALUES (?, ?, ?, ?, ?);
"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(endpoint)
        .bind(event_type)
        .bind(details.to_string())
        .bind(now_ms() as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_latest(
        &self,
        symbol: &str,
        kind: SnapshotKind,
        limit: u32,
    ) -> Result<Vec<serde_json::Value>, StorageError> {
        let table = match kind {
            SnapshotKind::Market => "market_snapshots",
            SnapshotKind::Indicator => "indicator_snapshots",
            SnapshotKind::Trade => "trades",
        };

        let sql = format!(
            "SELECT payload FROM {table} WHERE symbol = ? ORDER BY ts_ms DESC LIMIT ?;"
        );
        let rows = sqlx::query(&sql)
            .bind(symbol)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let payload: String = r.get("payload");
            match serde_json::from_str(&payload) {
                Ok(doc) => out.push(doc),
                Err(e) => {
                    // poison-row resilience: skip but don't fail the query
                    warn!(error = %e, table, "skipping malformed document row");
                }
            }
        }

        Ok(out)
    }

    async fn cleanup_older_than(&self, age: Duration) -> Result<u64, StorageError> {
        let cutoff = now_ms().saturating_sub(age.as_millis() as u64) as i64;
        let mut deleted = 0u64;

        for table in [
            "market_snapshots",
            "indicator_snapshots",
            "trades",
            "api_metrics",
            "monitoring_events",
        ] {
            let sql = format!("DELETE FROM {table} WHERE ts_ms < ?;");
            let res = sqlx::query(&sql).bind(cutoff).execute(&self.pool).await?;
            deleted += res.rows_affected();
        }

        debug!(deleted, cutoff_ms = cutoff, "cleanup pass complete");
        Ok(deleted)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
