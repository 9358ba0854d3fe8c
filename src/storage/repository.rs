use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::collector::types::{MarketSnapshot, Trade};
use crate::indicators::IndicatorSnapshot;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed document: {0}")]
    Malformed(String),
}

/// Document collection selector for latest-by-symbol queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Market,
    Indicator,
    Trade,
}

/// Persistence contract for market data, indicators and monitoring
/// records. Implementations report failures; they never retry
/// internally and never panic into callers.
#[async_trait]
pub trait MarketRepository: Send + Sync {
    async fn store_market_snapshot(&self, snapshot: &MarketSnapshot) -> Result<(), StorageError>;

    async fn store_indicator_snapshot(
        &self,
        snapshot: &IndicatorSnapshot,
    ) -> Result<(), StorageError>;

    /// Stores one batch of recent public trades as a single document.
    async fn store_trades(
        &self,
        symbol: &str,
        ts_ms: u64,
        trades: &[Trade],
    ) -> Result<(), StorageError>;

    async fn store_api_metric(
        &self,
        endpoint: &str,
        metric_type: &str,
        value: f64,
    ) -> Result<(), StorageError>;

    async fn store_monitoring_event(
        &self,
        endpoint: &str,
        event_type: &str,
        details: serde_json::Value,
    ) -> Result<(), StorageError>;

    /// Newest-first documents for a symbol from the selected collection.
    async fn get_latest(
        &self,
        symbol: &str,
        kind: SnapshotKind,
        limit: u32,
    ) -> Result<Vec<serde_json::Value>, StorageError>;

    /// Removes documents older than `age` from every collection.
    /// Returns the number of rows deleted.
    async fn cleanup_older_than(&self, age: Duration) -> Result<u64, StorageError>;

    /// Closes the underlying connection pool. Calls after close fail
    /// with `StorageError::Database`.
    async fn close(&self);
}
