use async_trait::async_trait;

use crate::collector::errors::CollectorError;
use crate::collector::types::{Candle, MarketSnapshot};

/// Abstraction over the upstream market data API.
///
/// This trait intentionally hides:
/// - endpoint routing (mainnet vs sandbox)
/// - response envelope parsing
/// - transport details
///
/// Implementations may fail transiently; callers own retry policy.
#[async_trait]
pub trait MarketDataSource: Send + Sync + 'static {
    /// Fetches ticker, order book and recent trades for one symbol
    /// as a single immutable snapshot.
    async fn fetch_snapshot(&self, symbol: &str) -> Result<MarketSnapshot, CollectorError>;

    /// Fetches an OHLCV series in ascending time order.
    async fn fetch_series(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, CollectorError>;
}
