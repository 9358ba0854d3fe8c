use serde::{Deserialize, Serialize};

// =========================
// Bybit v5 wire types
// =========================

/// Standard Bybit v5 response envelope. `ret_code != 0` means the call
/// failed even when HTTP status is 200.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(rename = "retCode")]
    pub ret_code: i64,
    #[serde(rename = "retMsg", default)]
    pub ret_msg: String,
    pub result: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct TickerResult {
    pub list: Vec<TickerEntry>,
}

#[derive(Debug, Deserialize)]
pub struct TickerEntry {
    pub symbol: String,
    #[serde(rename = "lastPrice")]
    pub last_price: String,
    #[serde(rename = "highPrice24h", default)]
    pub high_price_24h: String,
    #[serde(rename = "lowPrice24h", default)]
    pub low_price_24h: String,
    #[serde(rename = "volume24h", default)]
    pub volume_24h: String,
    #[serde(rename = "turnover24h", default)]
    pub turnover_24h: String,
}

/// Klines arrive as positional string arrays:
/// [start, open, high, low, close, volume, turnover], newest first.
#[derive(Debug, Deserialize)]
pub struct KlineResult {
    pub list: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct OrderBookResult {
    #[serde(rename = "b")]
    pub bids: Vec<Vec<String>>,
    #[serde(rename = "a")]
    pub asks: Vec<Vec<String>>,
    pub ts: u64,
}

#[derive(Debug, Deserialize)]
pub struct TradesResult {
    pub list: Vec<TradeEntry>,
}

#[derive(Debug, Deserialize)]
pub struct TradeEntry {
    #[serde(rename = "execId")]
    pub exec_id: String,
    pub price: String,
    pub size: String,
    pub side: String,
    pub time: String,
}

// =========================
// Domain types
// =========================

/// One OHLCV point, ascending time order within a series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub ts_ms: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub turnover: f64,
}

/// Price level as (price, quantity).
pub type BookLevel = (f64, f64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub ts_ms: u64,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub price: f64,
    pub qty: f64,
    pub ts_ms: u64,
    /// True when the aggressor sold into the book.
    pub buyer_is_maker: bool,
}

/// Immutable result of one fetch for one symbol. Produced by the
/// collector, handed to persistence as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub ts_ms: u64,
    pub price: f64,
    pub volume_24h: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub orderbook: OrderBook,
    pub trades: Vec<Trade>,
    pub exchange: String,
}
