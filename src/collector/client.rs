use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::collector::errors::CollectorError;
use crate::collector::source::MarketDataSource;
use crate::collector::types::{
    ApiEnvelope, Candle, KlineResult, MarketSnapshot, OrderBook, OrderBookResult, TickerResult,
    Trade, TradesResult,
};
use crate::time::now_ms;

const MAINNET_URL: &str = "https://api.bybit.com";
const TESTNET_URL: &str = "https://api-testnet.bybit.com";

const ORDERBOOK_DEPTH: u32 = 100;
const RECENT_TRADES_LIMIT: u32 = 50;

/// HTTP collector against the Bybit v5 public market endpoints.
#[derive(Clone)]
pub struct BybitClient {
    http: Client,
    url: String,
}

impl BybitClient {
    /// `endpoint` overrides routing entirely; otherwise `use_testnet`
    /// selects between mainnet and the sandbox.
    pub fn new(endpoint: Option<String>, use_testnet: bool) -> Result<Self, CollectorError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        let url = endpoint.unwrap_or_else(|| {
            if use_testnet { TESTNET_URL } else { MAINNET_URL }.to_string()
        });

        Ok(Self { http, url })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, CollectorError> {
        let url = format!("{}{}", self.url, path);

        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await?
            .error_for_status()?;

        let envelope: ApiEnvelope<T> = resp.json().await?;

        if envelope.ret_code != 0 {
            // Bybit signals rate limiting through retCode 10006 rather
            // than HTTP 429 on some routes.
            if envelope.ret_code == 10006 {
                return Err(CollectorError::RateLimited(envelope.ret_msg));
            }
            return Err(CollectorError::Malformed(format!(
                "retCode {}: {}",
                envelope.ret_code, envelope.ret_msg
            )));
        }

        envelope
            .result
            .ok_or_else(|| CollectorError::Malformed("missing result".into()))
    }

    /// Maps human intervals to the Bybit v5 interval codes.
    fn map_interval(interval: &str) -> Result<&'static str, CollectorError> {
        let mapped = match interval {
            "1m" => "1",
            "3m" => "3",
            "5m" => "5",
            "15m" => "15",
            "30m" => "30",
            "1h" => "60",
            "2h" => "120",
            "4h" => "240",
            "6h" => "360",
            "12h" => "720",
            "1d" => "D",
            "1w" => "W",
            other => {
                return Err(CollectorError::Malformed(format!(
                    "unsupported interval: {other}"
                )));
            }
        };
        Ok(mapped)
    }
}

fn parse_f64(field: &'static str, raw: &str) -> Result<f64, CollectorError> {
    raw.parse()
        .map_err(|_| CollectorError::Malformed(format!("non-numeric {field}: {raw:?}")))
}

fn parse_u64(field: &'static str, raw: &str) -> Result<u64, CollectorError> {
    raw.parse()
        .map_err(|_| CollectorError::Malformed(format!("non-numeric {field}: {raw:?}")))
}

fn parse_levels(side: &'static str, raw: &[Vec<String>]) -> Result<Vec<(f64, f64)>, CollectorError> {
    raw.iter()
        .map(|level| {
            if level.len() < 2 {
                return Err(CollectorError::Malformed(format!("truncated {side} level")));
            }
            Ok((parse_f64(side, &level[0])?, parse_f64(side, &level[1])?))
        })
        .collect()
}

#[async_trait]
impl MarketDataSource for BybitClient {
    #[instrument(skip(self), fields(symbol = %symbol), level = "debug")]
    async fn fetch_snapshot(&self, symbol: &str) -> Result<MarketSnapshot, CollectorError> {
        let tickers: TickerResult = self
            .get("/v5/market/tickers", &[("category", "spot"), ("symbol", symbol)])
            .await?;

        let ticker = tickers
            .list
            .into_iter()
            .next()
            .ok_or_else(|| CollectorError::Malformed(format!("no ticker for {symbol}")))?;

        let depth = ORDERBOOK_DEPTH.to_string();
        let book: OrderBookResult = self
            .get(
                "/v5/market/orderbook",
                &[("category", "spot"), ("symbol", symbol), ("limit", &depth)],
            )
            .await?;

        let trades_limit = RECENT_TRADES_LIMIT.to_string();
        let trades: TradesResult = self
            .get(
                "/v5/market/recent-trade",
                &[
                    ("category", "spot"),
                    ("symbol", symbol),
                    ("limit", &trades_limit),
                ],
            )
            .await?;

        let snapshot = MarketSnapshot {
            symbol: symbol.to_string(),
            ts_ms: now_ms(),
            price: parse_f64("lastPrice", &ticker.last_price)?,
            volume_24h: parse_f64("volume24h", &ticker.volume_24h)?,
            high_24h: parse_f64("highPrice24h", &ticker.high_price_24h)?,
            low_24h: parse_f64("lowPrice24h", &ticker.low_price_24h)?,
            orderbook: OrderBook {
                ts_ms: book.ts,
                bids: parse_levels("bid", &book.bids)?,
                asks: parse_levels("ask", &book.asks)?,
            },
            trades: trades
                .list
                .into_iter()
                .map(|t| {
                    Ok(Trade {
                        id: t.exec_id,
                        price: parse_f64("trade price", &t.price)?,
                        qty: parse_f64("trade size", &t.size)?,
                        ts_ms: parse_u64("trade time", &t.time)?,
                        buyer_is_maker: t.side.eq_ignore_ascii_case("sell"),
                    })
                })
                .collect::<Result<Vec<_>, CollectorError>>()?,
            exchange: "bybit".to_string(),
        };

        debug!(
            price = snapshot.price,
            book_levels = snapshot.orderbook.bids.len(),
            trades = snapshot.trades.len(),
            "market snapshot fetched"
        );

        Ok(snapshot)
    }

    #[instrument(skip(self), fields(symbol = %symbol, interval = %interval), level = "debug")]
    async fn fetch_series(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, CollectorError> {
        let bybit_interval = Self::map_interval(interval)?;
        let limit_str = limit.to_string();

        let klines: KlineResult = self
            .get(
                "/v5/market/kline",
                &[
                    ("category", "spot"),
                    ("symbol", symbol),
                    ("interval", bybit_interval),
                    ("limit", &limit_str),
                ],
            )
            .await?;

        // Bybit returns newest first; series consumers expect ascending time.
        let mut candles = Vec::with_capacity(klines.list.len());
        for row in klines.list.iter().rev() {
            if row.len() < 7 {
                return Err(CollectorError::Malformed("truncated kline row".into()));
            }
            candles.push(Candle {
                ts_ms: parse_u64("kline start", &row[0])?,
                open: parse_f64("kline open", &row[1])?,
                high: parse_f64("kline high", &row[2])?,
                low: parse_f64("kline low", &row[3])?,
                close: parse_f64("kline close", &row[4])?,
                volume: parse_f64("kline volume", &row[5])?,
                turnover: parse_f64("kline turnover", &row[6])?,
            });
        }

        debug!(count = candles.len(), "kline series fetched");

        Ok(candles)
    }
}
