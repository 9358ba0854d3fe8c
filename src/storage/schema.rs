use sqlx::AnyPool;

/// One table per document collection. Payloads are stored as JSON text;
/// the indexed columns exist only to serve latest-by-symbol queries and
/// age-based cleanup.
pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS market_snapshots (
  id TEXT PRIMARY KEY,
  symbol TEXT NOT NULL,
  ts_ms BIGINT NOT NULL,
  price REAL NOT NULL,
  payload TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS indicator_snapshots (
  id TEXT PRIMARY KEY,
  symbol TEXT NOT NULL,
  ts_ms BIGINT NOT NULL,
  payload TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS trades (
  id TEXT PRIMARY KEY,
  symbol TEXT NOT NULL,
  ts_ms BIGINT NOT NULL,
  payload TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS api_metrics (
  id TEXT PRIMARY KEY,
  endpoint TEXT NOT NULL,
  metric_type TEXT NOT NULL,
  value REAL NOT NULL,
  ts_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS monitoring_events (
  id TEXT PRIMARY KEY,
  endpoint TEXT NOT NULL,
  event_type TEXT NOT NULL,
  details TEXT NOT NULL,
  ts_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_market_symbol_ts ON market_snapshots(symbol, ts_ms DESC);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_indicators_symbol_ts ON indicator_snapshots(symbol, ts_ms DESC);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_trades_symbol_ts ON trades(symbol, ts_ms DESC);"#)
        .execute(pool)
        .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_api_metrics_endpoint_ts ON api_metrics(endpoint, metric_type, ts_ms DESC);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_monitoring_endpoint_ts ON monitoring_events(endpoint, ts_ms DESC);"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
