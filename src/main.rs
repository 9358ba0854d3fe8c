use std::sync::Arc;

use tickerd::{
    collector::{BybitClient, MarketDataSource},
    config::AppConfig,
    logger::init_tracing,
    metrics::counters::Counters,
    monitoring::ApiMonitor,
    storage::{Db, MarketRepository, SqlxMarketRepository},
    supervisor::Supervisor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("Starting tickerd...");

    let cfg = AppConfig::from_env();
    cfg.validate()?;

    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;

    let repo: Arc<dyn MarketRepository> =
        Arc::new(SqlxMarketRepository::new(db.pool.as_ref().clone()));

    let source: Arc<dyn MarketDataSource> = Arc::new(BybitClient::new(
        cfg.http_endpoint.clone(),
        cfg.use_testnet,
    )?);

    let monitor = ApiMonitor::new(cfg.alert_thresholds, Arc::clone(&repo));
    let counters = Counters::default();

    let supervisor = Supervisor::start(&cfg, source, repo, monitor, counters)?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    // A timed-out drain propagates as an error and a non-zero exit.
    supervisor.shutdown().await?;

    Ok(())
}
