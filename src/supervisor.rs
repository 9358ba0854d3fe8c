//! Process supervisor.
//!
//! Owns the health-monitor sampling loop and the update coordinator,
//! and implements the ordered shutdown protocol: drain the coordinator
//! first, then close storage, then stop the monitor. The order avoids
//! persistence calls against a closed pool from in-flight cycles.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::collector::source::MarketDataSource;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::metrics::counters::Counters;
use crate::monitoring::{ApiMonitor, run_sampling_loop};
use crate::storage::repository::MarketRepository;
use crate::updater::{ShutdownOutcome, UpdateCoordinator, UpdaterConfig};

/// Bound on waiting for the monitor loop to acknowledge shutdown; it
/// may be mid-probe when signalled.
const MONITOR_STOP_WAIT: Duration = Duration::from_secs(5);

pub struct Supervisor {
    coordinator: UpdateCoordinator,
    repo: Arc<dyn MarketRepository>,
    monitor_shutdown: watch::Sender<bool>,
    monitor_handle: JoinHandle<()>,
    shutdown_timeout_secs: u64,
}

impl Supervisor {
    /// Starts the monitor sampling loop and the update coordinator as
    /// independent tasks. Returns once both are scheduled.
    pub fn start(
        cfg: &AppConfig,
        source: Arc<dyn MarketDataSource>,
        repo: Arc<dyn MarketRepository>,
        monitor: Arc<ApiMonitor>,
        counters: Counters,
    ) -> Result<Self, AppError> {
        cfg.validate()?;

        let (monitor_shutdown, monitor_shutdown_rx) = watch::channel(false);

        // The first configured symbol doubles as the health probe.
        let probe_symbol = cfg.symbols[0].clone();
        let monitor_handle = tokio::spawn(run_sampling_loop(
            Arc::clone(&monitor),
            Arc::clone(&source),
            probe_symbol,
            Duration::from_secs(cfg.health_check_interval_secs),
            monitor_shutdown_rx,
        ));

        let updater_cfg = UpdaterConfig::new(
            cfg.symbols.clone(),
            Duration::from_secs(cfg.update_interval_secs),
            cfg.max_retries,
            Duration::from_secs(cfg.shutdown_timeout_secs),
        );

        let coordinator =
            UpdateCoordinator::start(updater_cfg, source, Arc::clone(&repo), monitor, counters)?;

        info!("supervisor started monitor and coordinator loops");

        Ok(Self {
            coordinator,
            repo,
            monitor_shutdown,
            monitor_handle,
            shutdown_timeout_secs: cfg.shutdown_timeout_secs,
        })
    }

    pub fn coordinator(&self) -> &UpdateCoordinator {
        &self.coordinator
    }

    /// Ordered shutdown. Returns `ShutdownTimeout` when the coordinator
    /// drain exceeded its bound; resources are closed either way.
    pub async fn shutdown(mut self) -> Result<(), AppError> {
        info!("supervisor shutting down");

        let outcome = self.coordinator.stop().await;

        // Storage closes after the coordinator drained (or gave up);
        // any detached cycle that outlived the timeout will surface a
        // storage error and be counted as a failed cycle.
        self.repo.close().await;

        let _ = self.monitor_shutdown.send(true);
        if timeout(MONITOR_STOP_WAIT, self.monitor_handle).await.is_err() {
            warn!("monitor loop did not stop within the wait bound");
        }

        match outcome {
            ShutdownOutcome::Clean => {
                info!("shutdown complete");
                Ok(())
            }
            ShutdownOutcome::TimedOut => Err(AppError::ShutdownTimeout {
                timeout_secs: self.shutdown_timeout_secs,
            }),
        }
    }
}
