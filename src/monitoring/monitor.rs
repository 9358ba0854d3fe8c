//! API health monitor.
//!
//! Samples upstream responsiveness on its own cadence and exposes the
//! most recent verdict to the update coordinator. The verdict read is
//! non-blocking and defaults to healthy before the first sample so
//! startup never deadlocks behind the sampler.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::collector::source::MarketDataSource;
use crate::config::AlertThresholds;
use crate::storage::repository::MarketRepository;
use crate::time::now_ms;

/// Most recent health assessment of the upstream API.
#[derive(Debug, Clone, Copy)]
pub struct HealthVerdict {
    pub healthy: bool,
    pub latency_ms: u64,
    pub ts_ms: u64,
}

impl Default for HealthVerdict {
    fn default() -> Self {
        // Unknown is treated as healthy until the first sample lands.
        Self {
            healthy: true,
            latency_ms: 0,
            ts_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSummary {
    pub total_samples: u64,
    pub failed_samples: u64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
}

#[derive(Default)]
struct LatencyStats {
    sum_ms: u64,
    count: u64,
    min_ms: u64,
    max_ms: u64,
}

pub struct ApiMonitor {
    thresholds: AlertThresholds,
    repo: Arc<dyn MarketRepository>,

    verdict: RwLock<HealthVerdict>,
    consecutive_failures: AtomicU32,
    total_samples: AtomicU64,
    failed_samples: AtomicU64,
    latency: Mutex<LatencyStats>,

    /// Symbols with an unresolved terminal alert.
    active_alerts: Mutex<HashSet<String>>,
}

impl ApiMonitor {
    pub fn new(thresholds: AlertThresholds, repo: Arc<dyn MarketRepository>) -> Arc<Self> {
        Arc::new(Self {
            thresholds,
            repo,
            verdict: RwLock::new(HealthVerdict::default()),
            consecutive_failures: AtomicU32::new(0),
            total_samples: AtomicU64::new(0),
            failed_samples: AtomicU64::new(0),
            latency: Mutex::new(LatencyStats::default()),
            active_alerts: Mutex::new(HashSet::new()),
        })
    }

    /// Latest verdict; never blocks on the sampling loop.
    pub fn current_verdict(&self) -> HealthVerdict {
        *self.verdict.read()
    }

    /// Ingests one latency sample and refreshes the verdict.
    ///
    /// A sample is healthy when the call succeeded and latency is under
    /// the alert bar. Threshold breaches are logged and surfaced as
    /// monitoring events; storage trouble here is reported, never fatal.
    pub async fn record_sample(&self, latency_ms: u64, success: bool) {
        self.total_samples.fetch_add(1, Ordering::Relaxed);

        let consecutive = if success {
            let mut stats = self.latency.lock();
            stats.sum_ms += latency_ms;
            stats.count += 1;
            stats.max_ms = stats.max_ms.max(latency_ms);
            stats.min_ms = if stats.count == 1 {
                latency_ms
            } else {
                stats.min_ms.min(latency_ms)
            };
            drop(stats);

            self.consecutive_failures.store(0, Ordering::Relaxed);
            0
        } else {
            self.failed_samples.fetch_add(1, Ordering::Relaxed);
            self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
        };

        let healthy = success && latency_ms <= self.thresholds.latency_ms;
        *self.verdict.write() = HealthVerdict {
            healthy,
            latency_ms,
            ts_ms: now_ms(),
        };

        if success && latency_ms > self.thresholds.latency_ms {
            warn!(latency_ms, "high latency detected");
            self.emit_event("api", "high_latency", json!({ "latency_ms": latency_ms }))
                .await;
        }

        // Emitted once per streak, on the transition; a sustained outage
        // must not flood monitoring_events with one row per sample.
        if !success && consecutive == self.thresholds.consecutive_failures {
            error!(consecutive, "multiple consecutive API failures");
            self.emit_event(
                "api",
                "consecutive_failures",
                json!({ "consecutive": consecutive }),
            )
            .await;
        }

        let summary = self.metrics_summary();
        if summary.total_samples > 0 && summary.error_rate > self.thresholds.error_rate {
            warn!(
                error_rate = summary.error_rate,
                "API error rate above threshold"
            );
        }
    }

    /// Terminal per-symbol alert raised by the coordinator after
    /// `max_retries` consecutive cycle failures.
    pub async fn raise_symbol_alert(&self, symbol: &str, error_count: u32) {
        self.active_alerts.lock().insert(symbol.to_string());

        error!(
            symbol = %symbol,
            error_count,
            "symbol exhausted retries; terminal alert raised"
        );
        self.emit_event(
            symbol,
            "terminal_alert",
            json!({ "error_count": error_count }),
        )
        .await;
    }

    /// Clears a terminal alert after the symbol recovers.
    pub async fn clear_symbol_alert(&self, symbol: &str) {
        if self.active_alerts.lock().remove(symbol) {
            info!(symbol = %symbol, "symbol recovered; terminal alert cleared");
            self.emit_event(symbol, "alert_cleared", json!({})).await;
        }
    }

    pub fn active_alerts(&self) -> Vec<String> {
        self.active_alerts.lock().iter().cloned().collect()
    }

    pub fn metrics_summary(&self) -> MetricsSummary {
        let total = self.total_samples.load(Ordering::Relaxed);
        let failed = self.failed_samples.load(Ordering::Relaxed);
        let stats = self.latency.lock();

        MetricsSummary {
            total_samples: total,
            failed_samples: failed,
            error_rate: if total == 0 {
                0.0
            } else {
                failed as f64 / total as f64
            },
            avg_latency_ms: if stats.count == 0 {
                0.0
            } else {
                stats.sum_ms as f64 / stats.count as f64
            },
            min_latency_ms: stats.min_ms,
            max_latency_ms: stats.max_ms,
        }
    }

    async fn emit_event(&self, endpoint: &str, event_type: &str, details: serde_json::Value) {
        if let Err(e) = self
            .repo
            .store_monitoring_event(endpoint, event_type, details)
            .await
        {
            warn!(error = %e, event_type, "failed to store monitoring event");
        }
    }
}

const PROBE_ENDPOINT: &str = "/v5/market/kline";

/// Independent sampling loop: measures a probe fetch against the data
/// source each interval, records the sample and an api_metrics row.
/// Stops when `shutdown_rx` flips to true.
pub async fn run_sampling_loop(
    monitor: Arc<ApiMonitor>,
    source: Arc<dyn MarketDataSource>,
    probe_symbol: String,
    sample_every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(sample_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        probe = %probe_symbol,
        every_ms = sample_every.as_millis() as u64,
        "health sampling loop started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }
        }

        let start = Instant::now();
        let result = source.fetch_series(&probe_symbol, "1m", 1).await;
        let latency_ms = start.elapsed().as_millis() as u64;
        let success = result.is_ok();

        if let Err(e) = result {
            debug!(error = %e, "health probe failed");
        }

        monitor.record_sample(latency_ms, success).await;

        if let Err(e) = monitor
            .repo
            .store_api_metric(PROBE_ENDPOINT, "latency", latency_ms as f64)
            .await
        {
            warn!(error = %e, "failed to store latency metric");
        }
        if let Err(e) = monitor
            .repo
            .store_api_metric(PROBE_ENDPOINT, "availability", if success { 1.0 } else { 0.0 })
            .await
        {
            warn!(error = %e, "failed to store availability metric");
        }
    }

    info!("health sampling loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tracing_test::traced_test;

    use crate::collector::types::{MarketSnapshot, Trade};
    use crate::indicators::IndicatorSnapshot;
    use crate::storage::repository::{SnapshotKind, StorageError};

    struct NullRepo;

    #[async_trait]
    impl MarketRepository for NullRepo {
        async fn store_market_snapshot(&self, _: &MarketSnapshot) -> Result<(), StorageError> {
            Ok(())
        }
        async fn store_indicator_snapshot(
            &self,
            _: &IndicatorSnapshot,
        ) -> Result<(), StorageError> {
            Ok(())
        }
        async fn store_trades(&self, _: &str, _: u64, _: &[Trade]) -> Result<(), StorageError> {
            Ok(())
        }
        async fn store_api_metric(&self, _: &str, _: &str, _: f64) -> Result<(), StorageError> {
            Ok(())
        }
        async fn store_monitoring_event(
            &self,
            _: &str,
            _: &str,
            _: serde_json::Value,
        ) -> Result<(), StorageError> {
            Ok(())
        }
        async fn get_latest(
            &self,
            _: &str,
            _: SnapshotKind,
            _: u32,
        ) -> Result<Vec<serde_json::Value>, StorageError> {
            Ok(Vec::new())
        }
        async fn cleanup_older_than(&self, _: Duration) -> Result<u64, StorageError> {
            Ok(0)
        }
        async fn close(&self) {}
    }

    /// Repo that records monitoring event types and ignores the rest.
    #[derive(Default)]
    struct RecordingRepo {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MarketRepository for RecordingRepo {
        async fn store_market_snapshot(&self, _: &MarketSnapshot) -> Result<(), StorageError> {
            Ok(())
        }
        async fn store_indicator_snapshot(
            &self,
            _: &IndicatorSnapshot,
        ) -> Result<(), StorageError> {
            Ok(())
        }
        async fn store_trades(&self, _: &str, _: u64, _: &[Trade]) -> Result<(), StorageError> {
            Ok(())
        }
        async fn store_api_metric(&self, _: &str, _: &str, _: f64) -> Result<(), StorageError> {
            Ok(())
        }
        async fn store_monitoring_event(
            &self,
            _: &str,
            event_type: &str,
            _: serde_json::Value,
        ) -> Result<(), StorageError> {
            self.events.lock().push(event_type.to_string());
            Ok(())
        }
        async fn get_latest(
            &self,
            _: &str,
            _: SnapshotKind,
            _: u32,
        ) -> Result<Vec<serde_json::Value>, StorageError> {
            Ok(Vec::new())
        }
        async fn cleanup_older_than(&self, _: Duration) -> Result<u64, StorageError> {
            Ok(0)
        }
        async fn close(&self) {}
    }

    fn monitor() -> Arc<ApiMonitor> {
        ApiMonitor::new(AlertThresholds::default(), Arc::new(NullRepo))
    }

    #[tokio::test]
    async fn initial_verdict_is_healthy() {
        let m = monitor();
        let v = m.current_verdict();
        assert!(v.healthy);
        assert_eq!(v.ts_ms, 0);
    }

    #[tokio::test]
    async fn failed_sample_flips_unhealthy_and_success_recovers() {
        let m = monitor();

        m.record_sample(50, false).await;
        assert!(!m.current_verdict().healthy);

        m.record_sample(50, true).await;
        assert!(m.current_verdict().healthy);
    }

    #[traced_test]
    #[tokio::test]
    async fn latency_over_threshold_is_unhealthy_and_warns() {
        let m = monitor();
        m.record_sample(5_000, true).await;
        assert!(!m.current_verdict().healthy);
        assert_eq!(m.current_verdict().latency_ms, 5_000);
        assert!(logs_contain("high latency detected"));
    }

    #[tokio::test]
    async fn consecutive_failure_event_fires_once_per_streak() {
        let repo = Arc::new(RecordingRepo::default());
        let m = ApiMonitor::new(AlertThresholds::default(), repo.clone());

        // Sustained outage: the event marks the transition, not every sample.
        for _ in 0..6 {
            m.record_sample(0, false).await;
        }
        let count = |events: &[String]| {
            events.iter().filter(|e| *e == "consecutive_failures").count()
        };
        assert_eq!(count(&repo.events.lock()), 1);

        // Recovery resets the streak; a fresh outage emits again.
        m.record_sample(50, true).await;
        for _ in 0..4 {
            m.record_sample(0, false).await;
        }
        assert_eq!(count(&repo.events.lock()), 2);
    }

    #[tokio::test]
    async fn metrics_summary_tracks_samples() {
        let m = monitor();
        m.record_sample(100, true).await;
        m.record_sample(300, true).await;
        m.record_sample(0, false).await;

        let s = m.metrics_summary();
        assert_eq!(s.total_samples, 3);
        assert_eq!(s.failed_samples, 1);
        assert!((s.avg_latency_ms - 200.0).abs() < 1e-9);
        assert_eq!(s.min_latency_ms, 100);
        assert_eq!(s.max_latency_ms, 300);
        assert!((s.error_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn symbol_alerts_raise_and_clear() {
        let m = monitor();
        m.raise_symbol_alert("BTCUSDT", 3).await;
        assert_eq!(m.active_alerts(), vec!["BTCUSDT".to_string()]);

        m.clear_symbol_alert("BTCUSDT").await;
        assert!(m.active_alerts().is_empty());

        // Clearing an alert that was never raised is a no-op.
        m.clear_symbol_alert("ETHUSDT").await;
        assert!(m.active_alerts().is_empty());
    }
}
