//! Update coordinator.
//!
//! Drives periodic, deduplicated, health-gated refresh of market data
//! and indicators for every configured symbol.
//!
//! Responsibilities:
//! - Per-symbol due-ness on a fixed 1s tick cadence.
//! - Single-flight per symbol: cycles are only started from the loop
//!   task, so a symbol is never fetched concurrently with itself.
//! - Bounded retry accounting with a terminal alert after
//!   `max_retries` consecutive failures; the symbol stays scheduled.
//! - Cooperative shutdown: stop scheduling, drain in-flight cycles,
//!   bounded by the shutdown timeout.
//!
//! Non-responsibilities:
//! - Indicator arithmetic (indicators module, pure).
//! - Health sampling (monitoring module; only the verdict is read).
//! - Storage details (repository trait).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, warn};

use crate::collector::source::MarketDataSource;
use crate::error::AppError;
use crate::indicators;
use crate::logger::warn_if_slow;
use crate::metrics::counters::Counters;
use crate::monitoring::ApiMonitor;
use crate::storage::repository::MarketRepository;
use crate::updater::CycleError;
use crate::updater::state::UpdateState;

/// Capacity of the out-of-band trigger channel.
const TRIGGER_QUEUE_CAPACITY: usize = 64;

#[derive(Clone, Debug)]
pub struct UpdaterConfig {
    /// Symbols to keep refreshed, in scheduling order. Fixed at start.
    pub symbols: Vec<String>,

    /// Dedup window: minimum spacing between successful refreshes of
    /// the same symbol.
    pub update_interval: Duration,

    /// Consecutive failures before the terminal per-symbol alert.
    pub max_retries: u32,

    /// Upper bound on the drain wait inside `stop()`.
    pub shutdown_timeout: Duration,

    /// Fixed scheduler cadence, independent of `update_interval`.
    pub tick_every: Duration,

    /// Kline series parameters for the indicator window.
    pub series_interval: String,
    pub series_limit: u32,
}

impl UpdaterConfig {
    pub fn new(
        symbols: Vec<String>,
        update_interval: Duration,
        max_retries: u32,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            symbols,
            update_interval,
            max_retries,
            shutdown_timeout,
            tick_every: Duration::from_secs(1),
            series_interval: "1m".to_string(),
            series_limit: 100,
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.symbols.is_empty() {
            return Err(AppError::Config("symbol set must not be empty".into()));
        }
        if self.update_interval.is_zero() || self.tick_every.is_zero() {
            return Err(AppError::Config("update interval must be positive".into()));
        }
        if self.max_retries == 0 {
            return Err(AppError::Config("max retries must be at least 1".into()));
        }
        if self.shutdown_timeout.is_zero() {
            return Err(AppError::Config("shutdown timeout must be positive".into()));
        }
        Ok(())
    }
}

/// Result of `stop()`: whether every in-flight cycle finished inside
/// the shutdown timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Clean,
    TimedOut,
}

pub struct UpdateCoordinator {
    inner: Arc<Inner>,
    trigger_tx: mpsc::Sender<String>,
    shutdown_tx: watch::Sender<bool>,
    loop_handle: Option<JoinHandle<()>>,
}

struct Inner {
    cfg: UpdaterConfig,
    source: Arc<dyn MarketDataSource>,
    repo: Arc<dyn MarketRepository>,
    monitor: Arc<ApiMonitor>,
    counters: Counters,

    /// Per-symbol scheduling state. Single-flight holds because only
    /// the loop task flips `in_flight` on, under this lock.
    states: Mutex<HashMap<String, UpdateState>>,
}

impl UpdateCoordinator {
    /// Validates configuration and spawns the scheduling loop.
    /// Returns immediately; cycles run in the background.
    pub fn start(
        cfg: UpdaterConfig,
        source: Arc<dyn MarketDataSource>,
        repo: Arc<dyn MarketRepository>,
        monitor: Arc<ApiMonitor>,
        counters: Counters,
    ) -> Result<Self, AppError> {
        cfg.validate()?;

        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(Inner {
            cfg,
            source,
            repo,
            monitor,
            counters,
            states: Mutex::new(HashMap::new()),
        });

        let loop_handle = tokio::spawn(run_loop(Arc::clone(&inner), trigger_rx, shutdown_rx));

        Ok(Self {
            inner,
            trigger_tx,
            shutdown_tx,
            loop_handle: Some(loop_handle),
        })
    }

    /// Out-of-band refresh request. Same health gate and single-flight
    /// rule as a tick that found the symbol due; silently ignored when
    /// a cycle for the symbol is already in flight or the symbol is not
    /// in the configured set.
    pub async fn request_immediate_update(&self, symbol: &str) {
        if self.trigger_tx.send(symbol.to_string()).await.is_err() {
            warn!(symbol = %symbol, "coordinator loop stopped; trigger dropped");
        }
    }

    /// Stops scheduling new cycles, then waits for in-flight cycles to
    /// drain, bounded by the configured shutdown timeout. On timeout
    /// the remaining cycles keep running detached; callers proceed to
    /// close shared resources regardless (best-effort shutdown).
    pub async fn stop(&mut self) -> ShutdownOutcome {
        let _ = self.shutdown_tx.send(true);

        let Some(handle) = self.loop_handle.take() else {
            return ShutdownOutcome::Clean;
        };

        match timeout(self.inner.cfg.shutdown_timeout, handle).await {
            Ok(Ok(())) => {
                info!("coordinator stopped cleanly");
                ShutdownOutcome::Clean
            }
            Ok(Err(e)) => {
                error!(error = ?e, "coordinator loop task failed during drain");
                ShutdownOutcome::Clean
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.inner.cfg.shutdown_timeout.as_millis() as u64,
                    "shutdown timeout elapsed with cycles still in flight"
                );
                ShutdownOutcome::TimedOut
            }
        }
    }

    /// Current consecutive-failure count for a symbol.
    pub fn error_count(&self, symbol: &str) -> u32 {
        self.inner
            .states
            .lock()
            .get(symbol)
            .map(|s| s.error_count)
            .unwrap_or(0)
    }

    /// Whether the symbol has completed at least one successful cycle.
    pub fn has_updated(&self, symbol: &str) -> bool {
        self.inner
            .states
            .lock()
            .get(symbol)
            .is_some_and(|s| s.last_update.is_some())
    }
}

async fn run_loop(
    inner: Arc<Inner>,
    mut trigger_rx: mpsc::Receiver<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(inner.cfg.tick_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // In-flight cycle handles; drained on shutdown.
    let mut cycles: JoinSet<()> = JoinSet::new();

    info!(
        symbols = inner.cfg.symbols.len(),
        interval_ms = inner.cfg.update_interval.as_millis() as u64,
        max_retries = inner.cfg.max_retries,
        "update coordinator started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for symbol in &inner.cfg.symbols {
                    inner.maybe_begin_cycle(symbol, false, &mut cycles);
                }
            }
            Some(symbol) = trigger_rx.recv() => {
                // The symbol set is fixed at startup; unknown symbols
                // must not grow the state map.
                if !inner.cfg.symbols.iter().any(|s| *s == symbol) {
                    warn!(symbol = %symbol, "immediate update for unconfigured symbol ignored");
                    continue;
                }
                inner
                    .counters
                    .immediate_triggers
                    .fetch_add(1, Ordering::Relaxed);
                inner.maybe_begin_cycle(&symbol, true, &mut cycles);
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            // Reap finished cycles so the set does not grow unbounded.
            Some(res) = cycles.join_next(), if !cycles.is_empty() => {
                if let Err(e) = res {
                    error!(error = ?e, "update cycle task panicked");
                }
            }
        }
    }

    info!(
        in_flight = cycles.len(),
        "coordinator stopping; draining in-flight cycles"
    );

    while let Some(res) = cycles.join_next().await {
        if let Err(e) = res {
            error!(error = ?e, "update cycle task panicked during drain");
        }
    }

    info!("coordinator drained");
}

impl Inner {
    /// Tick step for one symbol: enforce single-flight, due-ness and the
    /// health gate, then spawn the cycle. `skip_due_check` marks an
    /// out-of-band trigger, which bypasses due-ness only.
    fn maybe_begin_cycle(
        self: &Arc<Self>,
        symbol: &str,
        skip_due_check: bool,
        cycles: &mut JoinSet<()>,
    ) {
        let now = Instant::now();

        {
            let mut states = self.states.lock();
            let st = states.entry(symbol.to_string()).or_default();

            if st.in_flight {
                self.counters.skip_in_flight.fetch_add(1, Ordering::Relaxed);
                debug!(symbol = %symbol, "cycle already in flight; skipping");
                return;
            }

            if !skip_due_check && !st.due(now, self.cfg.update_interval) {
                self.counters.skip_not_due.fetch_add(1, Ordering::Relaxed);
                return;
            }

            // Back-pressure: a degraded upstream skips the symbol for
            // this tick without touching error counts or due-ness.
            let verdict = self.monitor.current_verdict();
            if !verdict.healthy {
                self.counters.skip_unhealthy.fetch_add(1, Ordering::Relaxed);
                debug!(
                    symbol = %symbol,
                    latency_ms = verdict.latency_ms,
                    "upstream unhealthy; deferring update"
                );
                return;
            }

            st.in_flight = true;
        }

        let inner = Arc::clone(self);
        let symbol = symbol.to_string();
        cycles.spawn(async move {
            inner.run_cycle(&symbol).await;
        });
    }

    async fn run_cycle(self: Arc<Self>, symbol: &str) {
        let result = self.execute_cycle(symbol).await;

        match result {
            Ok(()) => {
                self.counters.cycles_ok.fetch_add(1, Ordering::Relaxed);

                let had_alert = {
                    let mut states = self.states.lock();
                    let st = states.entry(symbol.to_string()).or_default();
                    st.in_flight = false;
                    st.record_success(Instant::now())
                };

                if had_alert {
                    self.monitor.clear_symbol_alert(symbol).await;
                }

                info!(symbol = %symbol, "update cycle complete");
            }
            Err(e) => {
                self.counters.cycles_failed.fetch_add(1, Ordering::Relaxed);

                let (count, newly_exhausted) = {
                    let mut states = self.states.lock();
                    let st = states.entry(symbol.to_string()).or_default();
                    st.in_flight = false;
                    st.record_failure(self.cfg.max_retries)
                };

                error!(
                    symbol = %symbol,
                    attempt = count,
                    error = %e,
                    "update cycle failed"
                );

                if newly_exhausted {
                    self.counters.alerts_raised.fetch_add(1, Ordering::Relaxed);
                    self.monitor.raise_symbol_alert(symbol, count).await;
                }
            }
        }
    }

    /// One fetch-compute-store sequence. Any error here counts as one
    /// failed cycle for the symbol.
    async fn execute_cycle(&self, symbol: &str) -> Result<(), CycleError> {
        let snapshot = self.source.fetch_snapshot(symbol).await?;
        let series = self
            .source
            .fetch_series(symbol, &self.cfg.series_interval, self.cfg.series_limit)
            .await?;

        let indicator_snapshot = indicators::compute(symbol, &series)?;

        warn_if_slow("store_market_snapshot", Duration::from_millis(200), async {
            self.repo.store_market_snapshot(&snapshot).await
        })
        .await?;

        self.repo
            .store_trades(symbol, snapshot.ts_ms, &snapshot.trades)
            .await?;

        warn_if_slow(
            "store_indicator_snapshot",
            Duration::from_millis(200),
            async { self.repo.store_indicator_snapshot(&indicator_snapshot).await },
        )
        .await?;

        Ok(())
    }
}
