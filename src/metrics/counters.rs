use std::sync::Arc;
use std::sync::atomic::AtomicU64;

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    pub cycles_ok: Arc<AtomicU64>,
    pub cycles_failed: Arc<AtomicU64>,

    // skip reasons
    pub skip_in_flight: Arc<AtomicU64>,
    pub skip_not_due: Arc<AtomicU64>,
    pub skip_unhealthy: Arc<AtomicU64>,

    pub alerts_raised: Arc<AtomicU64>,
    pub immediate_triggers: Arc<AtomicU64>,
}
