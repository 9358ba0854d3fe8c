pub mod monitor;

pub use monitor::{ApiMonitor, HealthVerdict, MetricsSummary, run_sampling_loop};
