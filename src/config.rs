use crate::error::AppError;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string.
    pub database_url: String,

    // =========================
    // Updater configuration
    // =========================
    /// Trading-pair symbols to keep refreshed. Fixed at startup.
    pub symbols: Vec<String>,

    /// Minimum seconds between two successful refreshes of the same symbol.
    ///
    /// This is the dedup window: no symbol is refreshed more than once
    /// per interval regardless of tick rate or external triggers.
    pub update_interval_secs: u64,

    /// Consecutive failures for a symbol before a terminal alert is raised.
    ///
    /// The symbol is NOT removed from scheduling afterwards; it stays
    /// eligible so a recovered API is retried automatically.
    pub max_retries: u32,

    /// Upper bound on how long `stop()` waits for in-flight cycles.
    pub shutdown_timeout_secs: u64,

    // =========================
    // Exchange configuration
    // =========================
    /// Route the collector to the Bybit sandbox instead of mainnet.
    pub use_testnet: bool,

    /// Explicit HTTP endpoint override. Empty selects mainnet/testnet
    /// based on `use_testnet`.
    pub http_endpoint: Option<String>,

    // =========================
    // Monitoring configuration
    // =========================
    /// Seconds between health-monitor latency samples.
    pub health_check_interval_secs: u64,

    /// Alert thresholds for the health monitor.
    pub alert_thresholds: AlertThresholds,
}

/// Thresholds above which the monitor flags the upstream API unhealthy.
#[derive(Clone, Copy, Debug)]
pub struct AlertThresholds {
    /// Maximum acceptable per-call latency in milliseconds.
    pub latency_ms: u64,
    /// Maximum acceptable failure ratio across recorded samples.
    pub error_rate: f64,
    /// Consecutive sample failures before the verdict flips unhealthy.
    pub consecutive_failures: u32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        // Bybit can be slower than other exchanges; 2s is the alert bar.
        Self {
            latency_ms: 2_000,
            error_rate: 0.1,
            consecutive_failures: 3,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://tickerd_dev.db".to_string());

        let symbols = std::env::var("SYMBOLS")
            .unwrap_or_else(|_| "BTCUSDT,ETHUSDT".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            database_url,
            symbols,
            update_interval_secs: env_u64("UPDATE_INTERVAL_SECS", 10),
            max_retries: env_u64("MAX_RETRIES", 3) as u32,
            shutdown_timeout_secs: env_u64("SHUTDOWN_TIMEOUT_SECS", 5),
            use_testnet: std::env::var("USE_TESTNET")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            http_endpoint: std::env::var("BYBIT_HTTP_ENDPOINT").ok(),
            health_check_interval_secs: env_u64("HEALTH_CHECK_INTERVAL_SECS", 60),
            alert_thresholds: AlertThresholds {
                latency_ms: env_u64("ALERT_LATENCY_MS", 2_000),
                error_rate: std::env::var("ALERT_ERROR_RATE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0.1),
                consecutive_failures: env_u64("ALERT_CONSECUTIVE_FAILURES", 3) as u32,
            },
        }
    }

    /// Startup validation. A failure here is fatal to the whole process;
    /// everything past this point treats configuration as trusted.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.symbols.is_empty() {
            return Err(AppError::Config("symbol set must not be empty".into()));
        }
        if self.update_interval_secs == 0 {
            return Err(AppError::Config("update interval must be positive".into()));
        }
        if self.max_retries == 0 {
            return Err(AppError::Config("max retries must be at least 1".into()));
        }
        if self.shutdown_timeout_secs == 0 {
            return Err(AppError::Config("shutdown timeout must be positive".into()));
        }
        if self.health_check_interval_secs == 0 {
            return Err(AppError::Config(
                "health check interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite://:memory:".into(),
            symbols: vec!["BTCUSDT".into(), "ETHUSDT".into()],
            update_interval_secs: 10,
            max_retries: 3,
            shutdown_timeout_secs: 5,
            use_testnet: false,
            http_endpoint: None,
            health_check_interval_secs: 60,
            alert_thresholds: AlertThresholds::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn empty_symbols_rejected() {
        let mut cfg = base_config();
        cfg.symbols.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_interval_rejected() {
        let mut cfg = base_config();
        cfg.update_interval_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_retries_rejected() {
        let mut cfg = base_config();
        cfg.max_retries = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_shutdown_timeout_rejected() {
        let mut cfg = base_config();
        cfg.shutdown_timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }
}
