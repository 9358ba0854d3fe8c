use std::time::Duration;

use tokio::time::Instant;

/// Per-symbol scheduling state.
///
/// Created lazily on the first tick that sees the symbol; mutated only
/// under the coordinator's state lock; lives for the process lifetime.
#[derive(Debug, Default)]
pub struct UpdateState {
    /// Completion instant of the last successful cycle. Absent until
    /// the first success, and deliberately NOT advanced on failure so
    /// a failing symbol retries on the very next tick.
    pub last_update: Option<Instant>,

    /// Consecutive failed cycles since the last success.
    pub error_count: u32,

    /// True after the terminal alert fired; suppresses repeats until
    /// the next success.
    pub alerted: bool,

    /// True while a fetch-compute-store cycle is running.
    pub in_flight: bool,
}

impl UpdateState {
    /// Due iff never updated or the interval has fully elapsed.
    pub fn due(&self, now: Instant, interval: Duration) -> bool {
        match self.last_update {
            None => true,
            Some(t) => now.duration_since(t) >= interval,
        }
    }

    /// Success clears the failure streak and restarts the dedup window.
    /// Returns whether a terminal alert was pending.
    pub fn record_success(&mut self, now: Instant) -> bool {
        self.last_update = Some(now);
        self.error_count = 0;
        std::mem::take(&mut self.alerted)
    }

    /// Failure bumps the streak. Returns (count, newly_exhausted) where
    /// newly_exhausted is true exactly once per streak reaching
    /// `max_retries`.
    pub fn record_failure(&mut self, max_retries: u32) -> (u32, bool) {
        self.error_count += 1;
        if self.error_count >= max_retries && !self.alerted {
            self.alerted = true;
            (self.error_count, true)
        } else {
            (self.error_count, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_due() {
        let st = UpdateState::default();
        assert!(st.due(Instant::now(), Duration::from_secs(60)));
    }

    #[test]
    fn not_due_inside_window() {
        let now = Instant::now();
        let st = UpdateState {
            last_update: Some(now),
            ..Default::default()
        };
        assert!(!st.due(now + Duration::from_secs(59), Duration::from_secs(60)));
        assert!(st.due(now + Duration::from_secs(60), Duration::from_secs(60)));
    }

    #[test]
    fn failure_streak_alerts_exactly_once() {
        let mut st = UpdateState::default();

        assert_eq!(st.record_failure(3), (1, false));
        assert_eq!(st.record_failure(3), (2, false));
        assert_eq!(st.record_failure(3), (3, true));
        // Streak continues but the alert does not repeat.
        assert_eq!(st.record_failure(3), (4, false));
    }

    #[test]
    fn success_resets_streak_and_reports_pending_alert() {
        let mut st = UpdateState::default();
        st.record_failure(1);
        assert!(st.alerted);

        let had_alert = st.record_success(Instant::now());
        assert!(had_alert);
        assert_eq!(st.error_count, 0);
        assert!(!st.alerted);
        assert!(st.last_update.is_some());

        // A success without a pending alert reports none.
        assert!(!st.record_success(Instant::now()));
    }
}
