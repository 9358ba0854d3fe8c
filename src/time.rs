use chrono::Utc;

/// Current wall-clock time as milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_past_2020_and_non_decreasing() {
        let a = now_ms();
        let b = now_ms();
        assert!(a > 1_577_836_800_000); // 2020-01-01
        assert!(b >= a);
    }
}
