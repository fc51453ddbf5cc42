use chrono::Duration;
use rand::Rng;

/// `next_available = now + base * 2^(retry_count - 1)`, jittered by up to
/// `jitter_seconds` and capped at `maximum_interval`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base: Duration,
    pub maximum_interval: Duration,
    pub jitter_seconds: i64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::seconds(1),
            maximum_interval: Duration::hours(1),
            jitter_seconds: 30,
        }
    }
}

impl RetryPolicy {
    /// `retry_count` is the attempt about to be made, 1-indexed - the first
    /// retry after an initial failure passes `retry_count = 1`.
    pub fn backoff(&self, retry_count: i32) -> Duration {
        let exponent = retry_count.saturating_sub(1).max(0) as u32;
        let scaled = self.base * 2i32.saturating_pow(exponent);
        let capped = std::cmp::min(scaled, self.maximum_interval);
        let jitter = if self.jitter_seconds > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_seconds)
        } else {
            0
        };
        capped + Duration::seconds(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy {
            jitter_seconds: 0,
            ..Default::default()
        };
        assert_eq!(policy.backoff(1), Duration::seconds(1));
        assert_eq!(policy.backoff(2), Duration::seconds(2));
        assert_eq!(policy.backoff(3), Duration::seconds(4));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            base: Duration::minutes(10),
            maximum_interval: Duration::minutes(30),
            jitter_seconds: 0,
        };
        assert_eq!(policy.backoff(10), Duration::minutes(30));
    }

    #[test]
    fn jitter_never_pushes_below_the_capped_value() {
        let policy = RetryPolicy {
            base: Duration::seconds(1),
            maximum_interval: Duration::hours(1),
            jitter_seconds: 30,
        };
        for attempt in 1..5 {
            let backoff = policy.backoff(attempt);
            assert!(backoff >= Duration::seconds(1));
        }
    }
}
