//! Keyed log throttle: callers ask permission before emitting noisy
//! degradation warnings so each key logs at most once per interval.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub struct LogLimiter {
    interval: Duration,
    last: Mutex<HashMap<String, Instant>>,
}

impl LogLimiter {
    pub fn new(interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            Duration::from_secs(10)
        } else {
            interval
        };
        Self {
            interval,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true when the caller may log for `key` now; suppressed
    /// otherwise.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock();
        match last.get(key) {
            Some(at) if now.duration_since(*at) < self.interval => false,
            _ => {
                last.insert(key.to_string(), now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_within_interval() {
        let limiter = LogLimiter::new(Duration::from_secs(10));
        assert!(limiter.allow("recolor:acme"));
        assert!(!limiter.allow("recolor:acme"));
        // Distinct keys are throttled independently.
        assert!(limiter.allow("logo-load:acme"));
    }

    #[test]
    fn allows_again_after_interval() {
        let limiter = LogLimiter::new(Duration::from_millis(20));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.allow("k"));
    }
}
