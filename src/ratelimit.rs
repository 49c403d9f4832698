//! Per-IP token-bucket rate limiting with opportunistic garbage collection.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Bucket {
    tokens: f64,
    last: Instant,
}

struct LimiterInner {
    last_gc: Option<Instant>,
    by_ip: HashMap<String, Bucket>,
}

pub struct IpLimiter {
    rate: f64,
    burst: f64,
    ttl: Duration,
    gc_every: Duration,
    inner: Mutex<LimiterInner>,
}

impl IpLimiter {
    pub fn new(rate: f64, burst: u32, ttl: Duration) -> Self {
        let rate = if rate <= 0.0 { 10.0 } else { rate };
        let burst = burst.max(1);
        let gc_every = if ttl.is_zero() {
            Duration::ZERO
        } else {
            (ttl / 2).max(Duration::from_secs(1))
        };
        Self {
            rate,
            burst: f64::from(burst),
            ttl,
            gc_every,
            inner: Mutex::new(LimiterInner {
                last_gc: None,
                by_ip: HashMap::new(),
            }),
        }
    }

    /// Takes one token from the bucket of `ip`, creating it at full burst on
    /// first sight. Idle buckets are dropped in passing, at most once per
    /// `gc_every`.
    pub fn allow(&self, ip: &str) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let allowed = match inner.by_ip.entry(ip.to_string()) {
            Entry::Vacant(e) => {
                e.insert(Bucket {
                    tokens: self.burst - 1.0,
                    last: now,
                });
                true
            }
            Entry::Occupied(mut e) => {
                let b = e.get_mut();
                let elapsed = now.duration_since(b.last).as_secs_f64();
                b.tokens = (b.tokens + elapsed * self.rate).min(self.burst);
                b.last = now;
                if b.tokens < 1.0 {
                    false
                } else {
                    b.tokens -= 1.0;
                    true
                }
            }
        };

        self.maybe_gc(&mut inner, now);
        allowed
    }

    fn maybe_gc(&self, inner: &mut LimiterInner, now: Instant) {
        if self.ttl.is_zero() || self.gc_every.is_zero() {
            return;
        }
        let due = match inner.last_gc {
            None => true,
            Some(last) => now.duration_since(last) >= self.gc_every,
        };
        if !due {
            return;
        }
        inner.last_gc = Some(now);
        let ttl = self.ttl;
        inner
            .by_ip
            .retain(|_, b| now.duration_since(b.last) <= ttl);
    }

    #[cfg(test)]
    fn tracked_ips(&self) -> usize {
        self.inner.lock().by_ip.len()
    }

    #[cfg(test)]
    fn force_gc_due(&self) {
        self.inner.lock().last_gc = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sight_consumes_one_of_burst() {
        let limiter = IpLimiter::new(1.0, 3, Duration::from_secs(300));
        assert!(limiter.allow("1.2.3.4"));
        assert!(limiter.allow("1.2.3.4"));
        assert!(limiter.allow("1.2.3.4"));
        // Burst exhausted; refill at 1 rps is far below one token here.
        assert!(!limiter.allow("1.2.3.4"));
    }

    #[test]
    fn ips_are_independent() {
        let limiter = IpLimiter::new(1.0, 1, Duration::from_secs(300));
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.2"));
    }

    #[test]
    fn tokens_refill_over_time() {
        let limiter = IpLimiter::new(200.0, 1, Duration::from_secs(300));
        assert!(limiter.allow("1.1.1.1"));
        assert!(!limiter.allow("1.1.1.1"));
        // At 200 rps a token is back after 5ms.
        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.allow("1.1.1.1"));
    }

    #[test]
    fn burst_caps_accumulation() {
        let limiter = IpLimiter::new(1000.0, 2, Duration::from_secs(300));
        assert!(limiter.allow("2.2.2.2"));
        std::thread::sleep(Duration::from_millis(50));
        // Refill is capped at burst: two tokens, not fifty.
        assert!(limiter.allow("2.2.2.2"));
        assert!(limiter.allow("2.2.2.2"));
        assert!(!limiter.allow("2.2.2.2"));
    }

    #[test]
    fn idle_buckets_are_collected() {
        let limiter = IpLimiter::new(10.0, 5, Duration::from_millis(30));
        assert!(limiter.allow("3.3.3.3"));
        assert_eq!(limiter.tracked_ips(), 1);
        std::thread::sleep(Duration::from_millis(80));
        // The sweep throttle has a one-second floor; mark it due so the
        // next call performs the sweep.
        limiter.force_gc_due();
        assert!(limiter.allow("4.4.4.4"));
        assert_eq!(limiter.tracked_ips(), 1);
    }

    #[test]
    fn zero_rate_falls_back_to_default() {
        let limiter = IpLimiter::new(0.0, 0, Duration::from_secs(300));
        assert!(limiter.allow("5.5.5.5"));
        assert!(!limiter.allow("5.5.5.5"));
    }
}
