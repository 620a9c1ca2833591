use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window counter per client address. Counters live in process
/// memory: they reset on restart and do not coordinate across instances.
pub struct FixedWindowLimiter {
    max_attempts: u32,
    window: Duration,
    buckets: Mutex<HashMap<IpAddr, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            window: Duration::from_secs(config.window_secs),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Count an attempt from `addr`. Returns false once the window budget
    /// is spent; a fresh window opens after `window` has elapsed.
    pub fn check(&self, addr: IpAddr) -> bool {
        let now = Instant::now();
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let window = buckets.entry(addr).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }
        if window.count >= self.max_attempts {
            return false;
        }
        window.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_attempts: u32, window_ms: u64) -> FixedWindowLimiter {
        FixedWindowLimiter {
            max_attempts,
            window: Duration::from_millis(window_ms),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([127, 0, 0, last])
    }

    #[test]
    fn blocks_after_max_attempts_in_window() {
        let limiter = limiter(3, 60_000);
        for _ in 0..3 {
            assert!(limiter.check(ip(1)));
        }
        assert!(!limiter.check(ip(1)), "fourth attempt rejected");
        assert!(!limiter.check(ip(1)), "stays rejected within window");
    }

    #[test]
    fn window_expiry_resets_budget() {
        let limiter = limiter(1, 30);
        assert!(limiter.check(ip(2)));
        assert!(!limiter.check(ip(2)));
        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.check(ip(2)));
    }

    #[test]
    fn addresses_are_independent() {
        let limiter = limiter(1, 60_000);
        assert!(limiter.check(ip(3)));
        assert!(!limiter.check(ip(3)));
        assert!(limiter.check(ip(4)));
    }
}
