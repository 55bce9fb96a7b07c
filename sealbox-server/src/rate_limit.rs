//! Sliding-window admission control.
//!
//! Tracks request timestamps per key (e.g. `login:{ip}:{email}` or a user
//! id) and rejects once the window is full. State is in-process only; a
//! multi-node deployment fronts this with its own limiter.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// In-memory sliding-window rate limiter.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Records a hit for `key` and returns whether it is admitted.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());

        let entry = hits.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= self.window {
                entry.pop_front();
            } else {
                break;
            }
        }

        if entry.len() >= self.max_requests as usize {
            return false;
        }
        entry.push_back(now);
        true
    }

    /// Drops tracking state for `key` (e.g. after a successful login).
    pub fn reset(&self, key: &str) {
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        hits.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.check("k"));
        assert!(limiter.check("k"));
        assert!(limiter.check("k"));
        assert!(!limiter.check("k"));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("a"));
        assert!(!limiter.check("a"));
        assert!(limiter.check("b"));
    }

    #[test]
    fn reset_clears_the_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("k"));
        assert!(!limiter.check("k"));
        limiter.reset("k");
        assert!(limiter.check("k"));
    }

    #[test]
    fn window_expiry_readmits() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));
        assert!(limiter.check("k"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.check("k"));
    }
}
