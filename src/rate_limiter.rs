use std::collections::HashMap;

use crate::constants::{RATE_LIMIT_CAPACITY, RATE_LIMIT_WINDOW_MS};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimiterOptions {
    pub capacity: u32,
    pub window_ms: u64,
}

impl Default for RateLimiterOptions {
    fn default() -> Self {
        Self {
            capacity: RATE_LIMIT_CAPACITY,
            window_ms: RATE_LIMIT_WINDOW_MS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Window {
    tokens: u32,
    last_reset_ms: u64,
}

/// Fixed-window token budget per client.
///
/// The whole budget comes back at once when more than `window_ms` has passed
/// since the last reset, so a client may burst `2 * capacity` commands across
/// a window boundary.
pub struct RateLimiter {
    options: RateLimiterOptions,
    windows: HashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(options: RateLimiterOptions) -> Self {
        Self {
            options,
            windows: HashMap::new(),
        }
    }

    pub fn try_acquire(&mut self, client_id: &str, now_ms: u64) -> bool {
        let options = self.options;
        let window = self
            .windows
            .entry(client_id.to_string())
            .or_insert_with(|| Window {
                tokens: options.capacity,
                last_reset_ms: now_ms,
            });

        if now_ms.saturating_sub(window.last_reset_ms) > options.window_ms {
            window.tokens = options.capacity;
            window.last_reset_ms = now_ms;
        }

        if window.tokens == 0 {
            return false;
        }
        window.tokens -= 1;
        true
    }

    pub fn forget(&mut self, client_id: &str) {
        self.windows.remove(client_id);
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(capacity: u32, window_ms: u64) -> RateLimiter {
        RateLimiter::new(RateLimiterOptions {
            capacity,
            window_ms,
        })
    }

    #[test]
    fn allows_capacity_then_denies_within_window() {
        let mut limiter = RateLimiter::new(RateLimiterOptions::default());
        for at in 0..10u64 {
            assert!(limiter.try_acquire("c1", 1_000 + at));
        }
        assert!(!limiter.try_acquire("c1", 1_500));
        assert!(!limiter.try_acquire("c1", 2_000));
    }

    #[test]
    fn window_resets_only_after_it_has_fully_elapsed() {
        let mut limiter = limiter(2, 1_000);
        assert!(limiter.try_acquire("c1", 0));
        assert!(limiter.try_acquire("c1", 10));
        assert!(!limiter.try_acquire("c1", 1_000));
        assert!(limiter.try_acquire("c1", 1_001));
        assert!(limiter.try_acquire("c1", 1_002));
        assert!(!limiter.try_acquire("c1", 1_003));
    }

    #[test]
    fn burst_is_allowed_across_a_boundary() {
        let mut limiter = limiter(3, 1_000);
        let mut allowed = 0;
        for at in [0, 1, 2, 1_001, 1_002, 1_003] {
            if limiter.try_acquire("c1", at) {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 6);
    }

    #[test]
    fn clients_have_independent_budgets() {
        let mut limiter = limiter(1, 1_000);
        assert!(limiter.try_acquire("c1", 0));
        assert!(!limiter.try_acquire("c1", 1));
        assert!(limiter.try_acquire("c2", 1));
    }

    #[test]
    fn forget_drops_the_entry() {
        let mut limiter = limiter(1, 1_000);
        assert!(limiter.try_acquire("c1", 0));
        assert_eq!(limiter.tracked_clients(), 1);
        limiter.forget("c1");
        assert_eq!(limiter.tracked_clients(), 0);
        assert!(limiter.try_acquire("c1", 1));
    }
}
