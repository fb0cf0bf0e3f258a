use crate::config::RateLimitConfig;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window counter per key (`key -> (count, reset time)`).
///
/// Expired windows are replaced lazily on access; `sweep` drops them in bulk.
#[derive(Debug)]
pub struct RateLimitCache {
    max_hits: u32,
    window: Duration,
    entries: Mutex<HashMap<String, Window>>,
}

impl RateLimitCache {
    pub fn new(max_hits: u32, window: Duration) -> Self {
        Self {
            max_hits,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_imports, Duration::from_secs(config.window_secs))
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    /// Count one hit for `key` at `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let window = entries
            .entry(key.to_string())
            .and_modify(|w| {
                if now >= w.reset_at {
                    *w = Window {
                        count: 0,
                        reset_at: now + self.window,
                    };
                }
            })
            .or_insert(Window {
                count: 0,
                reset_at: now + self.window,
            });

        if window.count >= self.max_hits {
            return RateLimitDecision::Limited {
                retry_after: window.reset_at.saturating_duration_since(now),
            };
        }
        window.count += 1;
        RateLimitDecision::Allowed {
            remaining: self.max_hits - window.count,
        }
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Drop expired windows; returns how many were removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, w| now < w.reset_at);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_within_window_and_resets_after() {
        let cache = RateLimitCache::new(2, Duration::from_secs(60));
        let t0 = Instant::now();

        assert_eq!(cache.check_at("owner", t0), RateLimitDecision::Allowed { remaining: 1 });
        assert_eq!(cache.check_at("owner", t0), RateLimitDecision::Allowed { remaining: 0 });
        assert_eq!(
            cache.check_at("owner", t0 + Duration::from_secs(10)),
            RateLimitDecision::Limited {
                retry_after: Duration::from_secs(50)
            }
        );
        assert!(cache.check_at("other", t0).is_allowed());

        let later = t0 + Duration::from_secs(61);
        assert_eq!(cache.check_at("owner", later), RateLimitDecision::Allowed { remaining: 1 });
    }

    #[test]
    fn sweep_drops_expired_windows() {
        let cache = RateLimitCache::new(5, Duration::from_secs(1));
        let t0 = Instant::now();
        cache.check_at("a", t0);
        cache.check_at("b", t0 + Duration::from_millis(900));

        assert_eq!(cache.sweep_at(t0 + Duration::from_millis(1500)), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.sweep_at(t0 + Duration::from_secs(5)), 1);
        assert!(cache.is_empty());
    }
}
