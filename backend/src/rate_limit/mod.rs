//! Fixed-window rate limiting for sensitive endpoints.
//!
//! Each (client, path) key owns a window start and a request counter. The
//! check-and-update for a key runs under that key's shard lock, so two
//! concurrent requests can never both observe a free slot. Unrelated keys
//! living in other shards proceed independently.

pub mod middleware;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

pub use middleware::{client_key, is_rate_limited, rate_limit_middleware};

/// Upper bound of tracked keys before a cleanup pass is forced.
pub const MAX_TRACKED_KEYS: usize = 5000;

/// Configuration for rate limiting.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Window length in seconds.
    pub window_seconds: u64,
    /// Maximum admitted requests per window.
    pub max_requests: u32,
    /// Use the first `X-Forwarded-For` entry as the client address.
    /// Only safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_seconds: 60,
            max_requests: 60,
            trust_forwarded_for: false,
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected { retry_after_seconds: u64 },
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    window_start: i64,
    count: u32,
}

/// Per-key fixed-window counter table.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, RateWindow>,
    cleaning: AtomicBool,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
            cleaning: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Decides whether a request for `client_key` is admitted at `now`.
    pub fn admit(&self, client_key: &str, now: DateTime<Utc>) -> Admission {
        let now = now.timestamp();
        let window_len = self.config.window_seconds as i64;

        let (admission, reset) = match self.windows.entry(client_key.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(RateWindow {
                    window_start: now,
                    count: 1,
                });
                (Admission::Admitted, true)
            }
            Entry::Occupied(mut occupied) => {
                let window = occupied.get_mut();
                let elapsed = now - window.window_start;
                if elapsed >= window_len {
                    *window = RateWindow {
                        window_start: now,
                        count: 1,
                    };
                    (Admission::Admitted, true)
                } else if window.count < self.config.max_requests {
                    window.count += 1;
                    (Admission::Admitted, false)
                } else {
                    let retry_after = (window_len - elapsed).clamp(1, window_len) as u64;
                    (
                        Admission::Rejected {
                            retry_after_seconds: retry_after,
                        },
                        false,
                    )
                }
            }
        };
        // shard guard is released here; cleanup may lock any shard

        if admission == Admission::Admitted
            && (reset || self.windows.len() > MAX_TRACKED_KEYS)
        {
            self.cleanup(now);
        }

        admission
    }

    /// Drops windows that ended before `now - window_seconds`.
    ///
    /// Skipped when another cleanup is already running.
    fn cleanup(&self, now: i64) {
        if self
            .cleaning
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let stale_before = now - self.config.window_seconds as i64;
        let before = self.windows.len();
        self.windows
            .retain(|_, window| window.window_start >= stale_before);
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(removed, "Evicted stale rate limit windows");
        }

        self.cleaning.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;
    use std::thread;

    fn limiter(window_seconds: u64, max_requests: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            window_seconds,
            max_requests,
            trust_forwarded_for: false,
        })
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn test_admits_up_to_limit_then_rejects() {
        let limiter = limiter(60, 5);
        for i in 0..5 {
            assert_eq!(
                limiter.admit("10.0.0.1:/auth/login", at(i)),
                Admission::Admitted
            );
        }

        match limiter.admit("10.0.0.1:/auth/login", at(10)) {
            Admission::Rejected {
                retry_after_seconds,
            } => {
                assert!((1..=60).contains(&retry_after_seconds));
                assert_eq!(retry_after_seconds, 50);
            }
            Admission::Admitted => panic!("Should be rejected"),
        }
    }

    #[test]
    fn test_retry_after_never_below_one() {
        let limiter = limiter(60, 1);
        assert_eq!(limiter.admit("k", at(0)), Admission::Admitted);
        assert_eq!(
            limiter.admit("k", at(59)),
            Admission::Rejected {
                retry_after_seconds: 1
            }
        );
    }

    #[test]
    fn test_retry_after_bounded_when_clock_moves_back() {
        let limiter = limiter(60, 1);
        assert_eq!(limiter.admit("k", at(100)), Admission::Admitted);
        assert_eq!(
            limiter.admit("k", at(0)),
            Admission::Rejected {
                retry_after_seconds: 60
            }
        );
    }

    #[test]
    fn test_window_resets_at_boundary_inclusive() {
        let limiter = limiter(60, 2);
        assert_eq!(limiter.admit("k", at(0)), Admission::Admitted);
        assert_eq!(limiter.admit("k", at(1)), Admission::Admitted);
        assert!(matches!(
            limiter.admit("k", at(59)),
            Admission::Rejected { .. }
        ));

        assert_eq!(limiter.admit("k", at(60)), Admission::Admitted);
        assert_eq!(limiter.admit("k", at(61)), Admission::Admitted);
        assert!(matches!(
            limiter.admit("k", at(62)),
            Admission::Rejected { .. }
        ));
    }

    #[test]
    fn test_rejected_requests_do_not_extend_window() {
        let limiter = limiter(60, 1);
        assert_eq!(limiter.admit("k", at(0)), Admission::Admitted);
        for i in 1..60 {
            assert!(matches!(
                limiter.admit("k", at(i)),
                Admission::Rejected { .. }
            ));
        }
        assert_eq!(limiter.admit("k", at(60)), Admission::Admitted);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter(60, 1);
        assert_eq!(limiter.admit("10.0.0.1:/predict", at(0)), Admission::Admitted);
        assert_eq!(
            limiter.admit("10.0.0.1:/auth/login", at(0)),
            Admission::Admitted
        );
        assert_eq!(limiter.admit("10.0.0.2:/predict", at(0)), Admission::Admitted);
        assert!(matches!(
            limiter.admit("10.0.0.1:/predict", at(1)),
            Admission::Rejected { .. }
        ));
    }

    #[test]
    fn test_concurrent_admits_respect_limit() {
        let limiter = Arc::new(limiter(60, 7));
        let admitted = Arc::new(AtomicU32::new(0));
        let now = Utc::now();

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let admitted = Arc::clone(&admitted);
                thread::spawn(move || {
                    if limiter.admit("203.0.113.9:/predict", now) == Admission::Admitted {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_stale_windows_evicted_on_reset() {
        let limiter = limiter(60, 5);
        limiter.admit("old-a", at(0));
        limiter.admit("old-b", at(0));
        assert_eq!(limiter.tracked_keys(), 2);

        // new key opens a window, which triggers cleanup of windows older than 60s
        limiter.admit("fresh", at(0) + Duration::seconds(61));
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_table_cap_forces_cleanup() {
        let limiter = limiter(60, 5);
        for i in 0..MAX_TRACKED_KEYS {
            limiter.admit(&format!("client-{}", i), at(0));
        }
        assert_eq!(limiter.tracked_keys(), MAX_TRACKED_KEYS);

        limiter.admit("late", at(120));
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
