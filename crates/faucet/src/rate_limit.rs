//! Per-key fixed-window rate limiting
//!
//! Each key gets a window anchored at its first request. Inside the window at
//! most `max_requests` calls are allowed; once the window has elapsed the next
//! call starts a fresh one. Windows live in a bounded `moka` cache whose
//! entries expire one window after they were last written.

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

/// Window state for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Start of the current window, unix milliseconds
    pub window_start: i64,
    /// Requests recorded in the current window
    pub count: u32,
}

/// Atomic check-and-record over per-key windows.
///
/// `FixedWindowLimiter` keeps the windows in process memory, which is only
/// correct for a single instance. Deployments with several instances need an
/// implementation backed by a shared store.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Whether a request from `key` at `now_ms` would be allowed. Records nothing.
    async fn is_allowed(&self, key: &str, now_ms: i64) -> bool;

    /// Allow and record a request from `key` at `now_ms`, or deny it
    async fn check_and_record(&self, key: &str, now_ms: i64) -> bool;

    /// Seconds until `key` may request again
    async fn retry_after(&self, key: &str, now_ms: i64) -> u64;
}

/// Fixed-window limiter keyed by requester identity.
///
/// At most `max_keys` windows are tracked. Past that the cache's admission
/// policy decides which windows are kept, and a dropped key gets a fresh
/// window on its next request; size the capacity above the number of distinct
/// keys expected per window.
pub struct FixedWindowLimiter {
    entries: Cache<String, RateLimitEntry>,
    window_ms: i64,
    max_requests: u32,
}

impl FixedWindowLimiter {
    pub fn new(window: Duration, max_requests: u32, max_keys: usize) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_keys.max(1) as u64)
            .time_to_live(window)
            .build();

        Self {
            entries,
            window_ms: window.as_millis().min(i64::MAX as u128) as i64,
            max_requests,
        }
    }

    /// Entry to store if a request at `now_ms` is allowed, `None` if denied
    fn admit(&self, current: Option<&RateLimitEntry>, now_ms: i64) -> Option<RateLimitEntry> {
        match current {
            Some(entry) if now_ms.saturating_sub(entry.window_start) < self.window_ms => {
                (entry.count < self.max_requests).then(|| RateLimitEntry {
                    window_start: entry.window_start,
                    count: entry.count + 1,
                })
            }
            // No entry, or its window has elapsed
            _ => Some(RateLimitEntry {
                window_start: now_ms,
                count: 1,
            }),
        }
    }

    pub async fn is_allowed(&self, key: &str, now_ms: i64) -> bool {
        let current = self.entries.get(key).await;
        self.admit(current.as_ref(), now_ms).is_some()
    }

    /// Decide whether a request from `key` at `now_ms` is allowed, recording it
    /// if so. A denied request leaves the entry untouched.
    pub async fn check_and_record(&self, key: &str, now_ms: i64) -> bool {
        let result = self
            .entries
            .entry_by_ref(key)
            .and_compute_with(|current| {
                let op = match self.admit(current.as_ref().map(|e| e.value()), now_ms) {
                    Some(next) => Op::Put(next),
                    None => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;

        match result {
            CompResult::Inserted(_) | CompResult::ReplacedWith(_) => true,
            _ => {
                debug!("Rate limit exceeded for {}", key);
                false
            }
        }
    }

    /// Seconds until `key` may request again; 0 when it already may
    pub async fn retry_after(&self, key: &str, now_ms: i64) -> u64 {
        match self.entries.get(key).await {
            Some(entry) if entry.count >= self.max_requests => {
                let remaining_ms = entry.window_start + self.window_ms - now_ms;
                if remaining_ms <= 0 {
                    0
                } else {
                    (remaining_ms as u64).div_ceil(1000)
                }
            }
            _ => 0,
        }
    }

    /// Current entry for `key`, if any
    pub async fn entry(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.get(key).await
    }

    /// Number of tracked keys, after pending evictions have run
    pub async fn len(&self) -> usize {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count() as usize
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RateLimitStore for FixedWindowLimiter {
    async fn is_allowed(&self, key: &str, now_ms: i64) -> bool {
        FixedWindowLimiter::is_allowed(self, key, now_ms).await
    }

    async fn check_and_record(&self, key: &str, now_ms: i64) -> bool {
        FixedWindowLimiter::check_and_record(self, key, now_ms).await
    }

    async fn retry_after(&self, key: &str, now_ms: i64) -> u64 {
        FixedWindowLimiter::retry_after(self, key, now_ms).await
    }
}

/// Process-wide burst guard in front of the per-key limiter
pub struct GlobalLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl GlobalLimiter {
    /// `None` when `per_minute` is 0
    pub fn per_minute(per_minute: u32) -> Option<Self> {
        let quota = Quota::per_minute(NonZeroU32::new(per_minute)?);
        Some(Self {
            limiter: RateLimiter::direct(quota),
        })
    }

    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);
    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    #[tokio::test]
    async fn test_first_request_allowed_second_denied() {
        let limiter = FixedWindowLimiter::new(DAY, 1, 100);
        let key = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

        assert!(limiter.check_and_record(key, 1_000).await);
        assert!(!limiter.check_and_record(key, 2_000).await);

        // Denial does not mutate the entry
        let entry = limiter.entry(key).await.unwrap();
        assert_eq!(entry, RateLimitEntry { window_start: 1_000, count: 1 });
    }

    #[tokio::test]
    async fn test_window_expiry_resets() {
        let limiter = FixedWindowLimiter::new(DAY, 1, 100);
        let key = "k";

        assert!(limiter.check_and_record(key, 0).await);
        assert!(!limiter.check_and_record(key, DAY_MS - 1).await);
        assert!(limiter.check_and_record(key, DAY_MS).await);

        let entry = limiter.entry(key).await.unwrap();
        assert_eq!(entry, RateLimitEntry { window_start: DAY_MS, count: 1 });
        assert!(!limiter.check_and_record(key, DAY_MS + 10).await);
    }

    #[tokio::test]
    async fn test_quota_counts_up_to_max() {
        let limiter = FixedWindowLimiter::new(Duration::from_secs(60), 3, 100);

        for i in 0..3 {
            assert!(limiter.check_and_record("k", i).await);
        }
        assert!(!limiter.check_and_record("k", 10).await);
        assert_eq!(limiter.entry("k").await.unwrap().count, 3);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = FixedWindowLimiter::new(DAY, 1, 100);
        assert!(limiter.check_and_record("a", 0).await);
        assert!(limiter.check_and_record("b", 0).await);
        assert!(!limiter.check_and_record("a", 1).await);
        assert_eq!(limiter.len().await, 2);
    }

    #[tokio::test]
    async fn test_retry_after() {
        let limiter = FixedWindowLimiter::new(Duration::from_secs(60), 1, 100);
        assert_eq!(limiter.retry_after("k", 0).await, 0);
        limiter.check_and_record("k", 0).await;
        assert_eq!(limiter.retry_after("k", 500).await, 60);
        assert_eq!(limiter.retry_after("k", 59_500).await, 1);
        assert_eq!(limiter.retry_after("k", 60_000).await, 0);
    }

    #[tokio::test]
    async fn test_is_allowed_records_nothing() {
        let limiter = FixedWindowLimiter::new(DAY, 1, 100);

        assert!(limiter.is_allowed("k", 0).await);
        assert!(limiter.entry("k").await.is_none());

        limiter.check_and_record("k", 0).await;
        assert!(!limiter.is_allowed("k", 1).await);
        assert!(limiter.is_allowed("k", DAY_MS).await);
        assert_eq!(limiter.entry("k").await.unwrap().window_start, 0);
    }

    #[tokio::test]
    async fn test_tracked_keys_are_bounded() {
        let limiter = FixedWindowLimiter::new(DAY, 1, 50);

        for i in 0..500 {
            limiter.check_and_record(&format!("k{}", i), i).await;
        }
        assert!(limiter.len().await <= 50);
    }

    #[tokio::test]
    async fn test_entries_expire_after_window() {
        let limiter = FixedWindowLimiter::new(Duration::from_millis(100), 1, 100);

        limiter.check_and_record("k", 0).await;
        assert!(limiter.entry("k").await.is_some());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(limiter.entry("k").await.is_none());
        assert!(limiter.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_requests_single_winner() {
        let limiter = std::sync::Arc::new(FixedWindowLimiter::new(DAY, 1, 100));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.check_and_record("k", 0).await })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 1);
    }

    #[test]
    fn test_global_limiter() {
        assert!(GlobalLimiter::per_minute(0).is_none());

        let limiter = GlobalLimiter::per_minute(2).unwrap();
        assert!(limiter.check());
        assert!(limiter.check());
        assert!(!limiter.check());
    }
}
