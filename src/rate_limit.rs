//! Fixed-window submission counter keyed by client identity.
//!
//! Windows reset lazily: a bucket is only looked at again when the same
//! identity submits. [`RateLimiter::sweep`] drops buckets whose window has
//! passed so the map does not grow for the lifetime of the process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    window_start: Instant,
    count: u32,
}

/// Shared per-identity limiter. Clones share the same buckets.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<String, Bucket>>>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        RateLimiter {
            inner: Arc::new(Mutex::new(HashMap::new())),
            window,
            max_requests,
        }
    }

    /// Record one attempt by `identity` at `now`. Returns `true` when the
    /// attempt is over the limit.
    pub async fn check_and_record(&self, identity: &str, now: Instant) -> bool {
        let fresh = Bucket {
            window_start: now,
            count: 0,
        };
        let mut buckets = self.inner.lock().await;
        let bucket = buckets.entry(identity.to_string()).or_insert(fresh);
        if now.saturating_duration_since(bucket.window_start) > self.window {
            *bucket = fresh;
        }
        bucket.count = bucket.count.saturating_add(1);
        bucket.count > self.max_requests
    }

    /// Remove buckets whose window ended before `now`.
    pub async fn sweep(&self, now: Instant) -> usize {
        let mut buckets = self.inner.lock().await;
        let before = buckets.len();
        buckets.retain(|_, b| now.saturating_duration_since(b.window_start) <= self.window);
        let removed = before - buckets.len();
        if removed > 0 {
            debug!("Rate limiter sweep removed {} expired bucket(s)", removed);
        }
        removed
    }

    /// Number of identities currently tracked.
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Duration::from_millis(15_000), 5)
    }

    #[tokio::test]
    async fn test_sixth_request_in_window_is_limited() {
        let rl = limiter();
        let t0 = Instant::now();
        for i in 0..5 {
            let now = t0 + Duration::from_millis(i * 1000);
            assert!(!rl.check_and_record("1.2.3.4", now).await, "request {} limited", i + 1);
        }
        assert!(rl.check_and_record("1.2.3.4", t0 + Duration::from_secs(6)).await);
        // keeps rejecting while the window lasts
        assert!(rl.check_and_record("1.2.3.4", t0 + Duration::from_secs(14)).await);
    }

    #[tokio::test]
    async fn test_window_resets_after_it_elapses() {
        let rl = limiter();
        let t0 = Instant::now();
        for _ in 0..6 {
            rl.check_and_record("ip", t0).await;
        }
        assert!(rl.check_and_record("ip", t0 + Duration::from_millis(15_000)).await);
        assert!(!rl.check_and_record("ip", t0 + Duration::from_millis(15_001)).await);
        for _ in 0..4 {
            assert!(!rl.check_and_record("ip", t0 + Duration::from_millis(15_002)).await);
        }
        assert!(rl.check_and_record("ip", t0 + Duration::from_millis(15_003)).await);
    }

    #[tokio::test]
    async fn test_identities_are_independent() {
        let rl = limiter();
        let now = Instant::now();
        for _ in 0..6 {
            rl.check_and_record("a", now).await;
        }
        assert!(rl.check_and_record("a", now).await);
        assert!(!rl.check_and_record("b", now).await);
    }

    #[tokio::test]
    async fn test_sweep_drops_only_expired_buckets() {
        let rl = limiter();
        let t0 = Instant::now();
        rl.check_and_record("old", t0).await;
        rl.check_and_record("new", t0 + Duration::from_secs(10)).await;
        assert_eq!(rl.sweep(t0 + Duration::from_secs(16)).await, 1);
        assert_eq!(rl.len().await, 1);
        assert_eq!(rl.sweep(t0 + Duration::from_secs(26)).await, 1);
        assert_eq!(rl.len().await, 0);
    }
}
