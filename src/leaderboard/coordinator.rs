//! Read-path coordination in front of the upstream leaderboard.
//!
//! ```text
//!  read() ──▶ fresh slot? ──yes──▶ cached snapshot
//!               │ no
//!               ▼
//!          fetch in flight? ──yes──▶ await the shared handle
//!               │ no
//!               ▼
//!          spawn fetch, publish handle ──▶ await it
//!               │
//!       ok ─────┴───── err
//!  replace slot      stale slot? ──yes──▶ stale snapshot
//!                         │ no
//!                         ▼
//!                   UpstreamError
//! ```
//!
//! The freshness check and the publication of the in-flight handle happen
//! under one `std::sync::Mutex` guard that is never held across an await, so
//! at most one upstream read runs per process.

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::models::{Freshness, LeaderboardSnapshot};
use super::upstream::LeaderboardUpstream;
use crate::error::ProxyError;

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<LeaderboardSnapshot>, ProxyError>>>;

struct CacheSlot {
    fetched_at: Instant,
    snapshot: Arc<LeaderboardSnapshot>,
}

#[derive(Default)]
struct CoordinatorState {
    /// Most recent successful fetch, kept even after it expires
    slot: Option<CacheSlot>,
    in_flight: Option<SharedFetch>,
}

struct Inner {
    upstream: Arc<dyn LeaderboardUpstream>,
    ttl: Duration,
    state: Mutex<CoordinatorState>,
}

/// A snapshot together with how it was obtained.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub snapshot: Arc<LeaderboardSnapshot>,
    pub freshness: Freshness,
}

/// Caching, coalescing front for leaderboard reads. Clones share state.
#[derive(Clone)]
pub struct FetchCoordinator {
    inner: Arc<Inner>,
}

impl FetchCoordinator {
    pub fn new(upstream: Arc<dyn LeaderboardUpstream>, ttl: Duration) -> Self {
        FetchCoordinator {
            inner: Arc::new(Inner {
                upstream,
                ttl,
                state: Mutex::new(CoordinatorState::default()),
            }),
        }
    }

    /// Current leaderboard: cached, freshly fetched, or stale if the upstream
    /// is failing. Errors only when nothing has ever been fetched.
    pub async fn read(&self) -> Result<ReadOutcome, ProxyError> {
        let fetch = {
            let mut state = lock(&self.inner.state);
            if let Some(slot) = &state.slot {
                if slot.fetched_at.elapsed() < self.inner.ttl {
                    debug!("Leaderboard cache hit");
                    return Ok(ReadOutcome {
                        snapshot: Arc::clone(&slot.snapshot),
                        freshness: Freshness::Cached,
                    });
                }
            }
            match state.in_flight.clone() {
                Some(pending) => {
                    debug!("Joining in-flight leaderboard fetch");
                    pending
                }
                None => {
                    debug!("Leaderboard cache miss, starting upstream fetch");
                    let pending = self.start_fetch();
                    state.in_flight = Some(pending.clone());
                    pending
                }
            }
        };

        match fetch.await {
            Ok(snapshot) => Ok(ReadOutcome {
                snapshot,
                freshness: Freshness::Fresh,
            }),
            Err(err) => {
                let state = lock(&self.inner.state);
                match &state.slot {
                    Some(slot) => {
                        warn!(
                            "Serving stale leaderboard ({:?} old) after upstream failure: {}",
                            slot.fetched_at.elapsed(),
                            err
                        );
                        Ok(ReadOutcome {
                            snapshot: Arc::clone(&slot.snapshot),
                            freshness: Freshness::Stale,
                        })
                    }
                    None => Err(err),
                }
            }
        }
    }

    /// Spawn the upstream read on its own task so it finishes even if every
    /// waiting request goes away. The task settles the shared state itself.
    fn start_fetch(&self) -> SharedFetch {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = inner.upstream.fetch_all().await;
            let mut state = lock(&inner.state);
            state.in_flight = None;
            match result {
                Ok(entries) => {
                    info!("Fetched {} leaderboard entries from upstream", entries.len());
                    let snapshot = Arc::new(LeaderboardSnapshot {
                        updated_at: Utc::now(),
                        entries,
                    });
                    state.slot = Some(CacheSlot {
                        fetched_at: Instant::now(),
                        snapshot: Arc::clone(&snapshot),
                    });
                    Ok(snapshot)
                }
                Err(e) => {
                    warn!("Upstream leaderboard fetch failed: {}", e);
                    Err(e)
                }
            }
        });

        let inner = Arc::clone(&self.inner);
        async move {
            match task.await {
                Ok(result) => result,
                Err(join_err) => {
                    lock(&inner.state).in_flight = None;
                    Err(ProxyError::upstream(
                        None,
                        format!("leaderboard fetch task failed: {}", join_err),
                    ))
                }
            }
        }
        .boxed()
        .shared()
    }
}

fn lock(state: &Mutex<CoordinatorState>) -> MutexGuard<'_, CoordinatorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaderboard::testing::MockUpstream;

    const TTL: Duration = Duration::from_millis(1500);

    fn coordinator(mock: &Arc<MockUpstream>) -> FetchCoordinator {
        FetchCoordinator::new(mock.clone(), TTL)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_within_ttl_hit_the_cache() {
        let mock = Arc::new(MockUpstream::default());
        let coord = coordinator(&mock);

        let first = coord.read().await.unwrap();
        assert_eq!(first.freshness, Freshness::Fresh);

        tokio::time::advance(Duration::from_millis(1000)).await;
        let second = coord.read().await.unwrap();
        assert_eq!(second.freshness, Freshness::Cached);
        assert!(Arc::ptr_eq(&first.snapshot, &second.snapshot));
        assert_eq!(
            serde_json::to_vec(&*first.snapshot).unwrap(),
            serde_json::to_vec(&*second.snapshot).unwrap()
        );
        assert_eq!(mock.fetch_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_cache_triggers_new_fetch() {
        let mock = Arc::new(MockUpstream::default());
        let coord = coordinator(&mock);

        coord.read().await.unwrap();
        tokio::time::advance(TTL).await;
        let outcome = coord.read().await.unwrap();
        assert_eq!(outcome.freshness, Freshness::Fresh);
        assert_eq!(mock.fetch_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_coalesce_into_one_fetch() {
        let mock = Arc::new(MockUpstream::with_delay(Duration::from_millis(200)));
        let coord = coordinator(&mock);

        let reads: Vec<_> = (0..10)
            .map(|_| {
                let coord = coord.clone();
                tokio::spawn(async move { coord.read().await })
            })
            .collect();
        let results = futures_util::future::join_all(reads).await;

        assert_eq!(mock.fetch_calls(), 1);
        let snapshots: Vec<_> = results
            .into_iter()
            .map(|r| r.unwrap().unwrap().snapshot)
            .collect();
        assert!(snapshots.iter().all(|s| Arc::ptr_eq(s, &snapshots[0])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_failure_serves_stale_snapshot() {
        let mock = Arc::new(MockUpstream::default());
        let coord = coordinator(&mock);

        let good = coord.read().await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        mock.set_failing(true);

        let outcome = coord.read().await.unwrap();
        assert_eq!(outcome.freshness, Freshness::Stale);
        assert!(Arc::ptr_eq(&good.snapshot, &outcome.snapshot));
        assert_eq!(mock.fetch_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_failure_surfaces_upstream_error() {
        let mock = Arc::new(MockUpstream::default());
        mock.set_failing(true);
        let coord = coordinator(&mock);

        let err = coord.read().await.unwrap_err();
        assert!(matches!(err, ProxyError::Upstream { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_clears_in_flight_so_next_read_retries() {
        let mock = Arc::new(MockUpstream::default());
        mock.set_failing(true);
        let coord = coordinator(&mock);

        assert!(coord.read().await.is_err());
        mock.set_failing(false);
        let outcome = coord.read().await.unwrap();
        assert_eq!(outcome.freshness, Freshness::Fresh);
        assert_eq!(mock.fetch_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalesced_waiters_all_get_stale_on_failure() {
        let mock = Arc::new(MockUpstream::with_delay(Duration::from_millis(100)));
        let coord = coordinator(&mock);
        let good = coord.read().await.unwrap();

        tokio::time::advance(TTL * 2).await;
        mock.set_failing(true);

        let reads: Vec<_> = (0..5)
            .map(|_| {
                let coord = coord.clone();
                tokio::spawn(async move { coord.read().await })
            })
            .collect();
        for result in futures_util::future::join_all(reads).await {
            let outcome = result.unwrap().unwrap();
            assert_eq!(outcome.freshness, Freshness::Stale);
            assert!(Arc::ptr_eq(&outcome.snapshot, &good.snapshot));
        }
        assert_eq!(mock.fetch_calls(), 2);
    }
}
