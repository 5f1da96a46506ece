pub mod client;
pub mod coordinator;
pub mod models;
pub mod upstream;

pub use client::{DreamloClient, DreamloSettings};
pub use coordinator::FetchCoordinator;
pub use models::Submission;
pub use upstream::LeaderboardUpstream;

#[cfg(test)]
pub mod testing {
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::models::{LeaderboardEntry, Submission};
    use super::LeaderboardUpstream;
    use crate::error::ProxyError;

    /// In-memory stand-in for dreamlo that counts calls and records writes.
    #[derive(Default)]
    pub struct MockUpstream {
        fetches: AtomicUsize,
        delay: Duration,
        failing: AtomicBool,
        pub submissions: Mutex<Vec<Submission>>,
    }

    impl MockUpstream {
        pub fn with_delay(delay: Duration) -> Self {
            MockUpstream {
                delay,
                ..Default::default()
            }
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn fetch_calls(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }

        pub fn submitted(&self) -> Vec<Submission> {
            self.submissions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LeaderboardUpstream for MockUpstream {
        async fn fetch_all(&self) -> Result<Vec<LeaderboardEntry>, ProxyError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(ProxyError::upstream(Some(503), "mock outage"));
            }
            Ok(vec![LeaderboardEntry {
                name: format!("player{}", n),
                score: 100 * n as u64,
                seconds: 0.0,
                date: "10/17/2026 12:00:00 PM".into(),
                text: Some(String::new()),
            }])
        }

        async fn submit_entry(&self, submission: &Submission) -> Result<(), ProxyError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ProxyError::upstream(Some(502), "mock outage"));
            }
            self.submissions.lock().unwrap().push(submission.clone());
            Ok(())
        }
    }
}
