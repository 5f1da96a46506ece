use async_trait::async_trait;

use super::models::{LeaderboardEntry, Submission};
use crate::error::ProxyError;

/// The remote leaderboard of record.
#[async_trait]
pub trait LeaderboardUpstream: Send + Sync {
    /// Fetch every entry currently on the board.
    async fn fetch_all(&self) -> Result<Vec<LeaderboardEntry>, ProxyError>;

    /// Add or update one entry.
    async fn submit_entry(&self, submission: &Submission) -> Result<(), ProxyError>;
}
