use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the dreamlo leaderboard, as relayed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub name: String,
    pub score: u64,
    /// Defaults to 0 when dreamlo omits it
    pub seconds: f64,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// One complete fetch result. Replaced wholesale, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardSnapshot {
    pub updated_at: DateTime<Utc>,
    pub entries: Vec<LeaderboardEntry>,
}

/// How a read request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Served from the cache within its TTL
    Cached,
    /// Fetched from dreamlo for this request (or a coalesced sibling)
    Fresh,
    /// Upstream failed; an expired snapshot was served instead
    Stale,
}

impl Freshness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Freshness::Cached => "HIT",
            Freshness::Fresh => "MISS",
            Freshness::Stale => "STALE",
        }
    }
}

/// Validated score submission, ready to be relayed upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub name: String,
    pub score: f64,
    pub seconds: Option<f64>,
}

/// Render a number the way it appears in dreamlo paths: integral values
/// without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
