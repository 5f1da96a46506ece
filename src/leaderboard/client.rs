use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::models::{format_number, LeaderboardEntry, Submission};
use super::upstream::LeaderboardUpstream;
use crate::config::Config;
use crate::error::ProxyError;

const USER_AGENT: &str = concat!("dreamlo-proxy/", env!("CARGO_PKG_VERSION"));

/// Connection settings for [`DreamloClient`].
#[derive(Debug, Clone)]
pub struct DreamloSettings {
    /// Tried first for reads
    pub secure_url: String,
    /// Read fallback and the only transport used for writes
    pub insecure_url: String,
    pub public_code: Option<String>,
    pub private_code: Option<String>,
    pub timeout: Duration,
    /// Minimum spacing between the starts of two reads
    pub cooldown: Duration,
    /// Pause before retrying a failed write
    pub retry_delay: Duration,
}

impl DreamloSettings {
    pub fn from_config(config: &Config) -> Self {
        DreamloSettings {
            secure_url: config.dreamlo_secure_url.clone(),
            insecure_url: config.dreamlo_insecure_url.clone(),
            public_code: config.dreamlo_public_code.clone(),
            private_code: config.dreamlo_private_code.clone(),
            timeout: config.upstream_timeout(),
            cooldown: config.fetch_cooldown(),
            retry_delay: config.submit_retry_delay(),
        }
    }
}

/// HTTP client for the dreamlo leaderboard API.
///
/// dreamlo rejects identical requests arriving within about a second of each
/// other and several boards only answer over plain HTTP, so reads are spaced
/// by a cooldown and fall back from the secure to the insecure base URL.
pub struct DreamloClient {
    http: Client,
    settings: DreamloSettings,
    last_fetch_started: Mutex<Option<Instant>>,
}

impl DreamloClient {
    pub fn new(settings: DreamloSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(DreamloClient {
            http,
            settings,
            last_fetch_started: Mutex::new(None),
        })
    }

    /// Sleep out whatever is left of the cooldown, then stamp a new start.
    /// The lock is held across the sleep so concurrent callers queue up.
    async fn wait_for_cooldown(&self) {
        let mut last = self.last_fetch_started.lock().await;
        if let Some(prev) = *last {
            let wait = self.settings.cooldown.saturating_sub(prev.elapsed());
            if !wait.is_zero() {
                debug!("Upstream cooldown: waiting {:?} before next read", wait);
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn get_json(&self, url: &str) -> Result<Value, ProxyError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ProxyError::upstream(Some(status.as_u16()), body));
        }

        serde_json::from_str(&body).map_err(|e| {
            ProxyError::upstream(
                Some(status.as_u16()),
                format!("unparseable leaderboard body ({}): {}", e, body),
            )
        })
    }

    async fn try_submit(&self, url: &str) -> Result<(), ProxyError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ProxyError::upstream(Some(status.as_u16()), body));
        }
        debug!("dreamlo accepted submission: {}", body.trim());
        Ok(())
    }
}

#[async_trait]
impl LeaderboardUpstream for DreamloClient {
    async fn fetch_all(&self) -> Result<Vec<LeaderboardEntry>, ProxyError> {
        let code = self
            .settings
            .public_code
            .as_deref()
            .ok_or(ProxyError::Misconfigured("DREAMLO_PUBLIC_CODE"))?;

        self.wait_for_cooldown().await;

        let secure = read_url(&self.settings.secure_url, code);
        match self.get_json(&secure).await {
            Ok(raw) => return Ok(parse_entries(&raw)),
            Err(e) => warn!("Secure leaderboard read failed, retrying over plain HTTP: {}", e),
        }

        let insecure = read_url(&self.settings.insecure_url, code);
        let raw = self.get_json(&insecure).await?;
        Ok(parse_entries(&raw))
    }

    async fn submit_entry(&self, submission: &Submission) -> Result<(), ProxyError> {
        let code = self
            .settings
            .private_code
            .as_deref()
            .ok_or(ProxyError::Misconfigured("DREAMLO_PRIVATE_CODE"))?;

        let url = add_url(&self.settings.insecure_url, code, submission);
        debug!(
            "Submitting '{}' with score {} to dreamlo",
            submission.name, submission.score
        );

        match self.try_submit(&url).await {
            Err(e) if is_transient(&e) => {
                warn!(
                    "Submission failed ({}), retrying in {:?}",
                    e, self.settings.retry_delay
                );
                tokio::time::sleep(self.settings.retry_delay).await;
                self.try_submit(&url).await
            }
            other => other,
        }
    }
}

fn is_transient(err: &ProxyError) -> bool {
    match err {
        ProxyError::Upstream { status: None, .. } => true,
        ProxyError::Upstream {
            status: Some(code), ..
        } => *code >= 500 || *code == 429,
        _ => false,
    }
}

// ── URL building ───────────────────────────────────────────────────────────────

/// `{base}/lb/{code}/json`
fn read_url(base: &str, code: &str) -> String {
    format!(
        "{}/lb/{}/json",
        base.trim_end_matches('/'),
        encode_segment(code)
    )
}

/// `{base}/lb/{code}/add/{name}/{score}[/{seconds}]`, dreamlo's write protocol.
fn add_url(base: &str, code: &str, submission: &Submission) -> String {
    let mut url = format!(
        "{}/lb/{}/add/{}/{}",
        base.trim_end_matches('/'),
        encode_segment(code),
        encode_segment(&submission.name),
        format_number(submission.score)
    );
    if let Some(seconds) = submission.seconds {
        url.push('/');
        url.push_str(&format_number(seconds));
    }
    url
}

/// Percent-encode one path segment, leaving the characters JavaScript's
/// `encodeURIComponent` leaves alone.
fn encode_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '!' | '~' | '*' | '\'' | '('
            | ')' => out.push(c),
            c => {
                let mut buf = [0u8; 4];
                for b in c.encode_utf8(&mut buf).as_bytes() {
                    out.push_str(&format!("%{:02X}", b));
                }
            }
        }
    }
    out
}

// ── Parsing helpers ────────────────────────────────────────────────────────────

/// Extract entries from dreamlo's `{ dreamlo: { leaderboard: { entry } } }`
/// envelope. dreamlo sends `leaderboard: null` for an empty board and a bare
/// object instead of a list when there is exactly one entry.
fn parse_entries(raw: &Value) -> Vec<LeaderboardEntry> {
    let entry = &raw["dreamlo"]["leaderboard"]["entry"];
    match entry {
        Value::Array(items) => items.iter().map(parse_entry).collect(),
        Value::Object(_) => vec![parse_entry(entry)],
        _ => vec![],
    }
}

fn parse_entry(item: &Value) -> LeaderboardEntry {
    let score = number_field(&item["score"])
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(|s| s as u64)
        .unwrap_or(0);
    let seconds = number_field(&item["seconds"])
        .filter(|s| s.is_finite() && *s >= 0.0)
        .unwrap_or(0.0);

    LeaderboardEntry {
        name: string_field(&item["name"]).unwrap_or_default(),
        score,
        seconds,
        date: string_field(&item["date"]).unwrap_or_default(),
        text: string_field(&item["text"]),
    }
}

/// dreamlo serialises numbers as strings; accept either.
fn number_field(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

fn string_field(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
