use serde::Deserialize;
use serde_json::Value;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ProxyError;
use crate::leaderboard::{LeaderboardUpstream, Submission};
use crate::moderation::{clean_name, normalize_name, ModerationFilter};
use crate::rate_limit::RateLimiter;

/// Transport-level facts about the caller.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// Raw `X-Forwarded-For` header value
    pub forwarded_for: Option<String>,
    pub remote_addr: Option<IpAddr>,
}

impl RequestMeta {
    /// Best-effort client identity: first forwarded address, then the peer
    /// address, then `"unknown"`.
    pub fn client_identity(&self) -> String {
        self.forwarded_for
            .as_deref()
            .and_then(|h| h.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| self.remote_addr.map(|ip| ip.to_string()))
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Submission body. Fields stay untyped so wrong types map onto the
/// matching validation error instead of a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubmitRequest {
    pub name: Option<Value>,
    pub score: Option<Value>,
    pub seconds: Option<Value>,
}

impl SubmitRequest {
    /// Parse a raw body; anything unparseable counts as an empty request.
    pub fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }
}

/// Write-path pipeline: rate limit, name moderation, score validation, relay.
pub struct SubmissionService {
    upstream: Arc<dyn LeaderboardUpstream>,
    limiter: RateLimiter,
    moderation: ModerationFilter,
    max_score: f64,
    configured: bool,
}

impl SubmissionService {
    pub fn new(
        upstream: Arc<dyn LeaderboardUpstream>,
        limiter: RateLimiter,
        moderation: ModerationFilter,
        max_score: f64,
        configured: bool,
    ) -> Self {
        SubmissionService {
            upstream,
            limiter,
            moderation,
            max_score,
            configured,
        }
    }

    /// Validate and relay one submission. Returns the name that was sent
    /// upstream, which may be a generated replacement.
    pub async fn submit(
        &self,
        meta: &RequestMeta,
        request: &SubmitRequest,
    ) -> Result<String, ProxyError> {
        if !self.configured {
            return Err(ProxyError::Misconfigured("DREAMLO_PRIVATE_CODE"));
        }

        let identity = meta.client_identity();
        if self.limiter.check_and_record(&identity, Instant::now()).await {
            warn!("Rate limited submission from {}", identity);
            return Err(ProxyError::RateLimited);
        }

        let raw_name = request
            .name
            .as_ref()
            .and_then(Value::as_str)
            .filter(|n| !n.trim().is_empty())
            .ok_or(ProxyError::InvalidName)?;

        let cleaned = clean_name(raw_name);
        let cleaned = cleaned.trim();
        if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
            return Err(ProxyError::InvalidName);
        }

        let normalized = normalize_name(raw_name);
        let decision = self.moderation.decide(&normalized);
        let final_name = if decision.allowed {
            cleaned.to_string()
        } else {
            match decision.replacement_name {
                Some(replacement) => {
                    info!("Replacing disallowed name from {} with {}", identity, replacement);
                    replacement
                }
                None => {
                    info!("Rejected disallowed name from {}", identity);
                    return Err(ProxyError::NameNotAllowed);
                }
            }
        };

        let score = request
            .score
            .as_ref()
            .and_then(number_value)
            .filter(|s| s.is_finite() && (0.0..=self.max_score).contains(s))
            .ok_or(ProxyError::InvalidScore)?;

        let seconds = request
            .seconds
            .as_ref()
            .and_then(number_value)
            .filter(|s| s.is_finite() && *s >= 0.0);

        let submission = Submission {
            name: final_name,
            score,
            seconds,
        };
        debug!("Relaying submission {:?} from {}", submission, identity);
        self.upstream.submit_entry(&submission).await?;
        Ok(submission.name)
    }
}

/// JSON numbers, or strings holding a number.
fn number_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse().ok(),
        _ => None,
    }
}
