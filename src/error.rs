use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Request-level failures surfaced by the read and write paths.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProxyError {
    /// Network failure, non-success status or unparseable body from dreamlo.
    #[error("upstream error (status {status:?}): {detail}")]
    Upstream { status: Option<u16>, detail: String },

    #[error("too many submissions from this client")]
    RateLimited,

    #[error("name is missing or blank")]
    InvalidName,

    #[error("name is not allowed")]
    NameNotAllowed,

    #[error("score is missing, non-numeric or out of range")]
    InvalidScore,

    /// A required leaderboard code is absent from the configuration.
    #[error("server is not configured: {0}")]
    Misconfigured(&'static str),
}

impl ProxyError {
    pub fn upstream(status: Option<u16>, detail: impl Into<String>) -> Self {
        ProxyError::Upstream {
            status,
            detail: detail.into(),
        }
    }

    /// Stable machine-readable identifier used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::Upstream { .. } => "upstream_error",
            ProxyError::RateLimited => "rate_limited",
            ProxyError::InvalidName => "invalid_name",
            ProxyError::NameNotAllowed => "name_not_allowed",
            ProxyError::InvalidScore => "invalid_score",
            ProxyError::Misconfigured(_) => "misconfigured",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::InvalidName | ProxyError::NameNotAllowed | ProxyError::InvalidScore => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::Misconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = match &self {
            ProxyError::Upstream { status, detail } => json!({
                "error": self.kind(),
                "status": status,
                "detail": detail,
            }),
            _ => json!({ "error": self.kind() }),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(error: reqwest::Error) -> Self {
        ProxyError::upstream(error.status().map(|s| s.as_u16()), error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_matches_api_contract() {
        assert_eq!(ProxyError::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ProxyError::InvalidScore.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ProxyError::NameNotAllowed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ProxyError::Misconfigured("DREAMLO_PRIVATE_CODE").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ProxyError::upstream(Some(500), "boom").status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_kind_strings_are_stable() {
        assert_eq!(ProxyError::upstream(None, "x").kind(), "upstream_error");
        assert_eq!(ProxyError::NameNotAllowed.kind(), "name_not_allowed");
        assert_eq!(ProxyError::InvalidName.kind(), "invalid_name");
    }
}
