use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Caching, rate-limiting and name-moderating proxy for a dreamlo leaderboard
#[derive(Parser, Debug, Clone)]
#[command(name = "dreamlo-proxy", version, about)]
pub struct Config {
    /// HTTP listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// dreamlo public code (read access)
    #[arg(long, env = "DREAMLO_PUBLIC_CODE")]
    pub dreamlo_public_code: Option<String>,

    /// dreamlo private code (write access)
    #[arg(long, env = "DREAMLO_PRIVATE_CODE")]
    pub dreamlo_private_code: Option<String>,

    /// Base URL tried first for leaderboard reads
    #[arg(long, env = "DREAMLO_SECURE_URL", default_value = "https://www.dreamlo.com")]
    pub dreamlo_secure_url: String,

    /// Plain-HTTP base URL, used for read fallback and for all writes
    #[arg(long, env = "DREAMLO_INSECURE_URL", default_value = "http://www.dreamlo.com")]
    pub dreamlo_insecure_url: String,

    /// Per-request timeout towards dreamlo in seconds
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value = "10")]
    pub upstream_timeout_secs: u64,

    /// Value of Access-Control-Allow-Origin ("*" for any)
    #[arg(long, env = "CORS_ORIGIN", default_value = "*")]
    pub cors_origin: String,

    /// How long a fetched leaderboard is served without asking dreamlo again (ms)
    #[arg(long, env = "CACHE_TTL_MS", default_value = "1500")]
    pub cache_ttl_ms: u64,

    /// Minimum spacing between the starts of two upstream reads (ms)
    #[arg(long, env = "FETCH_COOLDOWN_MS", default_value = "1500")]
    pub fetch_cooldown_ms: u64,

    /// Delay before the single retry of a failed submission (ms)
    #[arg(long, env = "SUBMIT_RETRY_DELAY_MS", default_value = "500")]
    pub submit_retry_delay_ms: u64,

    /// Rate-limit window per client (ms)
    #[arg(long, env = "RATE_LIMIT_WINDOW_MS", default_value = "15000")]
    pub rate_limit_window_ms: u64,

    /// Submissions accepted per client within one window
    #[arg(long, env = "RATE_LIMIT_MAX", default_value = "5")]
    pub rate_limit_max: u32,

    /// Interval between sweeps of expired rate-limit buckets (seconds)
    #[arg(long, env = "RATE_LIMIT_SWEEP_SECS", default_value = "60")]
    pub rate_limit_sweep_secs: u64,

    /// Highest score accepted for submission
    #[arg(long, env = "MAX_SCORE", default_value = "1000000")]
    pub max_score: f64,

    /// Comma-separated substrings that disqualify a name
    #[arg(long, env = "PROHIBITED_SUBSTRINGS", default_value = "")]
    pub prohibited_substrings: String,

    /// Case-insensitive regular expression that disqualifies a name
    #[arg(long, env = "PROHIBITED_REGEX")]
    pub prohibited_regex: Option<String>,

    /// Replace disallowed names with AnonymousNNNN instead of rejecting them
    #[arg(
        long,
        env = "REPLACE_PROFANITY",
        default_value = "false",
        action = clap::ArgAction::Set,
        value_parser = parse_switch
    )]
    pub replace_profanity: bool,
}

/// On only for "true" in any case; every other value is off.
fn parse_switch(value: &str) -> Result<bool, String> {
    Ok(value.trim().eq_ignore_ascii_case("true"))
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dreamlo_public_code.is_none() {
            tracing::warn!("DREAMLO_PUBLIC_CODE is not set; reads will report a misconfiguration");
        }
        if self.dreamlo_private_code.is_none() {
            tracing::warn!("DREAMLO_PRIVATE_CODE is not set; submissions will be refused");
        }
        self.listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("invalid LISTEN_ADDR '{}': {}", self.listen_addr, e))?;
        for base in [&self.dreamlo_secure_url, &self.dreamlo_insecure_url] {
            url::Url::parse(base)
                .map_err(|e| anyhow::anyhow!("invalid dreamlo base URL '{}': {}", base, e))?;
        }
        if self.rate_limit_window_ms == 0 {
            anyhow::bail!("rate_limit_window_ms must be positive");
        }
        if self.rate_limit_max == 0 {
            anyhow::bail!("rate_limit_max must be positive");
        }
        if self.rate_limit_sweep_secs == 0 {
            anyhow::bail!("rate_limit_sweep_secs must be positive");
        }
        if !self.max_score.is_finite() || self.max_score < 0.0 {
            anyhow::bail!("max_score must be a non-negative number");
        }
        if self.cors_origin != "*" {
            self.cors_origin
                .parse::<axum::http::HeaderValue>()
                .map_err(|e| anyhow::anyhow!("invalid CORS_ORIGIN: {}", e))?;
        }
        if let Some(pattern) = &self.prohibited_regex {
            regex::Regex::new(pattern)
                .map_err(|e| anyhow::anyhow!("invalid PROHIBITED_REGEX: {}", e))?;
        }
        Ok(())
    }

    /// Lowercased, trimmed, non-empty entries of `PROHIBITED_SUBSTRINGS`.
    pub fn substring_list(&self) -> Vec<String> {
        self.prohibited_substrings
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn fetch_cooldown(&self) -> Duration {
        Duration::from_millis(self.fetch_cooldown_ms)
    }

    pub fn submit_retry_delay(&self) -> Duration {
        Duration::from_millis(self.submit_retry_delay_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["dreamlo-proxy"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_validate() {
        let config = parse(&[]);
        assert_eq!(config.rate_limit_max, 5);
        assert_eq!(config.rate_limit_window(), Duration::from_secs(15));
        assert!(!config.replace_profanity);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_replace_profanity_accepts_any_case() {
        assert!(parse(&["--replace-profanity", "TRUE"]).replace_profanity);
        assert!(parse(&["--replace-profanity", "True"]).replace_profanity);
        assert!(parse(&["--replace-profanity", "true"]).replace_profanity);
        assert!(!parse(&["--replace-profanity", "yes"]).replace_profanity);
        assert!(!parse(&["--replace-profanity", "1"]).replace_profanity);
        assert!(!parse(&["--replace-profanity", "false"]).replace_profanity);
    }

    #[test]
    fn test_substring_list_is_normalised() {
        let config = parse(&["--prohibited-substrings", " BadWord, ,other ,"]);
        assert_eq!(config.substring_list(), vec!["badword", "other"]);
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let config = parse(&["--prohibited-regex", "(unclosed"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let config = parse(&["--dreamlo-insecure-url", "not a url"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_max_score_is_rejected() {
        let config = parse(&["--max-score=-1"]);
        assert!(config.validate().is_err());
    }
}
