use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod config;
mod error;
mod leaderboard;
mod moderation;
mod rate_limit;
mod server;
mod submission;

use config::Config;
use leaderboard::{DreamloClient, DreamloSettings, FetchCoordinator, LeaderboardUpstream};
use moderation::ModerationFilter;
use rate_limit::RateLimiter;
use server::AppState;
use submission::SubmissionService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let upstream: Arc<dyn LeaderboardUpstream> =
        Arc::new(DreamloClient::new(DreamloSettings::from_config(&config))?);

    let moderation = ModerationFilter::new(
        config.substring_list(),
        config.prohibited_regex.as_deref(),
        config.replace_profanity,
    )
    .context("Failed to compile PROHIBITED_REGEX")?;

    let limiter = RateLimiter::new(config.rate_limit_window(), config.rate_limit_max);

    let state = AppState {
        leaderboard: FetchCoordinator::new(upstream.clone(), config.cache_ttl()),
        submissions: Arc::new(SubmissionService::new(
            upstream,
            limiter.clone(),
            moderation,
            config.max_score,
            config.dreamlo_private_code.is_some(),
        )),
    };

    info!(
        "Cache TTL {:?}, upstream cooldown {:?}, rate limit {} per {:?}, replace profanity: {}",
        config.cache_ttl(),
        config.fetch_cooldown(),
        config.rate_limit_max,
        config.rate_limit_window(),
        config.replace_profanity
    );

    // Background sweep of expired rate-limit buckets
    {
        let limiter = limiter.clone();
        let every = Duration::from_secs(config.rate_limit_sweep_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                limiter.sweep(tokio::time::Instant::now()).await;
            }
        });
    }

    let app = server::router(state, server::cors_layer(&config.cors_origin)?);
    let addr: SocketAddr = config.listen_addr.parse()?;
    info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
