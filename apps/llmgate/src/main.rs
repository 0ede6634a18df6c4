use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use llmgate_common::GlobalConfigPatch;
use llmgate_core::{
    AsyncLogger, AuthCache, ClientPool, ClientPoolConfig, Dispatcher, LoggerConfig, Resolver,
    spawn_log_retention_sweeper, spawn_pricing_refresh, spawn_rate_limiter_sweeper,
};
use llmgate_resilience::{CircuitBreakerConfig, RateLimiter, RateLimiterConfig, RetryConfig};
use llmgate_storage::{InMemoryStore, PricingTracker};

mod cli;
mod router;
mod seed;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = cli::Cli::parse();
    let seed_file = cli.seed_file.clone();
    let config = cli.into_patch().into_config()?;

    let store = Arc::new(InMemoryStore::new());
    if let Some(path) = seed_file {
        seed::load(&store, &path)?;
        tracing::info!(event = "seed_loaded", path);
    }

    let resolver = Arc::new(Resolver::new(store.clone(), Duration::from_millis(config.resolver_cache_ttl_ms)));
    let (auth, _auth_handle) = AuthCache::spawn(store.clone(), Duration::from_millis(config.auth_cache_ttl_ms));
    let client_pool = Arc::new(ClientPool::new(ClientPoolConfig {
        connect_timeout: Duration::from_secs(30),
        stream_idle_timeout: Duration::from_secs(60),
        breaker: CircuitBreakerConfig {
            threshold: config.breaker_threshold,
            timeout: Duration::from_millis(config.breaker_timeout_ms),
            half_open_max: config.breaker_half_open_max,
        },
        retry: RetryConfig {
            max_attempts: config.retry_max_attempts,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            jitter: config.retry_jitter,
        },
    }));
    let (logger, _logger_handle) = AsyncLogger::spawn(
        store.clone(),
        LoggerConfig {
            queue_capacity: config.log_queue_capacity,
            batch_size: config.log_batch_size,
            flush_interval: Duration::from_millis(config.log_flush_interval_ms),
            flush_timeout: Duration::from_millis(config.log_flush_timeout_ms),
        },
    );
    let pricing = Arc::new(PricingTracker::new());
    let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
        default_rps: config.rate_limiter_default_rps,
        burst_multiplier: config.rate_limiter_burst_multiplier,
        idle_evict: Duration::from_millis(config.rate_limiter_idle_evict_ms),
    }));

    let _pricing_handle = spawn_pricing_refresh(
        store.clone(),
        pricing.clone(),
        Duration::from_millis(config.pricing_refresh_interval_ms),
    );
    let _retention_handle = spawn_log_retention_sweeper(
        store.clone(),
        Duration::from_millis(config.log_retention_sweep_interval_ms),
        Duration::from_secs(config.log_retention_hours * 3600),
    );
    let _sweeper_handle = spawn_rate_limiter_sweeper(
        rate_limiter.clone(),
        Duration::from_millis(config.rate_limiter_sweep_interval_ms),
    );

    let dispatcher = Arc::new(Dispatcher::new(resolver, auth, client_pool, logger, pricing, rate_limiter));
    let state = router::AppState { dispatcher, readiness: store };
    let app = router::router(state);

    let bind = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(event = "listening", addr = %bind);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
