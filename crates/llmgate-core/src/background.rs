//! Always-on maintenance tasks that aren't tied to any single request:
//! the pricing snapshot refresher, the log-retention sweeper, and the
//! rate-limiter idle-bucket sweeper. Each logs its own lifecycle and a
//! periodic tick summary, and a panic inside one never takes the others or
//! the request path down with it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use llmgate_resilience::RateLimiter;
use llmgate_storage::{PricingTracker, Store};

pub fn spawn_pricing_refresh<S: Store + 'static>(
    store: Arc<S>,
    tracker: Arc<PricingTracker>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(event = "pricing_refresh_started", interval_ms = interval.as_millis());
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.list_models().await {
                Ok(models) => {
                    tracker.replace(&models);
                    tracing::debug!(event = "pricing_refresh_tick", models = models.len());
                }
                Err(err) => tracing::warn!(event = "pricing_refresh_failed", error = %err),
            }
        }
    })
}

pub fn spawn_log_retention_sweeper<S: Store + 'static>(
    store: Arc<S>,
    interval: Duration,
    retention: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(event = "log_retention_sweeper_started", interval_ms = interval.as_millis());
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let cutoff = time::OffsetDateTime::now_utc() - retention;
            match store.delete_old_logs(cutoff).await {
                Ok(deleted) => tracing::debug!(event = "log_retention_sweep_tick", deleted),
                Err(err) => tracing::warn!(event = "log_retention_sweep_failed", error = %err),
            }
        }
    })
}

pub fn spawn_rate_limiter_sweeper(limiter: Arc<RateLimiter>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(event = "rate_limiter_sweeper_started", interval_ms = interval.as_millis());
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = limiter.sweep();
            if evicted > 0 {
                tracing::debug!(event = "rate_limiter_sweep_tick", evicted);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgate_resilience::RateLimiterConfig;
    use llmgate_storage::{InMemoryStore, ModelRecord};

    #[tokio::test]
    async fn pricing_refresh_loads_models_into_tracker() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_model(ModelRecord {
            id: 1,
            name: "m".into(),
            display_name: "M".into(),
            provider: "p".into(),
            upstream_id: None,
            input_price_per_million: 1.0,
            output_price_per_million: 2.0,
            active: true,
        });
        let tracker = Arc::new(PricingTracker::new());
        let handle = spawn_pricing_refresh(store, tracker.clone(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(tracker.price_for("m").is_some());
        handle.abort();
    }

    #[tokio::test]
    async fn rate_limiter_sweeper_evicts_idle_buckets() {
        let limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
            default_rps: 1.0,
            burst_multiplier: 1.0,
            idle_evict: Duration::from_millis(1),
        }));
        limiter.admit("k", None);
        let handle = spawn_rate_limiter_sweeper(limiter.clone(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.is_empty());
        handle.abort();
    }
}
