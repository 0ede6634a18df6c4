//! Maps a model name carried in a request body to its owning upstream.
//! Backed by a reader-biased cache: hot reads never block behind a writer,
//! a miss or expiry pays one store round trip and republishes the whole map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;

use llmgate_storage::{ResolvedModel, Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    /// The model does not exist, or exists but has no active upstream. The
    /// store's own join collapses both cases into `None`, so the resolver
    /// can't tell them apart; both render as `not_found` to the client.
    #[error("model not routable: {0}")]
    Unroutable(String),
    #[error("resolver store lookup failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
struct CacheEntry {
    resolved: Option<ResolvedModel>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// `Resolver<S>` owns no background task; cache population happens inline
/// on the calling request's task, so cold-start duplicate work across
/// concurrently racing requests for the same model is possible and
/// accepted (bounded by concurrent distinct misses, not a correctness
/// issue).
pub struct Resolver<S: Store> {
    store: Arc<S>,
    cache: ArcSwap<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl<S: Store> Resolver<S> {
    pub fn new(store: Arc<S>, ttl: Duration) -> Self {
        Self {
            store,
            cache: ArcSwap::from_pointee(HashMap::new()),
            ttl,
        }
    }

    /// Returns the resolved upstream for `model_name`, consulting the cache
    /// first. A negative result is cached for the same TTL as a positive
    /// one, so a flood of requests for an unknown model doesn't hammer the
    /// store.
    pub async fn resolve(&self, model_name: &str) -> Result<ResolvedModel, ResolverError> {
        if let Some(entry) = self.cache.load().get(model_name) {
            if entry.is_live() {
                return entry
                    .resolved
                    .clone()
                    .ok_or_else(|| ResolverError::Unroutable(model_name.to_string()));
            }
        }

        let row = self.store.get_model_with_upstream(model_name).await?;
        let resolved = row.map(|(model, upstream)| ResolvedModel {
            model_name: model.name,
            upstream_id: upstream.id,
            upstream_base_url: upstream.base_url,
            upstream_api_key: upstream.api_key,
            upstream_dialect: upstream.dialect,
        });
        self.publish(model_name.to_string(), resolved.clone());

        resolved.ok_or_else(|| ResolverError::Unroutable(model_name.to_string()))
    }

    /// Eagerly loads every active model so the first request for it doesn't
    /// pay a cold-cache round trip.
    pub async fn warm(&self) -> Result<usize, ResolverError> {
        let models = self.store.list_models().await?;
        let mut warmed = 0;
        for model in &models {
            let row = self.store.get_model_with_upstream(&model.name).await?;
            let resolved = row.map(|(model, upstream)| ResolvedModel {
                model_name: model.name,
                upstream_id: upstream.id,
                upstream_base_url: upstream.base_url,
                upstream_api_key: upstream.api_key,
                upstream_dialect: upstream.dialect,
            });
            self.publish(model.name.clone(), resolved);
            warmed += 1;
        }
        tracing::info!(event = "resolver_warmed", models = warmed);
        Ok(warmed)
    }

    fn publish(&self, model_name: String, resolved: Option<ResolvedModel>) {
        let expires_at = Instant::now() + self.ttl;
        let mut next = (**self.cache.load()).clone();
        next.insert(model_name, CacheEntry { resolved, expires_at });
        self.cache.store(Arc::new(next));
    }
}
