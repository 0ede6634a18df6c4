use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::model::{Dialect, LlmKey, LogEntry, ModelRecord, Upstream};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend unavailable: {0}")]
    Unavailable(String),
}

/// The relational store this proxy's core is built against. A concrete
/// database-backed implementation is an external collaborator (see the
/// specification's out-of-scope list); [`InMemoryStore`] below is the one
/// concrete implementation shipped for tests and local/dev use.
#[async_trait]
pub trait Store: Send + Sync {
    /// Single-join lookup of a model and its owning upstream, by model name.
    /// Returns `Ok(None)` when the model does not exist or has no upstream;
    /// the resolver caches this negative result the same as a positive one.
    async fn get_model_with_upstream(
        &self,
        model_name: &str,
    ) -> Result<Option<(ModelRecord, Upstream)>, StoreError>;

    async fn list_models(&self) -> Result<Vec<ModelRecord>, StoreError>;

    async fn get_llm_key_by_hash(&self, hash: &str) -> Result<Option<LlmKey>, StoreError>;

    async fn update_llm_key_last_used(
        &self,
        id: i64,
        ts: OffsetDateTime,
    ) -> Result<(), StoreError>;

    async fn insert_log_batch(&self, entries: Vec<LogEntry>) -> Result<(), StoreError>;

    async fn delete_old_logs(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError>;

    /// Used by the `/ready` route; a shallow liveness check against the
    /// backing connection, not a full query.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct InMemoryData {
    upstreams: HashMap<i64, Upstream>,
    models: HashMap<String, ModelRecord>,
    keys_by_hash: HashMap<String, LlmKey>,
    logs: Vec<LogEntry>,
}

/// An in-memory [`Store`] implementation: no persistence across process
/// restarts, but otherwise a faithful implementation of the trait's
/// contract. Used by the test suite and by local/dev deployments that don't
/// need a real database.
#[derive(Default)]
pub struct InMemoryStore {
    data: Mutex<InMemoryData>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_upstream(&self, upstream: Upstream) {
        self.data.lock().unwrap().upstreams.insert(upstream.id, upstream);
    }

    pub fn insert_model(&self, model: ModelRecord) {
        self.data.lock().unwrap().models.insert(model.name.clone(), model);
    }

    pub fn insert_llm_key(&self, key: LlmKey) {
        self.data.lock().unwrap().keys_by_hash.insert(key.hash.clone(), key);
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.data.lock().unwrap().logs.clone()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_model_with_upstream(
        &self,
        model_name: &str,
    ) -> Result<Option<(ModelRecord, Upstream)>, StoreError> {
        let data = self.data.lock().unwrap();
        let Some(model) = data.models.get(model_name) else {
            return Ok(None);
        };
        let Some(upstream_id) = model.upstream_id else {
            return Ok(None);
        };
        let Some(upstream) = data.upstreams.get(&upstream_id) else {
            return Ok(None);
        };
        if !model.active || !upstream.active {
            return Ok(None);
        }
        Ok(Some((model.clone(), upstream.clone())))
    }

    async fn list_models(&self) -> Result<Vec<ModelRecord>, StoreError> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .models
            .values()
            .filter(|m| m.active)
            .cloned()
            .collect())
    }

    async fn get_llm_key_by_hash(&self, hash: &str) -> Result<Option<LlmKey>, StoreError> {
        Ok(self.data.lock().unwrap().keys_by_hash.get(hash).cloned())
    }

    async fn update_llm_key_last_used(
        &self,
        id: i64,
        ts: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let mut data = self.data.lock().unwrap();
        if let Some(key) = data.keys_by_hash.values_mut().find(|k| k.id == id) {
            key.last_used_at = Some(ts);
        }
        Ok(())
    }

    async fn insert_log_batch(&self, entries: Vec<LogEntry>) -> Result<(), StoreError> {
        self.data.lock().unwrap().logs.extend(entries);
        Ok(())
    }

    async fn delete_old_logs(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError> {
        let mut data = self.data.lock().unwrap();
        let before = data.logs.len();
        data.logs.retain(|entry| entry.ts >= cutoff);
        Ok((before - data.logs.len()) as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Helper used by callers that only have a [`Dialect`] value on hand (the
/// dispatcher, mostly) so it doesn't need to import the enum from two
/// places.
pub fn dialect_label(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Anthropic => "anthropic",
        Dialect::OpenAi => "openai",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dialect, LlmKey, ModelRecord, Upstream};

    fn sample_upstream() -> Upstream {
        Upstream {
            id: 1,
            name: "primary".into(),
            base_url: "https://api.example.com".into(),
            api_key: "secret".into(),
            dialect: Dialect::OpenAi,
            priority: 0,
            active: true,
        }
    }

    #[tokio::test]
    async fn resolves_model_joined_with_its_upstream() {
        let store = InMemoryStore::new();
        store.insert_upstream(sample_upstream());
        store.insert_model(ModelRecord {
            id: 1,
            name: "claude-3-5-sonnet".into(),
            display_name: "Claude 3.5 Sonnet".into(),
            provider: "anthropic".into(),
            upstream_id: Some(1),
            input_price_per_million: 3.0,
            output_price_per_million: 15.0,
            active: true,
        });

        let (model, upstream) = store
            .get_model_with_upstream("claude-3-5-sonnet")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(model.name, "claude-3-5-sonnet");
        assert_eq!(upstream.id, 1);
    }

    #[tokio::test]
    async fn unroutable_model_with_no_upstream_resolves_to_none() {
        let store = InMemoryStore::new();
        store.insert_model(ModelRecord {
            id: 2,
            name: "orphan".into(),
            display_name: "Orphan".into(),
            provider: "none".into(),
            upstream_id: None,
            input_price_per_million: 0.0,
            output_price_per_million: 0.0,
            active: true,
        });
        assert!(store
            .get_model_with_upstream("orphan")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn auth_lookup_by_hash() {
        let store = InMemoryStore::new();
        store.insert_llm_key(LlmKey {
            id: 7,
            hash: "deadbeef".into(),
            prefix: "pxb_dead".into(),
            name: "ci".into(),
            active: true,
            rate_limit_rps: None,
            last_used_at: None,
        });
        let key = store.get_llm_key_by_hash("deadbeef").await.unwrap().unwrap();
        assert_eq!(key.id, 7);
        assert!(store.get_llm_key_by_hash("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn log_batch_insert_and_retention_sweep() {
        let store = InMemoryStore::new();
        let old = OffsetDateTime::from_unix_timestamp(0).unwrap();
        let recent = OffsetDateTime::now_utc();
        let entry = |ts| LogEntry {
            key_id: None,
            ts,
            method: "POST".into(),
            path: "/v1/messages".into(),
            model: None,
            input_dialect: Dialect::Anthropic,
            upstream_id: None,
            status: 200,
            latency_ms: 10,
            overhead_us: 5,
            input_tokens: 1,
            output_tokens: 1,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
            cost: 0.0,
            error_message: None,
            metadata: serde_json::json!({}),
        };
        store
            .insert_log_batch(vec![entry(old), entry(recent)])
            .await
            .unwrap();
        assert_eq!(store.logs().len(), 2);

        let deleted = store
            .delete_old_logs(OffsetDateTime::now_utc() - time::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.logs().len(), 1);
    }
}
