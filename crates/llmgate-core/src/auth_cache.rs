//! Hashed-key authentication lookup with a TTL cache and an asynchronous
//! last-used-at write-back, so the hot request path never blocks on a
//! store write purely to update an audit timestamp.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use llmgate_storage::{LlmKey, Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("unknown or inactive api key")]
    Unknown,
    #[error("auth store lookup failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
struct CacheEntry {
    key: Option<LlmKey>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

pub fn hash_key(plaintext: &str) -> String {
    let digest = Sha256::digest(plaintext.as_bytes());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Drives the cache and owns the background last-used-at flusher. One
/// instance is shared across all request tasks via `Arc`.
pub struct AuthCache<S: Store> {
    store: Arc<S>,
    cache: ArcSwap<HashMap<String, CacheEntry>>,
    ttl: Duration,
    last_used_tx: mpsc::Sender<(i64, OffsetDateTime)>,
}

impl<S: Store + 'static> AuthCache<S> {
    /// Spawns the last-used-at writer task alongside the cache. The
    /// returned handle is for graceful shutdown; dropping the cache without
    /// awaiting it simply lets the task's channel close and the task exit.
    pub fn spawn(store: Arc<S>, ttl: Duration) -> (Arc<Self>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<(i64, OffsetDateTime)>(256);
        let flusher_store = store.clone();
        let handle = tokio::spawn(async move {
            while let Some((id, ts)) = rx.recv().await {
                if let Err(err) = flusher_store.update_llm_key_last_used(id, ts).await {
                    tracing::warn!(event = "auth_last_used_write_failed", key_id = id, error = %err);
                }
            }
            tracing::info!(event = "auth_last_used_writer_stopped");
        });

        let cache = Arc::new(Self {
            store,
            cache: ArcSwap::from_pointee(HashMap::new()),
            ttl,
            last_used_tx: tx,
        });
        (cache, handle)
    }

    /// Authenticates a plaintext key presented on the wire. On success,
    /// schedules a best-effort, non-blocking last-used-at update.
    pub async fn authenticate(&self, plaintext: &str) -> Result<LlmKey, AuthError> {
        let hash = hash_key(plaintext);

        if let Some(entry) = self.cache.load().get(&hash) {
            if entry.is_live() {
                return self.finish(entry.key.clone());
            }
        }

        let found = self.store.get_llm_key_by_hash(&hash).await?;
        self.publish(hash, found.clone());
        self.finish(found)
    }

    fn finish(&self, key: Option<LlmKey>) -> Result<LlmKey, AuthError> {
        let key = key.filter(|k| k.active).ok_or(AuthError::Unknown)?;
        // best-effort: a full last-used channel just means this tick's
        // timestamp update is skipped, not a correctness problem.
        let _ = self.last_used_tx.try_send((key.id, OffsetDateTime::now_utc()));
        Ok(key)
    }

    fn publish(&self, hash: String, key: Option<LlmKey>) {
        let expires_at = Instant::now() + self.ttl;
        let mut next = (**self.cache.load()).clone();
        next.insert(hash, CacheEntry { key, expires_at });
        self.cache.store(Arc::new(next));
    }
}

/// Extracts the bearer/`x-api-key` credential from the two header shapes
/// clients may use, returning the plaintext for [`AuthCache::authenticate`].
pub fn extract_presented_key(headers: &http::HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(value.trim().to_string());
    }
    let auth = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    auth.trim()
        .strip_prefix("Bearer ")
        .or_else(|| auth.trim().strip_prefix("bearer "))
        .map(|token| token.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgate_storage::InMemoryStore;

    fn store_with_key() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.insert_llm_key(LlmKey {
            id: 7,
            hash: hash_key("pxb_livekey"),
            prefix: "pxb_live".into(),
            name: "ci".into(),
            active: true,
            rate_limit_rps: None,
            last_used_at: None,
        });
        store
    }

    #[tokio::test]
    async fn authenticates_a_known_active_key() {
        let (cache, _handle) = AuthCache::spawn(Arc::new(store_with_key()), Duration::from_secs(60));
        let key = cache.authenticate("pxb_livekey").await.unwrap();
        assert_eq!(key.id, 7);
    }

    #[tokio::test]
    async fn rejects_an_unknown_key() {
        let (cache, _handle) = AuthCache::spawn(Arc::new(InMemoryStore::new()), Duration::from_secs(60));
        assert!(matches!(cache.authenticate("nope").await, Err(AuthError::Unknown)));
    }

    #[tokio::test]
    async fn rejects_an_inactive_key() {
        let store = InMemoryStore::new();
        store.insert_llm_key(LlmKey {
            id: 1,
            hash: hash_key("disabled"),
            prefix: "pxb_disa".into(),
            name: "old".into(),
            active: false,
            rate_limit_rps: None,
            last_used_at: None,
        });
        let (cache, _handle) = AuthCache::spawn(Arc::new(store), Duration::from_secs(60));
        assert!(matches!(cache.authenticate("disabled").await, Err(AuthError::Unknown)));
    }

    #[test]
    fn extracts_bearer_and_x_api_key_headers() {
        let mut headers = http::HeaderMap::new();
        headers.insert(http::header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(extract_presented_key(&headers).as_deref(), Some("abc123"));

        let mut headers = http::HeaderMap::new();
        headers.insert("x-api-key", "xyz789".parse().unwrap());
        assert_eq!(extract_presented_key(&headers).as_deref(), Some("xyz789"));
    }
}
