//! Thin readiness abstraction for the `/ready` route. The concrete check
//! (pinging the relational store) is an external collaborator's concern;
//! this trait exists purely so the route is exercisable in tests without a
//! real store.

use async_trait::async_trait;

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn check(&self) -> bool;
}

#[async_trait]
impl<S: llmgate_storage::Store> ReadinessProbe for S {
    async fn check(&self) -> bool {
        self.ping().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgate_storage::InMemoryStore;

    #[tokio::test]
    async fn in_memory_store_is_always_ready() {
        let store = InMemoryStore::new();
        assert!(store.check().await);
    }
}
