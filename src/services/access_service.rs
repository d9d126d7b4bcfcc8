use moka::sync::Cache;
use tracing::info;

use crate::db::docstore::{DocumentStore, StoreError};

/// Build the membership cache.
///
/// Entries (grant and denial alike) expire after the configured TTL, so a
/// revoked membership is observed on new binds within one TTL.
pub fn build_membership_cache(ttl: std::time::Duration) -> Cache<String, bool> {
    Cache::builder()
        .max_capacity(100_000)
        .time_to_live(ttl)
        .build()
}

fn cache_key(document_id: &str, user_id: &str) -> String {
    format!("{}/{}", document_id, user_id)
}

/// Check whether `user_id` may bind to `document_id`, consulting the cache
/// before the document store.
pub async fn check_membership(
    cache: &Cache<String, bool>,
    store: &dyn DocumentStore,
    document_id: &str,
    user_id: &str,
) -> Result<bool, StoreError> {
    let key = cache_key(document_id, user_id);

    if let Some(member) = cache.get(&key) {
        return Ok(member);
    }

    info!(
        "Membership cache miss for user {} on document {}. Querying the store.",
        user_id, document_id
    );
    let member = store.is_member(document_id, user_id).await?;

    cache.insert(key, member);
    Ok(member)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingStore {
        queries: AtomicU32,
    }

    #[async_trait]
    impl DocumentStore for CountingStore {
        async fn is_member(&self, _document_id: &str, user_id: &str) -> Result<bool, StoreError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(user_id == "member")
        }

        async fn apply_update(&self, _: &str, _: &str, _: &Value) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn caches_grants_and_denials() {
        let cache = build_membership_cache(std::time::Duration::from_secs(60));
        let store = CountingStore { queries: AtomicU32::new(0) };

        assert!(check_membership(&cache, &store, "d1", "member").await.unwrap());
        assert!(check_membership(&cache, &store, "d1", "member").await.unwrap());
        assert!(!check_membership(&cache, &store, "d1", "stranger").await.unwrap());
        assert!(!check_membership(&cache, &store, "d1", "stranger").await.unwrap());

        // One store query per distinct (document, user) pair
        assert_eq!(store.queries.load(Ordering::SeqCst), 2);
    }
}
