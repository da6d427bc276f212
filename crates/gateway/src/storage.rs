//! Seam to the external object store holding tenant uploads.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;

use tollgate_core::GatewayError;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Deletes every object in `bucket` whose key starts with `prefix` and
    /// returns the deleted keys.
    async fn delete_by_prefix(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<String>, GatewayError>;
}

/// In-process store for tests: a set of `bucket/key` entries.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<BTreeSet<(String, String)>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, key: &str) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert((bucket.to_string(), key.to_string()));
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().map(|objects| objects.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn delete_by_prefix(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<String>, GatewayError> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| GatewayError::Upstream("object store state poisoned".to_string()))?;

        let deleted: Vec<String> = objects
            .iter()
            .filter(|(object_bucket, key)| object_bucket == bucket && key.starts_with(prefix))
            .map(|(_, key)| key.clone())
            .collect();

        for key in &deleted {
            objects.remove(&(bucket.to_string(), key.clone()));
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryObjectStore, ObjectStore};

    #[tokio::test]
    async fn prefix_deletion_spares_other_tenants_and_buckets() {
        let store = InMemoryObjectStore::new();
        store.put("uploads", "100/voice-1.ogg");
        store.put("uploads", "100/voice-2.ogg");
        store.put("uploads", "200/voice-1.ogg");
        store.put("exports", "100/report.pdf");

        let deleted = store.delete_by_prefix("uploads", "100/").await.expect("delete");
        assert_eq!(deleted.len(), 2);
        assert_eq!(store.object_count(), 2);

        let nothing = store.delete_by_prefix("uploads", "100/").await.expect("delete again");
        assert!(nothing.is_empty());
    }
}
