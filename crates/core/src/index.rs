use crate::error::BackendError;
use crate::models::DistanceMetric;
use crate::traits::VectorStore;
use tracing::{debug, info};

/// Creates the collection if it does not exist; a no-op otherwise. Safe to
/// call repeatedly and concurrently: the store treats creation of an
/// already-existing collection as success, not a conflict.
///
/// An existing collection's dimensionality is not re-inspected here; the
/// store adapter is constructed with the expected dimensionality and rejects
/// mismatched vectors on every upsert and search.
pub async fn ensure_collection<S>(
    store: &S,
    name: &str,
    dim: usize,
    metric: DistanceMetric,
) -> Result<(), BackendError>
where
    S: VectorStore + ?Sized,
{
    let existing = store.list_collections().await?;

    if existing.iter().any(|collection| collection == name) {
        debug!(collection = name, "collection already exists");
        return Ok(());
    }

    store.create_collection(name, dim, metric).await?;
    info!(collection = name, dim, metric = metric.as_str(), "created collection");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PointRecord, ScoredPoint};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        collections: Mutex<Vec<String>>,
        creates: AtomicUsize,
    }

    #[async_trait]
    impl VectorStore for FakeStore {
        async fn list_collections(&self) -> Result<Vec<String>, BackendError> {
            Ok(self.collections.lock().unwrap().clone())
        }

        async fn create_collection(
            &self,
            name: &str,
            _dim: usize,
            _metric: DistanceMetric,
        ) -> Result<(), BackendError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.collections.lock().unwrap().push(name.to_string());
            Ok(())
        }

        async fn upsert(
            &self,
            _collection: &str,
            _points: &[PointRecord],
            _wait: bool,
        ) -> Result<(), BackendError> {
            Ok(())
        }

        async fn search(
            &self,
            _collection: &str,
            _vector: &[f32],
            _tenant: &str,
            _limit: usize,
            _with_payload: bool,
        ) -> Result<Vec<ScoredPoint>, BackendError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn ensure_collection_is_idempotent() {
        let store = FakeStore::default();

        ensure_collection(&store, "tenant_docs_v1", 384, DistanceMetric::Cosine)
            .await
            .unwrap();
        ensure_collection(&store, "tenant_docs_v1", 384, DistanceMetric::Cosine)
            .await
            .unwrap();

        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.collections.lock().unwrap().as_slice(),
            ["tenant_docs_v1"]
        );
    }
}
