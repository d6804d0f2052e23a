use crate::error::BackendError;
use crate::models::{DistanceMetric, PointRecord, ScoredPoint};
use async_trait::async_trait;

/// Vector store adapter. Implementations must be safe to share across
/// concurrent requests; ingestion and retrieval may run against the same
/// collection at once.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<String>, BackendError>;

    async fn create_collection(
        &self,
        name: &str,
        dim: usize,
        metric: DistanceMetric,
    ) -> Result<(), BackendError>;

    /// Batched write. With `wait` set, returns only after the store has
    /// acknowledged durability.
    async fn upsert(
        &self,
        collection: &str,
        points: &[PointRecord],
        wait: bool,
    ) -> Result<(), BackendError>;

    /// Similarity search restricted to points whose payload tenant equals
    /// `tenant`. The tenant filter is the sole isolation mechanism between
    /// tenants, so it is part of the signature rather than an optional
    /// argument.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        tenant: &str,
        limit: usize,
        with_payload: bool,
    ) -> Result<Vec<ScoredPoint>, BackendError>;
}
