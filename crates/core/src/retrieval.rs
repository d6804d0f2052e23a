use crate::embeddings::Embedder;
use crate::error::{BackendError, RetrievalError};
use crate::models::{RetrievalContext, RetrievalTimings, RetrievedChunk};
use crate::traits::VectorStore;
use std::time::Instant;
use tracing::debug;

pub const DEFAULT_TOP_K: usize = 8;

/// Embeds a query and runs a tenant-filtered similarity search, assembling
/// the hits into a context for generation. Embedding and search are timed
/// separately; they are the two external calls whose latency must be
/// diagnosable independently in production.
pub struct RetrievalService<E, S>
where
    E: Embedder,
    S: VectorStore,
{
    embedder: E,
    store: S,
    collection: String,
}

impl<E, S> RetrievalService<E, S>
where
    E: Embedder,
    S: VectorStore,
{
    pub fn new(embedder: E, store: S, collection: impl Into<String>) -> Self {
        Self {
            embedder,
            store,
            collection: collection.into(),
        }
    }

    pub async fn retrieve(
        &self,
        query: &str,
        tenant: &str,
        top_k: usize,
    ) -> Result<RetrievalContext, RetrievalError> {
        if query.trim().is_empty() {
            return Err(RetrievalError::InvalidArgument(
                "query is empty".to_string(),
            ));
        }
        if tenant.trim().is_empty() {
            return Err(RetrievalError::InvalidArgument(
                "tenant must not be empty".to_string(),
            ));
        }
        if top_k == 0 {
            return Err(RetrievalError::InvalidArgument(
                "top_k must be a positive integer".to_string(),
            ));
        }

        let total_start = Instant::now();

        let embed_start = Instant::now();
        let query_texts = vec![query.to_string()];
        let mut vectors = self.embedder.encode(&query_texts).await?;
        let query_vector = vectors.pop().ok_or_else(|| BackendError::BackendResponse {
            backend: "embedder".to_string(),
            details: "no embedding returned for query".to_string(),
        })?;
        let embed = embed_start.elapsed();
        debug!(elapsed_ms = embed.as_millis() as u64, "embedded query");

        let search_start = Instant::now();
        let hits = self
            .store
            .search(&self.collection, &query_vector, tenant, top_k, true)
            .await?;
        let search = search_start.elapsed();
        debug!(
            elapsed_ms = search.as_millis() as u64,
            hit_count = hits.len(),
            tenant,
            "vector search complete"
        );

        // hits arrive ranked by descending score; keep that order
        let hits: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter_map(|point| {
                point.payload.map(|payload| RetrievedChunk {
                    id: point.id,
                    score: point.score,
                    text: payload.text,
                })
            })
            .collect();

        let timings = RetrievalTimings {
            embed,
            search,
            total: total_start.elapsed(),
        };

        debug!(
            tenant,
            hit_count = hits.len(),
            total_ms = timings.total.as_millis() as u64,
            "retrieval complete"
        );

        Ok(RetrievalContext {
            tenant: tenant.to_string(),
            hits,
            timings,
        })
    }
}
