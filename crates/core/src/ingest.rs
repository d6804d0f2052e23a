use crate::chunking::chunk_text;
use crate::embeddings::Embedder;
use crate::error::{BackendError, IngestError};
use crate::models::{
    Chunk, ChunkPayload, IngestionOptions, IngestionReport, PointRecord, SkippedSource,
};
use crate::traits::VectorStore;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Chunks raw text sources, embeds the chunks in one batched call, and
/// upserts tenant-tagged points in one durable write.
///
/// Re-running ingestion mints fresh point identifiers and therefore
/// duplicates content; deduplication is the operator's concern, aided by the
/// source checksums logged at the file layer.
pub struct IngestionPipeline<E, S>
where
    E: Embedder,
    S: VectorStore,
{
    embedder: E,
    store: S,
    collection: String,
    options: IngestionOptions,
}

impl<E, S> IngestionPipeline<E, S>
where
    E: Embedder,
    S: VectorStore,
{
    pub fn new(
        embedder: E,
        store: S,
        collection: impl Into<String>,
        options: IngestionOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            collection: collection.into(),
            options,
        }
    }

    pub async fn ingest(
        &self,
        sources: &[String],
        tenant: &str,
    ) -> Result<IngestionReport, IngestError> {
        if tenant.trim().is_empty() {
            return Err(IngestError::InvalidArgument(
                "tenant must not be empty".to_string(),
            ));
        }

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut skipped = Vec::new();

        for (source_index, source) in sources.iter().enumerate() {
            if source.trim().is_empty() {
                skipped.push(SkippedSource {
                    label: format!("source[{source_index}]"),
                    reason: "no extractable text".to_string(),
                });
                continue;
            }

            let pieces = chunk_text(source, &self.options, &self.embedder)?;
            if pieces.is_empty() {
                skipped.push(SkippedSource {
                    label: format!("source[{source_index}]"),
                    reason: "no extractable text".to_string(),
                });
                continue;
            }

            for (sequence_index, text) in pieces.into_iter().enumerate() {
                chunks.push(Chunk {
                    text,
                    sequence_index,
                    tenant: tenant.to_string(),
                });
            }
        }

        // nothing to embed: report zero without touching the backends
        if chunks.is_empty() {
            return Ok(IngestionReport {
                inserted: 0,
                skipped,
                completed_at: Utc::now(),
            });
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();

        let embed_start = Instant::now();
        let vectors = self.embedder.encode(&texts).await?;
        debug!(
            chunk_count = chunks.len(),
            elapsed_ms = embed_start.elapsed().as_millis() as u64,
            "embedded chunk batch"
        );

        if vectors.len() != chunks.len() {
            return Err(BackendError::BackendResponse {
                backend: "embedder".to_string(),
                details: format!(
                    "embedding count {} does not match chunk count {}",
                    vectors.len(),
                    chunks.len()
                ),
            }
            .into());
        }

        let points: Vec<PointRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| PointRecord {
                id: Uuid::new_v4(),
                vector,
                payload: ChunkPayload {
                    tenant: chunk.tenant,
                    chunk_sequence: chunk.sequence_index,
                    text: chunk.text,
                },
            })
            .collect();

        self.store.upsert(&self.collection, &points, true).await?;

        info!(
            inserted = points.len(),
            tenant,
            collection = %self.collection,
            "ingested chunk batch"
        );

        Ok(IngestionReport {
            inserted: points.len(),
            skipped,
            completed_at: Utc::now(),
        })
    }
}

/// Sha256 of a file's bytes, hex-encoded. Logged per ingested file so
/// operators can spot re-ingested (and therefore duplicated) sources.
pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::TokenCounter;
    use crate::error::BackendError;
    use crate::models::{DistanceMetric, ScoredPoint};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CountingEmbedder {
        encode_calls: AtomicUsize,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                encode_calls: AtomicUsize::new(0),
            }
        }
    }

    impl TokenCounter for CountingEmbedder {
        fn count_tokens(&self, text: &str) -> Result<usize, IngestError> {
            Ok(text.split_whitespace().count())
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn dimensions(&self) -> usize {
            4
        }

        async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
            self.encode_calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|text| vec![text.len() as f32; 4]).collect())
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        upserts: Mutex<Vec<(String, Vec<PointRecord>, bool)>>,
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        async fn list_collections(&self) -> Result<Vec<String>, BackendError> {
            Ok(Vec::new())
        }

        async fn create_collection(
            &self,
            _name: &str,
            _dim: usize,
            _metric: DistanceMetric,
        ) -> Result<(), BackendError> {
            Ok(())
        }

        async fn upsert(
            &self,
            collection: &str,
            points: &[PointRecord],
            wait: bool,
        ) -> Result<(), BackendError> {
            self.upserts
                .lock()
                .unwrap()
                .push((collection.to_string(), points.to_vec(), wait));
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
    async fn empty_sources_skip_embedder_and_store() {
        let pipeline = IngestionPipeline::new(
            CountingEmbedder::new(),
            RecordingStore::default(),
            "docs",
            IngestionOptions::default(),
        );

        let report = pipeline
            .ingest(&["".to_string(), "   ".to_string()], "demo")
            .await
            .unwrap();

        assert_eq!(report.inserted, 0);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(
            pipeline.embedder.encode_calls.load(Ordering::SeqCst),
            0,
            "embedder must not run for empty input"
        );
        assert!(pipeline.store.upserts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn chunks_become_tenant_tagged_points_in_one_batch() {
        let pipeline = IngestionPipeline::new(
            CountingEmbedder::new(),
            RecordingStore::default(),
            "docs",
            IngestionOptions {
                target_tokens: 4,
                overlap_sentences: 0,
            },
        );

        let sources = vec![
            "alpha beta gamma. delta epsilon zeta.".to_string(),
            "eta theta.".to_string(),
        ];
        let report = pipeline.ingest(&sources, "acme").await.unwrap();

        assert_eq!(report.inserted, 3);
        assert!(report.skipped.is_empty());
        assert_eq!(pipeline.embedder.encode_calls.load(Ordering::SeqCst), 1);

        let upserts = pipeline.store.upserts.lock().unwrap();
        assert_eq!(upserts.len(), 1, "points go to the store in one write");
        let (collection, points, wait) = &upserts[0];
        assert_eq!(collection, "docs");
        assert!(wait, "durability must be acknowledged before returning");

        assert!(points.iter().all(|point| point.payload.tenant == "acme"));
        // chunk sequence restarts per source
        assert_eq!(points[0].payload.chunk_sequence, 0);
        assert_eq!(points[1].payload.chunk_sequence, 1);
        assert_eq!(points[2].payload.chunk_sequence, 0);
        assert_eq!(points[2].payload.text, "eta theta.");

        let mut ids: Vec<_> = points.iter().map(|point| point.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), points.len(), "point ids are unique");
    }

    #[tokio::test]
    async fn blank_tenant_is_rejected() {
        let pipeline = IngestionPipeline::new(
            CountingEmbedder::new(),
            RecordingStore::default(),
            "docs",
            IngestionOptions::default(),
        );

        let result = pipeline.ingest(&["text.".to_string()], "  ").await;
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
    }

    #[test]
    fn checksum_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let file_path = dir.path().join("a.txt");
        fs::write(&file_path, b"abc")?;

        let first = digest_file(&file_path)?;
        let second = digest_file(&file_path)?;
        assert_eq!(first, second);
        Ok(())
    }
}
