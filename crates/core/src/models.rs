use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// A bounded span of source text sized for embedding, produced by the chunker
/// and owned by the ingestion pipeline until it is handed to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub sequence_index: usize,
    pub tenant: String,
}

/// Payload persisted alongside each point. The `tenant` field is the sole
/// isolation mechanism between tenants; every search filters on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub tenant: String,
    pub chunk_sequence: usize,
    pub text: String,
}

/// One embedded chunk ready for upsert. `vector` must match the collection's
/// configured dimensionality; the store adapter rejects mismatches.
#[derive(Debug, Clone, Serialize)]
pub struct PointRecord {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    Cosine,
    Dot,
    Euclid,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "Cosine",
            DistanceMetric::Dot => "Dot",
            DistanceMetric::Euclid => "Euclid",
        }
    }
}

/// A similarity-search hit as returned by the vector store, ordered by
/// descending score.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f64,
    pub payload: Option<ChunkPayload>,
}

#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub id: String,
    pub score: f64,
    pub text: String,
}

/// Per-phase latency of one retrieval request. Embedding and search are the
/// two external calls whose latency varies independently.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrievalTimings {
    pub embed: Duration,
    pub search: Duration,
    pub total: Duration,
}

/// Ordered retrieved chunks for exactly one tenant, constructed per query and
/// discarded after the answer is generated.
#[derive(Debug, Clone)]
pub struct RetrievalContext {
    pub tenant: String,
    pub hits: Vec<RetrievedChunk>,
    pub timings: RetrievalTimings,
}

impl RetrievalContext {
    /// Hit texts joined by a blank line, best match first. Empty when the
    /// search returned no hits; callers must treat that as a contextless
    /// prompt, not a failure.
    pub fn context_text(&self) -> String {
        self.hits
            .iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IngestionOptions {
    /// Token budget per chunk; a single sentence over budget is still
    /// emitted whole.
    pub target_tokens: usize,
    /// Sentences carried from the end of one chunk into the next.
    pub overlap_sentences: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            target_tokens: 400,
            overlap_sentences: 2,
        }
    }
}

#[derive(Debug)]
pub struct SkippedSource {
    pub label: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct IngestionReport {
    pub inserted: usize,
    pub skipped: Vec<SkippedSource>,
    pub completed_at: DateTime<Utc>,
}
