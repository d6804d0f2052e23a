pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod models;
pub mod retrieval;
pub mod stores;
pub mod traits;

pub use chunking::{chunk_text, split_sentences};
pub use embeddings::{
    approximate_token_count, Embedder, HashEmbedder, OllamaEmbedder, TokenCounter,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{BackendError, GenerationError, IngestError, RetrievalError};
pub use extractor::{discover_document_files, DocumentParser, FileParser};
pub use generation::{
    build_prompt, GenerationBackend, GenerationEvent, GenerationOrchestrator, OllamaGenerator,
};
pub use index::ensure_collection;
pub use ingest::{digest_file, IngestionPipeline};
pub use models::{
    Chunk, ChunkPayload, DistanceMetric, IngestionOptions, IngestionReport, PointRecord,
    RetrievalContext, RetrievalTimings, RetrievedChunk, ScoredPoint, SkippedSource,
};
pub use retrieval::{RetrievalService, DEFAULT_TOP_K};
pub use stores::QdrantStore;
pub use traits::VectorStore;
