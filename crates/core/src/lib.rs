pub mod chunking;
pub mod error;
pub mod evidence;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod remote;
pub mod scoring;
pub mod store;
pub mod traits;
pub mod worker;

pub use chunking::{chunk_text, count_words, ChunkingOutcome};
pub use error::{IngestError, SearchError};
pub use evidence::{assemble, web_search_role, WebSearchRole};
pub use extractor::{extract_document, is_supported_extension, ExtractedContent};
pub use ingest::discover_documents;
pub use models::{
    BatchOutcome, DocumentChunk, DocumentIndex, EvidenceBundle, EvidenceType, IndexStats,
    IndexingOptions, MemoryStats, ProcessingRequest, SearchResult, SearchTuning, WebResult,
};
pub use orchestrator::SearchOrchestrator;
pub use remote::HttpRemoteIndex;
pub use store::DocumentStore;
pub use traits::{
    AnswerGenerator, DisabledWebSearch, ExtractiveAnswerer, RemoteIndex, WebSearcher,
};
pub use worker::ScoringPool;
