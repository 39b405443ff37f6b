use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChunk {
    pub id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_num: Option<u32>,
    pub start_word: usize,
    pub end_word: usize,
    pub word_count: usize,
    /// Recomputed per query, zero in the stored index.
    pub relevance_score: u32,
    /// Query terms found in this chunk, recomputed per query.
    pub matches: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentIndex {
    pub document_id: String,
    pub document_name: String,
    pub chunks: Vec<DocumentChunk>,
    pub total_words: usize,
    pub total_pages: u32,
    pub indexed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_warning: Option<String>,
    /// The chunk cap cut this document short; coverage is partial.
    pub truncated: bool,
}

impl DocumentIndex {
    pub fn content_chars(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.content.len()).sum()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            document_id: self.document_id.clone(),
            total_chunks: self.chunks.len(),
            total_words: self.total_words,
            total_pages: self.total_pages,
            indexed_at: self.indexed_at,
            warning: self.extraction_warning.clone(),
            truncated: self.truncated,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub document_id: String,
    pub document_name: String,
    pub total_relevance_score: u32,
    pub chunks: Vec<DocumentChunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceType {
    Documents,
    Web,
    Mixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceBundle {
    pub document_sources: Vec<SearchResult>,
    pub web_sources: Vec<WebResult>,
    pub evidence_type: EvidenceType,
    pub confidence: f64,
    pub no_doc_evidence: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingRequest {
    pub file_path: String,
    pub document_id: String,
    pub document_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub document_id: String,
    pub total_chunks: usize,
    pub total_words: usize,
    pub total_pages: u32,
    pub indexed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total_documents: usize,
    pub total_chunks: usize,
    pub total_words: usize,
    pub processing_queue_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemError {
    pub document_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub results: Vec<IndexStats>,
    pub errors: Vec<BatchItemError>,
    pub summary: BatchSummary,
}

#[derive(Debug, Clone)]
pub struct IndexingOptions {
    pub chunk_size_words: usize,
    pub overlap_words: usize,
    /// Token budget per chunk, approximated as chars / 4.
    pub max_tokens_per_chunk: usize,
    pub max_chunks_per_document: usize,
    pub chunks_per_page: usize,
    pub min_content_chars: usize,
    pub extraction_timeout: Duration,
    pub batch_concurrency: usize,
    pub batch_delay: Duration,
    /// Remove the source upload after extraction (success or failure).
    pub cleanup_source: bool,
}

impl Default for IndexingOptions {
    fn default() -> Self {
        Self {
            chunk_size_words: 500,
            overlap_words: 50,
            max_tokens_per_chunk: 800,
            max_chunks_per_document: 1_000,
            chunks_per_page: 3,
            min_content_chars: 10,
            extraction_timeout: Duration::from_secs(30),
            batch_concurrency: 3,
            batch_delay: Duration::from_millis(150),
            cleanup_source: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchTuning {
    pub probe_timeout: Duration,
    pub search_timeout: Duration,
    /// Budget for long chunk-by-chunk document scoring in the enhanced tier.
    pub document_timeout: Duration,
    /// A document whose stored chunk text exceeds this many chars is routed
    /// through the background scoring pool.
    pub large_document_chars: usize,
    pub worker_failure_budget: u32,
    pub top_documents: usize,
    pub top_chunks: usize,
}

impl Default for SearchTuning {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            search_timeout: Duration::from_secs(10),
            document_timeout: Duration::from_secs(30),
            large_document_chars: 100_000,
            worker_failure_budget: 3,
            top_documents: 5,
            top_chunks: 5,
        }
    }
}
