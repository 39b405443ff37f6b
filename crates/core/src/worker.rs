use crate::error::SearchError;
use crate::models::{DocumentChunk, DocumentIndex, SearchResult};
use crate::scoring;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Chunks scored per background task.
const CHUNK_BATCH: usize = 32;

/// Background scoring executor for the enhanced local tier.
///
/// Large-document chunk scoring is offloaded to blocking worker threads in
/// batches so the caller's task never stalls, with percentage progress
/// reported between batches. Repeated background failures trip a circuit
/// breaker that keeps the tier disabled until `reset` is called.
pub struct ScoringPool {
    failure_count: AtomicU32,
    failure_budget: u32,
}

impl ScoringPool {
    pub fn new(failure_budget: u32) -> Self {
        Self {
            failure_count: AtomicU32::new(0),
            failure_budget,
        }
    }

    pub fn is_available(&self) -> bool {
        self.failure_count.load(Ordering::Relaxed) < self.failure_budget
    }

    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Closes the breaker again. Idempotent, safe to call speculatively.
    pub fn reset(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
    }

    /// Scores one document chunk-by-chunk on the blocking pool. `progress`
    /// is called with 0..=100 as batches complete.
    pub async fn score_document<F>(
        &self,
        index: &Arc<DocumentIndex>,
        query: &str,
        top_chunks: usize,
        progress: F,
    ) -> Result<Option<SearchResult>, SearchError>
    where
        F: Fn(u8),
    {
        if !self.is_available() {
            return Err(SearchError::WorkerCircuitOpen);
        }

        let total_chunks = index.chunks.len();
        if total_chunks == 0 {
            progress(100);
            return Ok(None);
        }

        let batch_count = total_chunks.div_ceil(CHUNK_BATCH);
        let mut scored: Vec<DocumentChunk> = Vec::new();

        for (batch_no, batch_start) in (0..total_chunks).step_by(CHUNK_BATCH).enumerate() {
            let batch_end = (batch_start + CHUNK_BATCH).min(total_chunks);
            let shared = Arc::clone(index);
            let query = query.to_string();

            let task = tokio::task::spawn_blocking(move || {
                let mut hits = Vec::new();
                for chunk in &shared.chunks[batch_start..batch_end] {
                    let result = scoring::score_text(&chunk.content, &query);
                    if result.is_relevant() {
                        let mut hit = chunk.clone();
                        hit.relevance_score = result.score;
                        hit.matches = result.matches;
                        hits.push(hit);
                    }
                }
                hits
            });

            match task.await {
                Ok(hits) => scored.extend(hits),
                Err(join_error) => {
                    self.record_failure();
                    return Err(SearchError::Request(format!(
                        "background scoring task failed: {join_error}"
                    )));
                }
            }

            progress(((batch_no + 1) * 100 / batch_count) as u8);
        }

        Ok(scoring::assemble_result(index, scored, top_chunks))
    }
}
