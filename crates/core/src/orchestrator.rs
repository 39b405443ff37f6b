use crate::error::SearchError;
use crate::models::{DocumentIndex, SearchResult, SearchTuning};
use crate::scoring;
use crate::store::DocumentStore;
use crate::traits::RemoteIndex;
use crate::worker::ScoringPool;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Routes a query through the search tiers in order of preference:
/// remote index, background scoring pool for large documents, then plain
/// in-process scoring. Each tier is bounded by its own timeout and any
/// failure falls through to the next; only when every tier has failed does
/// the caller see an error.
pub struct SearchOrchestrator<R> {
    store: Arc<DocumentStore>,
    remote: Option<R>,
    pool: ScoringPool,
    tuning: SearchTuning,
}

impl<R: RemoteIndex + Send + Sync> SearchOrchestrator<R> {
    pub fn new(store: Arc<DocumentStore>, remote: Option<R>, tuning: SearchTuning) -> Self {
        let pool = ScoringPool::new(tuning.worker_failure_budget);
        Self {
            store,
            remote,
            pool,
            tuning,
        }
    }

    pub fn tuning(&self) -> &SearchTuning {
        &self.tuning
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Re-arms the background scoring tier after its failure budget was
    /// spent. Safe to call at any time.
    pub fn reset_worker_circuit(&self) {
        self.pool.reset();
    }

    pub async fn search(
        &self,
        query: &str,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::Request("query is empty".to_string()));
        }

        if let Some(remote) = &self.remote {
            match self.remote_tier(remote, query, document_ids).await {
                Ok(results) => return Ok(results),
                Err(error) => warn!(%error, "remote index tier failed, falling back"),
            }
        }

        let candidates = self.store.snapshot(document_ids).await;

        match self.enhanced_tier(&candidates, query).await {
            Ok(Some(results)) => return Ok(results),
            Ok(None) => {}
            Err(error) => warn!(%error, "enhanced scoring tier failed, falling back"),
        }

        match self.basic_tier(&candidates, query).await {
            Ok(results) => Ok(results),
            Err(error) => {
                warn!(%error, "basic scoring tier failed");
                Err(SearchError::Unavailable(
                    "all search tiers exhausted".to_string(),
                ))
            }
        }
    }

    async fn remote_tier(
        &self,
        remote: &R,
        query: &str,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        timeout(self.tuning.probe_timeout, remote.ping())
            .await
            .map_err(|_| {
                SearchError::BackendUnavailable("health probe timed out".to_string())
            })??;

        let results = timeout(
            self.tuning.search_timeout,
            remote.search(query, document_ids),
        )
        .await
        .map_err(|_| SearchError::Timeout(self.tuning.search_timeout))??;

        Ok(self.rank(results).await)
    }

    /// Scores document by document on the background pool, with progress
    /// logged per batch. Returns `Ok(None)` when no candidate is large
    /// enough to justify the pool; small corpora go straight to the basic
    /// tier.
    async fn enhanced_tier(
        &self,
        candidates: &[Arc<DocumentIndex>],
        query: &str,
    ) -> Result<Option<Vec<SearchResult>>, SearchError> {
        let any_large = candidates
            .iter()
            .any(|index| index.content_chars() > self.tuning.large_document_chars);
        if !any_large {
            return Ok(None);
        }
        if !self.pool.is_available() {
            return Err(SearchError::WorkerCircuitOpen);
        }

        let scored = timeout(self.tuning.document_timeout, async {
            let mut results = Vec::new();
            for index in candidates {
                let document_id = index.document_id.clone();
                let scored = self
                    .pool
                    .score_document(index, query, self.tuning.top_chunks, |percent| {
                        debug!(document = %document_id, percent, "scoring progress");
                    })
                    .await?;
                if let Some(result) = scored {
                    results.push(result);
                }
            }
            Ok::<_, SearchError>(results)
        })
        .await
        .map_err(|_| SearchError::Timeout(self.tuning.document_timeout))??;

        Ok(Some(self.rank(scored).await))
    }

    async fn basic_tier(
        &self,
        candidates: &[Arc<DocumentIndex>],
        query: &str,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let results = timeout(self.tuning.search_timeout, async {
            let mut hits = Vec::new();
            for index in candidates {
                if let Some(hit) = scoring::score_document(index, query, self.tuning.top_chunks) {
                    hits.push(hit);
                }
                // Yield after each document so the budget is checked
                // between them instead of only once the loop is done.
                tokio::task::yield_now().await;
            }
            hits
        })
        .await
        .map_err(|_| SearchError::Timeout(self.tuning.search_timeout))?;

        Ok(self.rank(results).await)
    }

    /// The one ranking rule every tier goes through: per document, chunks
    /// by score descending then position; across documents, total score
    /// descending, most recently indexed first, then id. Both lists are
    /// capped by the tuning.
    async fn rank(&self, mut results: Vec<SearchResult>) -> Vec<SearchResult> {
        let indexed_at: HashMap<String, DateTime<Utc>> = self
            .store
            .snapshot(None)
            .await
            .into_iter()
            .map(|index| (index.document_id.clone(), index.indexed_at))
            .collect();

        for result in &mut results {
            result
                .chunks
                .sort_by(|left, right| {
                    right
                        .relevance_score
                        .cmp(&left.relevance_score)
                        .then(left.start_word.cmp(&right.start_word))
                });
            result.chunks.truncate(self.tuning.top_chunks);
        }

        results.sort_by(|left, right| {
            let left_time = indexed_at
                .get(&left.document_id)
                .copied()
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            let right_time = indexed_at
                .get(&right.document_id)
                .copied()
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            right
                .total_relevance_score
                .cmp(&left.total_relevance_score)
                .then(right_time.cmp(&left_time))
                .then(left.document_id.cmp(&right.document_id))
        });
        results.truncate(self.tuning.top_documents);
        results
    }
}
