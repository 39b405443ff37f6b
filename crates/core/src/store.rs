use crate::chunking::{self, count_words};
use crate::error::IngestError;
use crate::extractor;
use crate::models::{
    BatchItemError, BatchOutcome, BatchSummary, DocumentIndex, IndexStats, IndexingOptions,
    MemoryStats, ProcessingRequest,
};
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinSet;
use tracing::{info, warn};

type SharedOutcome = watch::Receiver<Option<Result<IndexStats, String>>>;

/// In-memory document index plus the in-flight processing queue.
///
/// Writes replace the whole per-document entry atomically; concurrent
/// processing calls for the same document id are coalesced onto one
/// extraction run through the queue.
pub struct DocumentStore {
    options: IndexingOptions,
    documents: RwLock<HashMap<String, Arc<DocumentIndex>>>,
    queue: Mutex<HashMap<String, SharedOutcome>>,
    pipeline_runs: AtomicU64,
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new(IndexingOptions::default())
    }
}

impl DocumentStore {
    pub fn new(options: IndexingOptions) -> Self {
        Self {
            options,
            documents: RwLock::new(HashMap::new()),
            queue: Mutex::new(HashMap::new()),
            pipeline_runs: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &IndexingOptions {
        &self.options
    }

    /// Extraction runs started so far; coalesced callers do not add to it.
    pub fn processing_runs(&self) -> u64 {
        self.pipeline_runs.load(Ordering::Relaxed)
    }

    fn lock_queue(&self) -> MutexGuard<'_, HashMap<String, SharedOutcome>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs extract → validate → chunk → index for one document. A call for
    /// an id that is already in flight awaits the shared outcome instead of
    /// extracting twice; the queue entry is removed on completion so later
    /// retries start fresh.
    pub async fn process_document(
        &self,
        request: &ProcessingRequest,
    ) -> Result<IndexStats, IngestError> {
        let claimed = {
            let mut queue = self.lock_queue();
            if let Some(shared) = queue.get(&request.document_id) {
                Err(shared.clone())
            } else {
                let (sender, receiver) = watch::channel(None);
                queue.insert(request.document_id.clone(), receiver);
                Ok(sender)
            }
        };
        let sender = match claimed {
            Ok(sender) => sender,
            Err(shared) => return await_shared(shared).await,
        };
        // The slot outlives the pipeline await: a caller dropped mid-flight
        // still releases the entry, and dropping `sender` wakes coalesced
        // waiters with a closed channel so their retries start fresh.
        let slot = QueueSlot {
            store: self,
            document_id: &request.document_id,
        };

        let outcome = self.run_pipeline(request).await;

        let shared = match &outcome {
            Ok(stats) => Ok(stats.clone()),
            Err(error) => Err(error.to_string()),
        };
        let _ = sender.send(Some(shared));
        drop(slot);

        outcome
    }

    async fn run_pipeline(&self, request: &ProcessingRequest) -> Result<IndexStats, IngestError> {
        self.pipeline_runs.fetch_add(1, Ordering::Relaxed);

        let path = Path::new(&request.file_path);
        let extracted =
            extractor::extract_document(path, &request.document_name, &self.options).await;

        if self.options.cleanup_source {
            if let Err(error) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), %error, "failed to remove source upload");
            }
        }

        let extracted = extracted?;
        let outcome = chunking::chunk_text(&request.document_id, &extracted.text, &self.options)?;
        if outcome.truncated {
            warn!(
                document = %request.document_id,
                chunk_cap = self.options.max_chunks_per_document,
                "document truncated at chunk cap, coverage is partial"
            );
        }

        let total_pages = extracted.page_count.unwrap_or_else(|| {
            outcome
                .chunks
                .len()
                .div_ceil(self.options.chunks_per_page.max(1)) as u32
        });

        let index = DocumentIndex {
            document_id: request.document_id.clone(),
            document_name: request.document_name.clone(),
            total_words: count_words(&extracted.text),
            total_pages,
            chunks: outcome.chunks,
            indexed_at: Utc::now(),
            extraction_warning: extracted.warning,
            truncated: outcome.truncated,
        };
        let stats = index.stats();

        self.documents
            .write()
            .await
            .insert(request.document_id.clone(), Arc::new(index));
        info!(
            document = %request.document_id,
            chunks = stats.total_chunks,
            words = stats.total_words,
            "document indexed"
        );

        Ok(stats)
    }

    /// Processes many documents with a bounded number in flight at a time
    /// and a short pause between batches, collecting per-item errors.
    pub async fn process_batch(self: &Arc<Self>, requests: Vec<ProcessingRequest>) -> BatchOutcome {
        let total = requests.len();
        let concurrency = self.options.batch_concurrency.max(1);
        let batch_count = total.div_ceil(concurrency);

        let mut results = Vec::new();
        let mut errors = Vec::new();

        for (batch_no, batch) in requests.chunks(concurrency).enumerate() {
            let mut tasks = JoinSet::new();
            for request in batch.to_vec() {
                let store = Arc::clone(self);
                tasks.spawn(async move {
                    let outcome = store.process_document(&request).await;
                    (request.document_id, outcome)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((_, Ok(stats))) => results.push(stats),
                    Ok((document_id, Err(error))) => errors.push(BatchItemError {
                        document_id,
                        error: error.to_string(),
                    }),
                    Err(join_error) => errors.push(BatchItemError {
                        document_id: String::new(),
                        error: join_error.to_string(),
                    }),
                }
            }

            if batch_no + 1 < batch_count && !self.options.batch_delay.is_zero() {
                tokio::time::sleep(self.options.batch_delay).await;
            }
        }

        results.sort_by(|left, right| left.document_id.cmp(&right.document_id));
        errors.sort_by(|left, right| left.document_id.cmp(&right.document_id));

        BatchOutcome {
            summary: BatchSummary {
                total,
                successful: results.len(),
                failed: errors.len(),
            },
            results,
            errors,
        }
    }

    pub async fn get(&self, document_id: &str) -> Option<Arc<DocumentIndex>> {
        self.documents.read().await.get(document_id).cloned()
    }

    pub async fn stats(&self, document_id: &str) -> Option<IndexStats> {
        self.get(document_id).await.map(|index| index.stats())
    }

    /// All indexed documents, or the subset named by `document_ids`.
    pub async fn snapshot(&self, document_ids: Option<&[String]>) -> Vec<Arc<DocumentIndex>> {
        let documents = self.documents.read().await;
        match document_ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| documents.get(id).cloned())
                .collect(),
            None => documents.values().cloned().collect(),
        }
    }

    /// Evicts a document. Idempotent: clearing an unknown id returns false.
    pub async fn clear(&self, document_id: &str) -> bool {
        self.documents.write().await.remove(document_id).is_some()
    }

    pub async fn memory_stats(&self) -> MemoryStats {
        let documents = self.documents.read().await;
        let total_chunks = documents.values().map(|index| index.chunks.len()).sum();
        let total_words = documents.values().map(|index| index.total_words).sum();
        MemoryStats {
            total_documents: documents.len(),
            total_chunks,
            total_words,
            processing_queue_size: self.lock_queue().len(),
        }
    }
}

/// Removes the in-flight queue entry when processing ends, whether the
/// pipeline ran to completion or the caller's future was dropped.
struct QueueSlot<'a> {
    store: &'a DocumentStore,
    document_id: &'a str,
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.store.lock_queue().remove(self.document_id);
    }
}

async fn await_shared(mut shared: SharedOutcome) -> Result<IndexStats, IngestError> {
    let value = shared
        .wait_for(|outcome| outcome.is_some())
        .await
        .map_err(|_| IngestError::ProcessingFailed("processing task dropped".to_string()))?;

    match &*value {
        Some(Ok(stats)) => Ok(stats.clone()),
        Some(Err(message)) => Err(IngestError::ProcessingFailed(message.clone())),
        None => Err(IngestError::ProcessingFailed(
            "processing outcome missing".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn request(path: &Path, id: &str, name: &str) -> ProcessingRequest {
        ProcessingRequest {
            file_path: path.to_string_lossy().to_string(),
            document_id: id.to_string(),
            document_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn processing_indexes_a_text_document() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "Mount Mandara is a sacred summit near the valley.")
            .expect("write");

        let store = DocumentStore::default();
        let stats = store
            .process_document(&request(&path, "doc-1", "report.txt"))
            .await
            .expect("processing should succeed");

        assert_eq!(stats.document_id, "doc-1");
        assert_eq!(stats.total_words, 9);
        assert_eq!(stats.total_chunks, 1);
        assert_eq!(stats.total_pages, 1);
        assert!(stats.warning.is_none());
    }

    #[tokio::test]
    async fn reprocessing_unchanged_content_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "alpha beta gamma delta epsilon zeta eta theta").expect("write");

        let store = DocumentStore::default();
        let req = request(&path, "doc-1", "report.txt");
        let first = store.process_document(&req).await.expect("first run");
        let second = store.process_document(&req).await.expect("second run");

        assert_eq!(first.total_words, second.total_words);
        assert_eq!(first.total_chunks, second.total_chunks);
        assert_eq!(store.memory_stats().await.total_documents, 1);
    }

    #[tokio::test]
    async fn concurrent_processing_for_one_id_runs_the_pipeline_once() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "one pipeline run shared by two callers, always")
            .expect("write");

        let store = DocumentStore::default();
        let req = request(&path, "doc-1", "report.txt");
        let (first, second) = tokio::join!(
            store.process_document(&req),
            store.process_document(&req)
        );

        let first = first.expect("first caller");
        let second = second.expect("second caller");
        assert_eq!(first.total_words, second.total_words);
        assert_eq!(first.total_chunks, second.total_chunks);
        assert_eq!(store.processing_runs(), 1, "extraction must be coalesced");
        assert_eq!(store.memory_stats().await.processing_queue_size, 0);
    }

    #[tokio::test]
    async fn coalesced_caller_sees_the_shared_failure() {
        let (sender, receiver) = watch::channel(None);
        let store = DocumentStore::default();
        store.lock_queue().insert("doc-x".to_string(), receiver);

        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("whatever.txt");
        std::fs::write(&path, "irrelevant, the queued outcome wins").expect("write");

        let req = request(&path, "doc-x", "whatever.txt");
        let waiter = store.process_document(&req);
        sender
            .send(Some(Err("disk exploded".to_string())))
            .expect("send");

        let error = waiter.await.expect_err("shared failure propagates");
        assert!(matches!(error, IngestError::ProcessingFailed(message) if message.contains("disk exploded")));
        assert_eq!(store.processing_runs(), 0, "waiter must not re-run the pipeline");
    }

    #[tokio::test]
    async fn cancelled_processing_releases_the_queue_entry() {
        use std::future::Future;
        use std::task::Poll;

        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "content that takes at least one poll to extract")
            .expect("write");

        let store = DocumentStore::default();
        let req = request(&path, "doc-1", "report.txt");
        {
            let mut in_flight = Box::pin(store.process_document(&req));
            std::future::poll_fn(|cx| {
                let _ = in_flight.as_mut().poll(cx);
                Poll::Ready(())
            })
            .await;
        } // dropped mid-pipeline

        assert_eq!(
            store.memory_stats().await.processing_queue_size,
            0,
            "a dropped caller must not leak its queue entry"
        );
        let stats = store
            .process_document(&req)
            .await
            .expect("retry after cancellation succeeds");
        assert_eq!(stats.document_id, "doc-1");
        assert_eq!(stats.total_chunks, 1);
    }

    #[tokio::test]
    async fn failed_documents_are_not_indexed() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "").expect("write");

        let store = DocumentStore::default();
        let error = store
            .process_document(&request(&path, "doc-1", "empty.txt"))
            .await
            .expect_err("empty file is rejected");
        assert!(error.is_hard_rejection());
        assert!(store.stats("doc-1").await.is_none());
        assert_eq!(store.memory_stats().await.total_documents, 0);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "some indexed content for clearing later").expect("write");

        let store = DocumentStore::default();
        store
            .process_document(&request(&path, "doc-1", "report.txt"))
            .await
            .expect("processing");

        assert!(store.clear("doc-1").await);
        assert!(!store.clear("doc-1").await);
        assert!(!store.clear("never-indexed").await);
        assert!(store.stats("doc-1").await.is_none());
    }

    #[tokio::test]
    async fn batch_processing_reports_per_item_errors() {
        let dir = tempdir().expect("tempdir");
        let good_a = dir.path().join("a.txt");
        let good_b = dir.path().join("b.txt");
        let bad = dir.path().join("c.exe");
        std::fs::write(&good_a, "first document body with enough words").expect("write");
        std::fs::write(&good_b, "second document body with enough words").expect("write");
        std::fs::write(&bad, "not a supported format").expect("write");

        let store = Arc::new(DocumentStore::default());
        let outcome = store
            .process_batch(vec![
                request(&good_a, "doc-a", "a.txt"),
                request(&good_b, "doc-b", "b.txt"),
                request(&bad, "doc-c", "c.exe"),
            ])
            .await;

        assert_eq!(outcome.summary.total, 3);
        assert_eq!(outcome.summary.successful, 2);
        assert_eq!(outcome.summary.failed, 1);
        assert_eq!(outcome.errors[0].document_id, "doc-c");
        assert!(outcome.errors[0].error.contains("unsupported"));
    }

    #[tokio::test]
    async fn cleanup_option_removes_the_source_upload() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("upload.txt");
        std::fs::write(&path, "uploaded content that should be cleaned up").expect("write");

        let store = DocumentStore::new(IndexingOptions {
            cleanup_source: true,
            ..IndexingOptions::default()
        });
        store
            .process_document(&request(&path, "doc-1", "upload.txt"))
            .await
            .expect("processing");

        assert!(!path.exists(), "source upload must be removed");
        assert!(store.stats("doc-1").await.is_some());
    }
}
