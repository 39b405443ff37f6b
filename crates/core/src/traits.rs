use crate::error::SearchError;
use crate::models::{EvidenceBundle, SearchResult, WebResult};
use async_trait::async_trait;

/// A remote index service that can score chunks on our behalf. Probed with
/// `ping` before delegation; any failure falls through to the local tiers.
#[async_trait]
pub trait RemoteIndex {
    async fn ping(&self) -> Result<(), SearchError>;

    async fn search(
        &self,
        query: &str,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<SearchResult>, SearchError>;
}

/// The live web-search collaborator. Only the decision of when to call it
/// lives in this crate; the HTTP call itself is external.
#[async_trait]
pub trait WebSearcher: Send + Sync {
    async fn search_web(&self, query: &str, limit: usize)
        -> Result<Vec<WebResult>, SearchError>;
}

/// Used when no web-search provider is configured: never returns results,
/// so evidence stays document-only.
pub struct DisabledWebSearch;

#[async_trait]
impl WebSearcher for DisabledWebSearch {
    async fn search_web(
        &self,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<WebResult>, SearchError> {
        Ok(Vec::new())
    }
}

/// The answer-generation collaborator. Everything around it (evidence
/// bundle, confidence, attribution) is produced here; the text itself is
/// not our problem.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, query: &str, evidence: &EvidenceBundle)
        -> Result<String, SearchError>;
}

/// Fallback generator that stitches the strongest evidence into a plain
/// extractive answer. Stands in wherever a model provider is not wired up.
pub struct ExtractiveAnswerer;

const SNIPPET_CHARS: usize = 300;

#[async_trait]
impl AnswerGenerator for ExtractiveAnswerer {
    async fn generate(
        &self,
        _query: &str,
        evidence: &EvidenceBundle,
    ) -> Result<String, SearchError> {
        let mut sections = Vec::new();

        for result in evidence.document_sources.iter().take(3) {
            if let Some(chunk) = result.chunks.first() {
                sections.push(format!(
                    "From {}: {}",
                    result.document_name,
                    snippet(&chunk.content)
                ));
            }
        }
        for web in evidence.web_sources.iter().take(2) {
            sections.push(format!("From the web ({}): {}", web.url, snippet(&web.snippet)));
        }

        if sections.is_empty() {
            return Ok(
                "No supporting evidence was found in your documents or on the web. \
                 Try rephrasing the question or uploading a relevant document."
                    .to_string(),
            );
        }
        Ok(sections.join("\n\n"))
    }
}

fn snippet(text: &str) -> String {
    if text.len() <= SNIPPET_CHARS {
        return text.to_string();
    }
    let cut = text
        .char_indices()
        .take_while(|(offset, _)| *offset < SNIPPET_CHARS)
        .last()
        .map(|(offset, c)| offset + c.len_utf8())
        .unwrap_or(text.len());
    format!("{}…", &text[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EvidenceType;

    #[tokio::test]
    async fn extractive_answer_cites_document_names() {
        let evidence = EvidenceBundle {
            document_sources: vec![SearchResult {
                document_id: "doc-1".to_string(),
                document_name: "handbook.pdf".to_string(),
                total_relevance_score: 12,
                chunks: vec![crate::models::DocumentChunk {
                    id: "chunk-1".to_string(),
                    content: "Vacation requests go through the portal.".to_string(),
                    page_num: Some(1),
                    start_word: 0,
                    end_word: 6,
                    word_count: 6,
                    relevance_score: 12,
                    matches: vec!["vacation".to_string()],
                }],
            }],
            web_sources: Vec::new(),
            evidence_type: EvidenceType::Documents,
            confidence: 0.6,
            no_doc_evidence: false,
        };

        let answer = ExtractiveAnswerer
            .generate("how do I request vacation", &evidence)
            .await
            .expect("generate");
        assert!(answer.contains("handbook.pdf"));
        assert!(answer.contains("Vacation requests"));
    }

    #[tokio::test]
    async fn empty_evidence_produces_the_insufficient_context_answer() {
        let evidence = EvidenceBundle {
            document_sources: Vec::new(),
            web_sources: Vec::new(),
            evidence_type: EvidenceType::Documents,
            confidence: 0.5,
            no_doc_evidence: true,
        };

        let answer = ExtractiveAnswerer
            .generate("anything", &evidence)
            .await
            .expect("generate");
        assert!(answer.contains("No supporting evidence"));
    }

    #[tokio::test]
    async fn disabled_web_search_returns_nothing() {
        let results = DisabledWebSearch
            .search_web("anything", 5)
            .await
            .expect("disabled search never fails");
        assert!(results.is_empty());
    }
}
