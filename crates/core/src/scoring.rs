use crate::models::{DocumentChunk, DocumentIndex, SearchResult};
use std::collections::HashSet;

// The weight table is deliberately a transparent, debuggable heuristic:
// additive, integer, trivially tunable.
pub const PHRASE_MATCH_WEIGHT: u32 = 20;
pub const TERM_MATCH_WEIGHT: u32 = 3;
pub const EXPANSION_MATCH_WEIGHT: u32 = 2;
pub const RELEVANCE_THRESHOLD: u32 = 2;
/// Query tokens shorter than this are ignored.
pub const MIN_TERM_CHARS: usize = 3;

/// Related terms for common query lead-words. Each expanded term found in a
/// chunk adds `EXPANSION_MATCH_WEIGHT`.
const SEMANTIC_EXPANSIONS: &[(&str, &[&str])] = &[
    ("what", &["information", "details", "explanation"]),
    ("how", &["method", "process", "steps"]),
    ("why", &["reason", "cause", "because"]),
    ("when", &["time", "date", "schedule"]),
    ("where", &["location", "place", "site"]),
    ("who", &["person", "people", "author"]),
    ("mount", &["mountain", "peak"]),
];

#[derive(Debug, Clone, Default)]
pub struct ChunkScore {
    pub score: u32,
    pub matches: Vec<String>,
}

impl ChunkScore {
    pub fn is_relevant(&self) -> bool {
        self.score >= RELEVANCE_THRESHOLD
    }
}

/// Lowercased, deduplicated query tokens of at least `MIN_TERM_CHARS`.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() >= MIN_TERM_CHARS)
        .filter(|token| seen.insert(token.to_string()))
        .map(str::to_string)
        .collect()
}

fn expansions(term: &str) -> &'static [&'static str] {
    SEMANTIC_EXPANSIONS
        .iter()
        .find(|(lead, _)| *lead == term)
        .map(|(_, related)| *related)
        .unwrap_or(&[])
}

/// Scores one chunk's text against a query: exact phrase +20, each distinct
/// query term found +3, each semantic-expansion term found +2.
pub fn score_text(content: &str, query: &str) -> ChunkScore {
    let content_lower = content.to_lowercase();
    let query_lower = query.trim().to_lowercase();

    let mut score = 0u32;
    let mut matches = Vec::new();

    if !query_lower.is_empty() && content_lower.contains(&query_lower) {
        score += PHRASE_MATCH_WEIGHT;
    }

    let terms = query_terms(query);
    for term in &terms {
        if content_lower.contains(term.as_str()) {
            score += TERM_MATCH_WEIGHT;
            matches.push(term.clone());
        }
    }

    let mut seen_expansions = HashSet::new();
    for term in &terms {
        for related in expansions(term) {
            if seen_expansions.insert(*related) && content_lower.contains(related) {
                score += EXPANSION_MATCH_WEIGHT;
                matches.push((*related).to_string());
            }
        }
    }

    ChunkScore { score, matches }
}

/// Scores every chunk of a document and keeps the relevant ones. Returns
/// `None` when no chunk clears the relevance threshold. The document-level
/// score is the sum over all relevant chunks; the returned chunk list is the
/// top `top_chunks` by score (source order breaks ties).
pub fn score_document(
    index: &DocumentIndex,
    query: &str,
    top_chunks: usize,
) -> Option<SearchResult> {
    let mut scored: Vec<DocumentChunk> = Vec::new();

    for chunk in &index.chunks {
        let result = score_text(&chunk.content, query);
        if result.is_relevant() {
            let mut hit = chunk.clone();
            hit.relevance_score = result.score;
            hit.matches = result.matches;
            scored.push(hit);
        }
    }

    assemble_result(index, scored, top_chunks)
}

/// Builds the per-document result from already-scored relevant chunks:
/// total is the sum over all of them, the chunk list keeps the top
/// `top_chunks` by score with source order breaking ties.
pub fn assemble_result(
    index: &DocumentIndex,
    mut scored: Vec<DocumentChunk>,
    top_chunks: usize,
) -> Option<SearchResult> {
    if scored.is_empty() {
        return None;
    }

    let total = scored.iter().map(|chunk| chunk.relevance_score).sum();
    scored.sort_by(|left, right| {
        right
            .relevance_score
            .cmp(&left.relevance_score)
            .then(left.start_word.cmp(&right.start_word))
    });
    scored.truncate(top_chunks);

    Some(SearchResult {
        document_id: index.document_id.clone(),
        document_name: index.document_name.clone(),
        total_relevance_score: total,
        chunks: scored,
    })
}
