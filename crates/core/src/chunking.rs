use crate::error::IngestError;
use crate::models::{DocumentChunk, IndexingOptions};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Token estimate used against `max_tokens_per_chunk`.
pub const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug)]
pub struct ChunkingOutcome {
    pub chunks: Vec<DocumentChunk>,
    /// The per-document chunk cap cut coverage short.
    pub truncated: bool,
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Splits normalized text into overlapping word windows of
/// `chunk_size_words`, advancing by `chunk_size_words - overlap_words` so
/// adjacent chunks share context across the boundary. Windows whose chars/4
/// token estimate exceeds the budget are re-split at sentence boundaries
/// instead of being cut mid-sentence.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    options: &IndexingOptions,
) -> Result<ChunkingOutcome, IngestError> {
    if options.chunk_size_words == 0 {
        return Err(IngestError::InvalidChunkConfig(
            "chunk size must be positive".to_string(),
        ));
    }
    if options.overlap_words >= options.chunk_size_words {
        return Err(IngestError::InvalidChunkConfig(format!(
            "overlap {} must be smaller than chunk size {}",
            options.overlap_words, options.chunk_size_words
        )));
    }

    let sentence_re = Regex::new(r"[^.!?]*[.!?]+(?:\s+|$)|[^.!?]+$")?;
    let words: Vec<&str> = text.split_whitespace().collect();
    let step = options.chunk_size_words - options.overlap_words;
    let max_chunk_chars = options.max_tokens_per_chunk * CHARS_PER_TOKEN;

    let mut chunks: Vec<DocumentChunk> = Vec::new();
    let mut truncated = false;
    let mut start = 0usize;

    while start < words.len() {
        if chunks.len() >= options.max_chunks_per_document {
            truncated = true;
            break;
        }

        let end = (start + options.chunk_size_words).min(words.len());
        let window = &words[start..end];
        let content = window.join(" ");
        if content.trim().is_empty() {
            start += step;
            continue;
        }

        if content.len() > max_chunk_chars {
            let mut piece_start = start;
            for piece in split_by_sentences(&content, max_chunk_chars, &sentence_re) {
                let piece_words = count_words(&piece);
                chunks.push(make_chunk(
                    document_id,
                    chunks.len(),
                    piece,
                    piece_start,
                    piece_start + piece_words,
                    options.chunks_per_page,
                ));
                piece_start += piece_words;
            }
        } else {
            chunks.push(make_chunk(
                document_id,
                chunks.len(),
                content,
                start,
                end,
                options.chunks_per_page,
            ));
        }

        start += step;
    }

    if chunks.len() > options.max_chunks_per_document {
        chunks.truncate(options.max_chunks_per_document);
        truncated = true;
    }

    Ok(ChunkingOutcome { chunks, truncated })
}

fn make_chunk(
    document_id: &str,
    ordinal: usize,
    content: String,
    start_word: usize,
    end_word: usize,
    chunks_per_page: usize,
) -> DocumentChunk {
    let word_count = count_words(&content);
    let page_num = (ordinal / chunks_per_page.max(1)) as u32 + 1;
    DocumentChunk {
        id: chunk_id(document_id, ordinal, &content),
        content,
        page_num: Some(page_num),
        start_word,
        end_word,
        word_count,
        relevance_score: 0,
        matches: Vec::new(),
    }
}

fn chunk_id(document_id: &str, ordinal: usize, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update((ordinal as u64).to_le_bytes());
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Accumulates whole sentences into pieces under `max_chars`. A single
/// sentence longer than the budget stays intact rather than being cut.
fn split_by_sentences(content: &str, max_chars: usize, sentence_re: &Regex) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for sentence in sentence_re.find_iter(content) {
        let sentence = sentence.as_str().trim();
        if sentence.is_empty() {
            continue;
        }
        if !current.is_empty() && current.len() + 1 + sentence.len() > max_chars {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(sentence);
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    if pieces.is_empty() {
        pieces.push(content.to_string());
    }

    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_salad(count: usize) -> String {
        (0..count)
            .map(|index| format!("word{index}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn options(chunk_size: usize, overlap: usize) -> IndexingOptions {
        IndexingOptions {
            chunk_size_words: chunk_size,
            overlap_words: overlap,
            ..IndexingOptions::default()
        }
    }

    #[test]
    fn chunk_count_matches_coverage_formula() {
        let text = word_salad(100);
        let outcome = chunk_text("doc-1", &text, &options(10, 2)).expect("chunking");

        // ceil(100 / (10 - 2))
        assert_eq!(outcome.chunks.len(), 13);
        assert!(!outcome.truncated);
        for chunk in &outcome.chunks {
            assert!(chunk.word_count <= 10);
            assert_eq!(chunk.word_count, count_words(&chunk.content));
        }
    }

    #[test]
    fn adjacent_chunks_share_the_overlap() {
        let text = word_salad(30);
        let outcome = chunk_text("doc-1", &text, &options(10, 3)).expect("chunking");

        let first: Vec<&str> = outcome.chunks[0].content.split_whitespace().collect();
        let second: Vec<&str> = outcome.chunks[1].content.split_whitespace().collect();
        assert_eq!(&first[first.len() - 3..], &second[..3]);
        assert_eq!(outcome.chunks[1].start_word, outcome.chunks[0].end_word - 3);
    }

    #[test]
    fn chunk_cap_truncates_observably() {
        let text = word_salad(200);
        let capped = IndexingOptions {
            max_chunks_per_document: 5,
            ..options(10, 2)
        };
        let outcome = chunk_text("doc-1", &text, &capped).expect("chunking");

        assert_eq!(outcome.chunks.len(), 5);
        assert!(outcome.truncated, "cap hit must be observable");
    }

    #[test]
    fn oversized_window_splits_at_sentence_boundaries() {
        let sentences: Vec<String> = (0..8)
            .map(|index| format!("Sentence number {index} talks about the budget."))
            .collect();
        let text = sentences.join(" ");
        let tight = IndexingOptions {
            max_tokens_per_chunk: 20, // 80 chars
            ..options(500, 50)
        };
        let outcome = chunk_text("doc-1", &text, &tight).expect("chunking");

        assert!(outcome.chunks.len() > 1);
        for chunk in &outcome.chunks {
            assert!(
                chunk.content.ends_with('.'),
                "no mid-sentence cut: {:?}",
                chunk.content
            );
        }
        // Provenance offsets stay contiguous across the sub-split.
        for pair in outcome.chunks.windows(2) {
            assert_eq!(pair[0].end_word, pair[1].start_word);
        }
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let error = chunk_text("doc-1", "some words here", &options(5, 5))
            .expect_err("equal overlap is invalid");
        assert!(matches!(error, IngestError::InvalidChunkConfig(_)));
    }

    #[test]
    fn chunk_ids_are_deterministic() {
        let text = word_salad(40);
        let first = chunk_text("doc-1", &text, &options(10, 2)).expect("chunking");
        let second = chunk_text("doc-1", &text, &options(10, 2)).expect("chunking");

        let first_ids: Vec<&str> = first.chunks.iter().map(|c| c.id.as_str()).collect();
        let second_ids: Vec<&str> = second.chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn whitespace_only_text_yields_no_chunks() {
        let outcome = chunk_text("doc-1", "   \n\t  ", &options(10, 2)).expect("chunking");
        assert!(outcome.chunks.is_empty());
        assert!(!outcome.truncated);
    }
}
