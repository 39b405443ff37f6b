use crate::models::{EvidenceBundle, EvidenceType, SearchResult, WebResult};

const BASE_CONFIDENCE: f64 = 0.5;
const PER_DOCUMENT_BOOST: f64 = 0.1;
const DOCUMENT_BOOST_CAP: f64 = 0.3;
const PER_WEB_BOOST: f64 = 0.05;
const WEB_BOOST_CAP: f64 = 0.2;

/// Whether a web search would supplement document evidence or stand alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebSearchRole {
    Supplementary,
    Sole,
}

/// Web search runs only when the caller opted in; with no document hits it
/// carries the answer alone, otherwise it supplements.
pub fn web_search_role(documents_empty: bool, opted_in: bool) -> Option<WebSearchRole> {
    if !opted_in {
        return None;
    }
    if documents_empty {
        Some(WebSearchRole::Sole)
    } else {
        Some(WebSearchRole::Supplementary)
    }
}

/// Combines document and web hits into one attributed bundle. With neither
/// source present the bundle is typed `documents`: the caller asked about
/// their documents, and the absence of evidence is reported against them
/// through `no_doc_evidence`.
pub fn assemble(
    document_sources: Vec<SearchResult>,
    web_sources: Vec<WebResult>,
) -> EvidenceBundle {
    let evidence_type = match (document_sources.is_empty(), web_sources.is_empty()) {
        (false, true) => EvidenceType::Documents,
        (true, false) => EvidenceType::Web,
        (false, false) => EvidenceType::Mixed,
        (true, true) => EvidenceType::Documents,
    };

    let confidence = confidence(document_sources.len(), web_sources.len());
    let no_doc_evidence = document_sources.is_empty();

    EvidenceBundle {
        document_sources,
        web_sources,
        evidence_type,
        confidence,
        no_doc_evidence,
    }
}

/// Base 0.5, plus a capped boost per source. Document hits count for more
/// than web hits; the result never exceeds 1.0.
fn confidence(document_count: usize, web_count: usize) -> f64 {
    let document_boost = (document_count as f64 * PER_DOCUMENT_BOOST).min(DOCUMENT_BOOST_CAP);
    let web_boost = (web_count as f64 * PER_WEB_BOOST).min(WEB_BOOST_CAP);
    (BASE_CONFIDENCE + document_boost + web_boost).min(1.0)
}
