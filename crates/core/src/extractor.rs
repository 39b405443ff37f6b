use crate::error::IngestError;
use crate::models::IndexingOptions;
use lopdf::Document;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::warn;

pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["txt", "md", "pdf", "docx"];

/// Decompressed bytes read from a single docx ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub text: String,
    pub page_count: Option<u32>,
    /// Set when extraction failed and a synthetic placeholder was indexed
    /// instead of real content.
    pub warning: Option<String>,
}

pub fn is_supported_extension(ext: &str) -> bool {
    SUPPORTED_EXTENSIONS
        .iter()
        .any(|supported| supported.eq_ignore_ascii_case(ext))
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Turns one uploaded file into normalized text plus page metadata,
/// dispatching on the declared original filename's extension.
///
/// Unsupported formats and de-minimis content are hard rejections; a failing
/// PDF/DOCX parse indexes a flagged placeholder instead (the caller sees the
/// failure through `warning`).
pub async fn extract_document(
    path: &Path,
    original_name: &str,
    options: &IndexingOptions,
) -> Result<ExtractedContent, IngestError> {
    let extension = extension_of(original_name)
        .ok_or_else(|| IngestError::MissingFileName(original_name.to_string()))?;

    if !is_supported_extension(&extension) {
        return Err(IngestError::UnsupportedFormat(extension));
    }

    // A file that cannot be read at all is an Io error for every format,
    // never a recoverable extraction failure.
    tokio::fs::metadata(path).await?;

    let extracted = match extension.as_str() {
        "txt" | "md" => {
            let text = tokio::fs::read_to_string(path).await?;
            Ok((text, None))
        }
        "pdf" => extract_pdf(path, options.extraction_timeout).await,
        "docx" => extract_docx_file(path).await,
        _ => unreachable!("extension filtered above"),
    };

    match extracted {
        Ok((text, page_count)) => {
            let trimmed_len = text.trim().len();
            if trimmed_len < options.min_content_chars {
                return Err(IngestError::ContentValidation {
                    got: trimmed_len,
                    minimum: options.min_content_chars,
                });
            }
            Ok(ExtractedContent {
                text,
                page_count,
                warning: None,
            })
        }
        Err(error) if error.is_hard_rejection() => Err(error),
        Err(error @ IngestError::Io(_)) => Err(error),
        Err(error) => {
            warn!(document = original_name, %error, "extraction failed, indexing placeholder");
            let reason = error.to_string();
            Ok(ExtractedContent {
                text: placeholder_text(original_name, &reason),
                page_count: None,
                warning: Some(reason),
            })
        }
    }
}

fn placeholder_text(name: &str, reason: &str) -> String {
    format!(
        "Text extraction for '{name}' did not produce readable content ({reason}). \
         The document was indexed without its original text."
    )
}

/// PDF extraction runs `pdftotext` in its own process with a bounded
/// timeout; a crash or hang in the parser cannot take the caller down.
/// When the binary is not installed, parsing falls back in-process.
async fn extract_pdf(path: &Path, limit: Duration) -> Result<(String, Option<u32>), IngestError> {
    match extract_pdf_subprocess(path, limit).await {
        Ok(result) => Ok(result),
        Err(IngestError::Io(error)) if error.kind() == std::io::ErrorKind::NotFound => {
            let owned = path.to_path_buf();
            tokio::task::spawn_blocking(move || extract_pdf_in_process(&owned))
                .await
                .map_err(|error| IngestError::ExtractionFailed(error.to_string()))?
        }
        Err(error) => Err(error),
    }
}

async fn extract_pdf_subprocess(
    path: &Path,
    limit: Duration,
) -> Result<(String, Option<u32>), IngestError> {
    let child = Command::new("pdftotext")
        .arg(path)
        .arg("-")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(waited) => waited?,
        Err(_) => return Err(IngestError::ExtractionTimeout(limit)),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(IngestError::ExtractionFailed(format!(
            "pdftotext exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let raw = String::from_utf8_lossy(&output.stdout).to_string();
    // pdftotext terminates each page with a form feed.
    let pages: Vec<&str> = raw
        .split('\u{000c}')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect();

    if pages.is_empty() {
        return Err(IngestError::ExtractionFailed(format!(
            "pdf had no readable page text: {}",
            path.display()
        )));
    }

    let page_count = pages.len() as u32;
    Ok((pages.join("\n\n"), Some(page_count)))
}

fn extract_pdf_in_process(path: &PathBuf) -> Result<(String, Option<u32>), IngestError> {
    let document =
        Document::load(path).map_err(|error| IngestError::ExtractionFailed(error.to_string()))?;

    let mut pages = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| IngestError::ExtractionFailed(error.to_string()))?;

        if !text.trim().is_empty() {
            pages.push(text);
        }
    }

    if pages.is_empty() {
        return Err(IngestError::ExtractionFailed(format!(
            "pdf had no readable page text: {}",
            path.display()
        )));
    }

    let page_count = pages.len() as u32;
    Ok((pages.join("\n\n"), Some(page_count)))
}

async fn extract_docx_file(path: &Path) -> Result<(String, Option<u32>), IngestError> {
    let bytes = tokio::fs::read(path).await?;
    let text = tokio::task::spawn_blocking(move || extract_docx(&bytes))
        .await
        .map_err(|error| IngestError::ExtractionFailed(error.to_string()))??;
    Ok((text, None))
}

fn extract_docx(bytes: &[u8]) -> Result<String, IngestError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|error| IngestError::ExtractionFailed(error.to_string()))?;

    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| IngestError::ExtractionFailed("word/document.xml not found".to_string()))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|error| IngestError::ExtractionFailed(error.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(IngestError::ExtractionFailed(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    collect_text_runs(&xml)
}

/// Concatenates the `w:t` text runs of a docx body, separating paragraphs
/// with newlines so the chunker sees sentence boundaries.
fn collect_text_runs(xml: &[u8]) -> Result<String, IngestError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(element)) => {
                match element.local_name().as_ref() {
                    b"t" => in_text_run = true,
                    b"p" if !out.is_empty() => out.push('\n'),
                    _ => {}
                }
            }
            Ok(quick_xml::events::Event::Text(text)) if in_text_run => {
                out.push_str(text.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(element)) => {
                if element.local_name().as_ref() == b"t" {
                    in_text_run = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(error) => return Err(IngestError::ExtractionFailed(error.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn options() -> IndexingOptions {
        IndexingOptions::default()
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("payload.exe");
        std::fs::write(&path, b"binary").expect("write");

        let error = extract_document(&path, "payload.exe", &options())
            .await
            .expect_err("exe must be rejected");
        assert!(matches!(error, IngestError::UnsupportedFormat(ext) if ext == "exe"));
    }

    #[tokio::test]
    async fn empty_text_file_fails_validation() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, b"").expect("write");

        let error = extract_document(&path, "empty.txt", &options())
            .await
            .expect_err("empty file must fail validation");
        assert!(matches!(
            error,
            IngestError::ContentValidation { got: 0, minimum: 10 }
        ));
    }

    #[tokio::test]
    async fn short_text_is_a_validation_failure_not_extraction_failure() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("tiny.txt");
        std::fs::write(&path, b"hi").expect("write");

        let error = extract_document(&path, "tiny.txt", &options())
            .await
            .expect_err("de-minimis content must be rejected");
        assert!(error.is_hard_rejection());
        assert!(matches!(error, IngestError::ContentValidation { got: 2, .. }));
    }

    #[tokio::test]
    async fn plain_text_roundtrip() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"Mount Mandara is a sacred summit.").expect("write");

        let content = extract_document(&path, "notes.txt", &options())
            .await
            .expect("txt extraction should succeed");
        assert_eq!(content.text, "Mount Mandara is a sacred summit.");
        assert!(content.warning.is_none());
        assert!(content.page_count.is_none());
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error_for_every_format() {
        let dir = tempdir().expect("tempdir");
        for name in ["ghost.txt", "ghost.md", "ghost.pdf", "ghost.docx"] {
            let path = dir.path().join(name);
            let error = extract_document(&path, name, &options())
                .await
                .expect_err("missing file must not index a placeholder");
            assert!(matches!(error, IngestError::Io(_)), "{name}: {error}");
        }
    }

    #[tokio::test]
    async fn corrupt_pdf_indexes_flagged_placeholder() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%not really a pdf").expect("write");

        let content = extract_document(&path, "broken.pdf", &options())
            .await
            .expect("broken pdf is recoverable");
        assert!(content.warning.is_some(), "placeholder must be flagged");
        assert!(content.text.len() >= options().min_content_chars);
        assert!(content.text.contains("broken.pdf"));
    }

    #[tokio::test]
    async fn docx_text_runs_are_extracted() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("memo.docx");

        let file = std::fs::File::create(&path).expect("create");
        let mut archive = zip::ZipWriter::new(file);
        archive
            .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .expect("start entry");
        archive
            .write_all(
                br#"<w:document xmlns:w="ns"><w:body>
                    <w:p><w:r><w:t>Quarterly budget review.</w:t></w:r></w:p>
                    <w:p><w:r><w:t>Spending is on track.</w:t></w:r></w:p>
                </w:body></w:document>"#,
            )
            .expect("write entry");
        archive.finish().expect("finish");

        let content = extract_document(&path, "memo.docx", &options())
            .await
            .expect("docx extraction should succeed");
        assert!(content.text.contains("Quarterly budget review."));
        assert!(content.text.contains("Spending is on track."));
        assert!(content.warning.is_none());
    }

    #[test]
    fn placeholder_is_long_enough_to_index() {
        let text = placeholder_text("x.pdf", "boom");
        assert!(text.len() >= IndexingOptions::default().min_content_chars);
    }
}
