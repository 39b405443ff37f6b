use crate::error::IngestError;
use crate::extractor::is_supported_extension;
use crate::models::ProcessingRequest;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Walks a folder and builds processing requests for every supported
/// document found, in path order so repeat runs produce the same batch.
/// Document ids are derived from the path relative to `root`.
pub fn discover_documents(root: &Path) -> Result<Vec<ProcessingRequest>, IngestError> {
    if !root.is_dir() {
        return Err(IngestError::InvalidArgument(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let mut requests = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|error| {
            IngestError::ProcessingFailed(format!("folder walk failed: {error}"))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !is_supported(path) {
            debug!(path = %path.display(), "skipping unsupported file");
            continue;
        }

        let document_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
            .to_string();
        let relative = path.strip_prefix(root).unwrap_or(path);

        requests.push(ProcessingRequest {
            file_path: path.to_string_lossy().to_string(),
            document_id: document_id_for(relative),
            document_name,
        });
    }

    requests.sort_by(|left, right| left.file_path.cmp(&right.file_path));
    Ok(requests)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(is_supported_extension)
        .unwrap_or(false)
}

/// Lowercased relative path with every non-alphanumeric run collapsed to
/// one hyphen, so `Reports/Q3 Summary.pdf` becomes `reports-q3-summary-pdf`.
fn document_id_for(relative: &Path) -> String {
    let mut id = String::new();
    let mut pending_hyphen = false;
    for c in relative.to_string_lossy().to_lowercase().chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !id.is_empty() {
                id.push('-');
            }
            pending_hyphen = false;
            id.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    id
}
