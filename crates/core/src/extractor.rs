use crate::error::IngestError;
use lopdf::Document;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const SUPPORTED_EXTENSIONS: [&str; 3] = ["pdf", "txt", "md"];

/// Parses a file into text fragments suitable for chunking. Fails when the
/// format is unsupported or yields no extractable text (e.g. an image-only
/// scanned PDF).
pub trait DocumentParser {
    fn parse(&self, path: &Path) -> Result<Vec<String>, IngestError>;
}

#[derive(Default)]
pub struct FileParser;

impl DocumentParser for FileParser {
    fn parse(&self, path: &Path) -> Result<Vec<String>, IngestError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => parse_pdf(path),
            "txt" | "md" => parse_plain_text(path),
            other => Err(IngestError::Parse(format!(
                "unsupported document format '{other}': {}",
                path.display()
            ))),
        }
    }
}

fn parse_pdf(path: &Path) -> Result<Vec<String>, IngestError> {
    let document =
        Document::load(path).map_err(|error| IngestError::Parse(error.to_string()))?;

    let mut fragments = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| IngestError::Parse(error.to_string()))?;

        if !text.trim().is_empty() {
            fragments.push(text);
        }
    }

    if fragments.is_empty() {
        return Err(IngestError::Parse(format!(
            "no readable text in {} (scanned or image-only content)",
            path.display()
        )));
    }

    Ok(fragments)
}

fn parse_plain_text(path: &Path) -> Result<Vec<String>, IngestError> {
    let raw = fs::read_to_string(path)?;

    let fragments: Vec<String> = raw
        .split("\n\n")
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .map(str::to_string)
        .collect();

    if fragments.is_empty() {
        return Err(IngestError::Parse(format!(
            "no extractable text in {}",
            path.display()
        )));
    }

    Ok(fragments)
}

/// Recursively collects ingestable files under `folder`, sorted for
/// reproducible runs.
pub fn discover_document_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let supported = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });

        if supported {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}
