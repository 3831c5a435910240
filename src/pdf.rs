use std::path::Path;

use crate::ingestion::IngestError;

/// Extracts the text of every page of the PDF at `path`, in page order.
///
/// Pages with no text come back as empty strings so indices still match
/// page numbers.
pub fn extract_pages(path: &Path) -> Result<Vec<String>, IngestError> {
    let bytes = std::fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| IngestError::Extract {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Normalizes whitespace on a page: trims each line and drops blank ones.
pub fn clean_page(text: &str) -> String {
    text.lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<&str>>()
        .join("\n")
}
