//! Turning documents on disk into page-tagged chunks.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::chunker;
use crate::document::Chunk;
use crate::pdf;

pub const DEFAULT_CHUNK_SIZE: usize = 900;
pub const DEFAULT_CHUNK_OVERLAP: usize = 150;

/// Errors raised while loading a document. All of them are user-input
/// problems; nothing is stored when one occurs.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Expected a .pdf file, got: {}", .0.display())]
    NotPdf(PathBuf),

    #[error("No extractable text found in {}", .0.display())]
    NoExtractableText(PathBuf),

    #[error("Failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to extract text from PDF {}: {message}", .path.display())]
    Extract { path: PathBuf, message: String },
}

/// A document loader: one implementation per input format.
pub trait Ingestion {
    /// Loads the document at `path` and returns its chunks.
    fn load(&self, path: &Path) -> Result<Vec<Chunk>, IngestError>;
}

/// Loads PDFs page by page and splits each page into chunks tagged with
/// `{source: <path>, page: <1-based page>}`.
#[derive(Debug, Clone)]
pub struct PdfIngestion {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for PdfIngestion {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl PdfIngestion {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Chunks already-extracted page texts. Pages are split in parallel; the
    /// output keeps page order.
    pub fn chunk_pages(&self, path: &Path, pages: &[String]) -> Result<Vec<Chunk>, IngestError> {
        let source = path.display().to_string();

        let chunks: Vec<Chunk> = pages
            .par_iter()
            .enumerate()
            .map(|(idx, raw)| {
                let page_text = pdf::clean_page(raw);
                if page_text.is_empty() {
                    return Vec::new();
                }
                chunker::split_text(&page_text, self.chunk_size, self.chunk_overlap)
                    .into_iter()
                    .map(|text| Chunk::new(text, source.clone(), idx as u32 + 1))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<Vec<Chunk>>>()
            .into_iter()
            .flatten()
            .collect();

        if chunks.is_empty() {
            return Err(IngestError::NoExtractableText(path.to_path_buf()));
        }
        Ok(chunks)
    }
}

/// Rejects paths that do not exist or lack a `.pdf` extension.
fn validate_pdf_path(path: &Path) -> Result<(), IngestError> {
    if !path.exists() {
        return Err(IngestError::NotFound(path.to_path_buf()));
    }
    let is_pdf = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Err(IngestError::NotPdf(path.to_path_buf()));
    }
    Ok(())
}

impl Ingestion for PdfIngestion {
    fn load(&self, path: &Path) -> Result<Vec<Chunk>, IngestError> {
        validate_pdf_path(path)?;

        let pages = pdf::extract_pages(path)?;
        debug!(pages = pages.len(), path = %path.display(), "Extracted PDF pages");

        let chunks = self.chunk_pages(path, &pages)?;
        info!("Loaded {} chunks from {}", chunks.len(), path.display());
        Ok(chunks)
    }
}
