use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::ScoutError;

/// Plain text of a stored document, one entry per page.
#[async_trait]
pub trait DocumentTextExtractor: Send + Sync {
    async fn page_texts(&self, path: &Path) -> Result<Vec<String>, ScoutError>;
}

pub struct LopdfExtractor;

fn read_pages(path: &Path) -> Result<Vec<String>, ScoutError> {
    let document = lopdf::Document::load(path)?;
    let pages = document
        .get_pages()
        .keys()
        .map(|&number| {
            document.extract_text(&[number]).unwrap_or_else(|e| {
                log::debug!("No text on page {} of {}: {}", number, path.display(), e);
                String::new()
            })
        })
        .collect();
    Ok(pages)
}

#[async_trait]
impl DocumentTextExtractor for LopdfExtractor {
    async fn page_texts(&self, path: &Path) -> Result<Vec<String>, ScoutError> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_pages(&path))
            .await
            .map_err(|e| ScoutError::Worker(e.to_string()))?
    }
}
