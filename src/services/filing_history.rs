use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde_json::{json, Value};
use tokio::time::{sleep, Instant};

use crate::{
    configuration::PipelineOptions,
    domain::{
        extract_document_fields, has_filing_table, parse_filing_history, DocumentFields,
        DocumentRejection, FilingDocument, FilingRow, ValidatedDocument, MIN_DOCUMENT_BYTES,
    },
};

use super::{
    click_business_information, click_first_present, close_modal, scripts, wait_for_element,
    wait_for_visible, Browser, BrowserError, DocumentFetcher, DocumentTextExtractor,
    LopdfExtractor, SessionCredentials, Soften, DETAIL_CONTAINER, MODAL_SELECTOR,
};

const FILING_HISTORY_CONTROLS: &[&str] = &["#btnFilingHistory", "input[value='Filing History']"];
const TABLE_POLL: Duration = Duration::from_millis(500);
const DOWNLOAD_POLL: Duration = Duration::from_millis(500);
const VALIDATION_DELAY: Duration = Duration::from_secs(1);
const RECHECK_DELAY: Duration = Duration::from_secs(2);

/// Opens the filing history tab from the detail view. `None` when the tab
/// control is missing; an empty list when the tab opened without a table.
pub async fn open_filing_history(
    browser: &dyn Browser,
    options: &PipelineOptions,
) -> Result<Option<Vec<FilingRow>>, BrowserError> {
    if !click_first_present(browser, FILING_HISTORY_CONTROLS).await? {
        log::debug!("No filing history control on this detail view");
        return Ok(None);
    }
    sleep(options.filing_settle_delay).await;

    let deadline = Instant::now() + options.filing_table_wait;
    loop {
        let html = browser.page_source().await.soft()?.unwrap_or_default();
        if has_filing_table(&html) {
            let filings = parse_filing_history(&html);
            log::debug!("Filing history lists {} filings", filings.len());
            return Ok(Some(filings));
        }
        if Instant::now() >= deadline {
            log::warn!("Filing table did not render within {:?}", options.filing_table_wait);
            return Ok(Some(vec![]));
        }
        sleep(TABLE_POLL).await;
    }
}

/// From the filing tab back to the entity's detail view.
pub async fn back_to_detail(
    browser: &dyn Browser,
    options: &PipelineOptions,
) -> Result<bool, BrowserError> {
    if click_business_information(browser).await?
        && wait_for_element(browser, DETAIL_CONTAINER, options.detail_wait).await?
    {
        return Ok(true);
    }

    log::debug!("Back control did not restore the detail view, using history");
    browser.history_back().await.soft()?;
    wait_for_element(browser, DETAIL_CONTAINER, options.detail_wait).await
}

fn pdf_files(dir: &Path) -> HashSet<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| {
                    path.extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// First `.pdf` in `dir` that was not there before the download started.
async fn await_new_download(
    dir: &Path,
    before: &HashSet<PathBuf>,
    max_wait: Duration,
) -> Option<PathBuf> {
    let deadline = Instant::now() + max_wait;
    loop {
        if let Some(path) = pdf_files(dir).into_iter().find(|p| !before.contains(p)) {
            return Some(path);
        }
        if Instant::now() >= deadline {
            return None;
        }
        sleep(DOWNLOAD_POLL).await;
    }
}

/// The browser may still be flushing the file, so a failed check gets one
/// more look before the file is rejected.
async fn validate_settled(path: &Path) -> Result<ValidatedDocument, DocumentRejection> {
    sleep(VALIDATION_DELAY).await;
    match ValidatedDocument::check(path, MIN_DOCUMENT_BYTES) {
        Ok(document) => Ok(document),
        Err(_) => {
            sleep(RECHECK_DELAY).await;
            ValidatedDocument::check(path, MIN_DOCUMENT_BYTES)
        }
    }
}

async fn accept_or_discard(path: &Path, filing_number: &str) -> Option<ValidatedDocument> {
    match validate_settled(path).await {
        Ok(document) => Some(document),
        Err(rejection) => {
            log::warn!(
                "Discarding document for filing {} ({}): {}",
                filing_number,
                path.display(),
                rejection
            );
            if let Err(e) = std::fs::remove_file(path) {
                log::debug!("Could not remove {}: {}", path.display(), e);
            }
            None
        }
    }
}

fn document_file_name(filing_number: &str) -> String {
    let stem: String = filing_number
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{}.pdf", stem)
}

/// Pulls filing documents out of the document overlay and reads their text.
pub struct DocumentCollector {
    fetcher: Option<DocumentFetcher>,
    extractor: Arc<dyn DocumentTextExtractor>,
}

impl DocumentCollector {
    pub fn new(fetcher: Option<DocumentFetcher>, extractor: Arc<dyn DocumentTextExtractor>) -> Self {
        DocumentCollector { fetcher, extractor }
    }

    pub fn from_options(options: &PipelineOptions) -> Self {
        let fetcher = options.http_document_fallback.then(|| {
            DocumentFetcher::new(options.document_url.clone(), options.document_fetch_timeout)
        });
        DocumentCollector::new(fetcher, Arc::new(LopdfExtractor))
    }

    /// Downloads the document behind filing row `row_index` into `dir`.
    /// Anything short of a validated document yields `None`.
    pub async fn fetch_document(
        &self,
        browser: &dyn Browser,
        filing: &FilingRow,
        row_index: usize,
        dir: &Path,
        options: &PipelineOptions,
    ) -> Result<Option<FilingDocument>, BrowserError> {
        if let Err(e) = std::fs::create_dir_all(dir) {
            log::warn!("Cannot create document directory {}: {}", dir.display(), e);
            return Ok(None);
        }
        browser.set_download_dir(dir).await.soft()?;
        let before = pdf_files(dir);

        let opened = browser
            .execute(scripts::OPEN_DOCUMENT_MODAL, vec![json!(row_index)])
            .await
            .soft()?
            == Some(Value::Bool(true));
        if !opened {
            log::debug!("No document control on filing {}", filing.filing_number);
            return Ok(None);
        }
        if !wait_for_visible(browser, MODAL_SELECTOR, options.modal_wait).await? {
            log::warn!("Document overlay for filing {} never opened", filing.filing_number);
            close_modal(browser, options).await?;
            return Ok(None);
        }

        let selected = browser
            .execute(scripts::SELECT_DOCUMENT, vec![])
            .await
            .soft()?
            == Some(Value::Bool(true));
        let arrived = match selected {
            true => await_new_download(dir, &before, options.download_wait).await,
            false => None,
        };
        close_modal(browser, options).await?;

        if !selected {
            log::info!("Filing {} has no retrievable document", filing.filing_number);
            return Ok(None);
        }

        let dest = dir.join(document_file_name(&filing.filing_number));
        let document = match arrived {
            Some(path) => match accept_or_discard(&path, &filing.filing_number).await {
                Some(document) => Some(Self::settle_name(document, &dest)),
                None => None,
            },
            None => {
                log::warn!(
                    "No download appeared for filing {} within {:?}",
                    filing.filing_number,
                    options.download_wait
                );
                self.fetch_over_http(browser, filing, &dest).await?
            }
        };

        let Some(document) = document else {
            return Ok(None);
        };
        let fields = self.read_fields(document.path()).await;
        log::info!(
            "Stored filing {} ({} bytes) at {}",
            filing.filing_number,
            document.size(),
            document.path().display()
        );
        Ok(Some(FilingDocument::new(filing, &document, fields)))
    }

    fn settle_name(document: ValidatedDocument, dest: &Path) -> ValidatedDocument {
        if document.path() == dest {
            return document;
        }
        match std::fs::rename(document.path(), dest) {
            Ok(()) => ValidatedDocument::check(dest, MIN_DOCUMENT_BYTES).unwrap_or(document),
            Err(e) => {
                log::debug!("Keeping {} in place: {}", document.path().display(), e);
                document
            }
        }
    }

    async fn fetch_over_http(
        &self,
        browser: &dyn Browser,
        filing: &FilingRow,
        dest: &Path,
    ) -> Result<Option<ValidatedDocument>, BrowserError> {
        let Some(fetcher) = &self.fetcher else {
            return Ok(None);
        };
        let Some(credentials) = SessionCredentials::capture(browser).await.soft()? else {
            return Ok(None);
        };

        match fetcher.fetch(&credentials, &filing.filing_number, dest).await {
            Ok(true) => Ok(accept_or_discard(dest, &filing.filing_number).await),
            Ok(false) => Ok(None),
            Err(e) => {
                log::warn!("HTTP fetch for filing {} failed: {}", filing.filing_number, e);
                Ok(None)
            }
        }
    }

    async fn read_fields(&self, path: &Path) -> DocumentFields {
        match self.extractor.page_texts(path).await {
            Ok(pages) => extract_document_fields(&pages),
            Err(e) => {
                log::warn!("Could not read text from {}: {}", path.display(), e);
                DocumentFields::default()
            }
        }
    }
}
