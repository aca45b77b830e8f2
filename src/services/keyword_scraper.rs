use std::{collections::HashSet, path::PathBuf, time::Duration};

use tokio::time::{sleep, Instant};

use crate::{
    configuration::PipelineOptions,
    dal::artifact_db,
    domain::{
        EntityDetailRecord, KeywordResult, KeywordRunSummary, ModelCapture, ModelPage, PageState,
        PageVisit, ResultRow, SearchTerm,
    },
};

use super::{
    await_clear, capture_entity, classify, ensure_search_form, extract_business_list,
    extract_grid_rows, read_live_pager, retry, submit_search, turn_page, Browser, BrowserError,
    DocumentCollector, EntityTarget, FailureKind, StepError,
};

const RESULTS_POLL: Duration = Duration::from_millis(500);

/// Runs one search term end to end against a live session: search, walk the
/// result pages, capture every entity once and write the keyword's artifacts.
pub struct KeywordScraper<'a> {
    browser: &'a dyn Browser,
    options: &'a PipelineOptions,
    collector: &'a DocumentCollector,
    out_dir: PathBuf,
    group: String,
}

/// Everything gathered for a keyword before it is written out.
struct Harvest {
    pages: Vec<PageVisit>,
    rows: Vec<ResultRow>,
    model: ModelCapture,
    details: Vec<EntityDetailRecord>,
    details_failed: u32,
    error: Option<String>,
}

impl<'a> KeywordScraper<'a> {
    pub fn new(
        browser: &'a dyn Browser,
        options: &'a PipelineOptions,
        collector: &'a DocumentCollector,
        out_dir: impl Into<PathBuf>,
        group: &str,
    ) -> Self {
        KeywordScraper {
            browser,
            options,
            collector,
            out_dir: out_dir.into(),
            group: group.to_string(),
        }
    }

    /// Only a lost session comes back as an error; every other failure is
    /// recorded in the returned summary.
    pub async fn scrape(&self, term: &SearchTerm) -> Result<KeywordResult, BrowserError> {
        let started = Instant::now();
        log::info!("[{}] Starting search", term);

        let mut summary = KeywordRunSummary::new(&self.group, term);

        if !ensure_search_form(self.browser, self.options).await?
            || !submit_search(self.browser, term, self.options).await?
        {
            summary.form_failed = true;
            summary.error = Some("search form submission failed".to_string());
            summary.duration_sec = started.elapsed().as_secs_f64();
            return Ok(KeywordResult {
                summary,
                ..Default::default()
            });
        }

        let harvest = match self.await_results().await? {
            true => self.walk_pages(term).await?,
            false => Harvest {
                pages: vec![],
                rows: vec![],
                model: ModelCapture::new(&self.group, term),
                details: vec![],
                details_failed: 0,
                error: Some("results grid never loaded".to_string()),
            },
        };

        let summary = self.write_artifacts(term, summary, &harvest, started);
        log::info!(
            "[{}] Done: {} pages, {} rows, {} details ({} failed), {} with documents in {:.1}s",
            term,
            summary.pages_visited,
            summary.records_scraped,
            summary.details_success,
            summary.details_failed,
            summary.pdf_success,
            summary.duration_sec
        );

        Ok(KeywordResult {
            summary,
            pages: harvest.pages,
            rows: harvest.rows,
        })
    }

    async fn await_results(&self) -> Result<bool, BrowserError> {
        let deadline = Instant::now() + self.options.results_wait;
        loop {
            match classify(self.browser).await? {
                PageState::ResultsGrid => return Ok(true),
                PageState::InterstitialChallenge => {
                    if !await_clear(self.browser, self.options.list_challenge_wait).await? {
                        return Ok(false);
                    }
                    continue;
                }
                _ => {}
            }
            if Instant::now() >= deadline {
                log::warn!("Results grid did not load within {:?}", self.options.results_wait);
                return Ok(false);
            }
            sleep(RESULTS_POLL).await;
        }
    }

    /// Grid rows of the current page. An empty first page is re-read a few
    /// times before the term is queued for a later rerun.
    async fn page_rows(
        &self,
        term: &SearchTerm,
        page: u32,
    ) -> Result<Vec<ResultRow>, BrowserError> {
        if page > 1 {
            return extract_grid_rows(self.browser).await;
        }

        let browser = self.browser;
        let outcome = retry(&self.options.empty_page_retry, move |_| async move {
            let rows = extract_grid_rows(browser).await?;
            match rows.is_empty() {
                true => Err(StepError::not_ready("no grid rows")),
                false => Ok(rows),
            }
        })
        .await;

        match outcome {
            Ok(rows) => Ok(rows),
            Err(FailureKind::Aborted(StepError::Browser(e))) => Err(e),
            Err(failure) => {
                log::warn!("[{}] First page stayed empty: {}", term, failure);
                if let Err(e) = artifact_db::append_rerun(&self.out_dir, &self.group, term) {
                    log::error!("[{}] Could not queue rerun: {}", term, e);
                }
                Ok(vec![])
            }
        }
    }

    fn row_index(rows: &[ResultRow], business_id: &str, fallback: usize) -> usize {
        rows.iter()
            .position(|row| row.business_id.as_deref() == Some(business_id))
            .unwrap_or(fallback)
    }

    async fn walk_pages(&self, term: &SearchTerm) -> Result<Harvest, BrowserError> {
        let mut harvest = Harvest {
            pages: vec![],
            rows: vec![],
            model: ModelCapture::new(&self.group, term),
            details: vec![],
            details_failed: 0,
            error: None,
        };
        let mut seen: HashSet<String> = HashSet::new();
        let mut page = 1;

        loop {
            sleep(self.options.per_page_settle_delay).await;

            let rows = self.page_rows(term, page).await?;
            let entities = extract_business_list(self.browser).await?;
            log::info!(
                "[{}] Page {}: {} grid rows, {} model entities",
                term,
                page,
                rows.len(),
                entities.len()
            );

            let mut first_on_page = true;
            let mut lost_grid = false;
            for (i, entity) in entities.iter().enumerate() {
                let Some(business_id) = entity.identifier() else {
                    continue;
                };
                if !seen.insert(business_id.to_string()) {
                    log::debug!("[{}] Entity {} already captured, skipping", term, business_id);
                    continue;
                }

                log::info!(
                    "[{}] page {} business {}/{} id={}",
                    term,
                    page,
                    i + 1,
                    entities.len(),
                    business_id
                );
                let target = EntityTarget {
                    business_id,
                    summary: entity,
                    row_index: Self::row_index(&rows, business_id, i),
                    first_on_page,
                    document_dir: artifact_db::document_dir(
                        &self.out_dir,
                        &self.group,
                        term,
                        page,
                        business_id,
                    ),
                };
                first_on_page = false;

                let outcome =
                    capture_entity(self.browser, &target, self.collector, self.options).await?;
                match outcome.record {
                    Some(record) => harvest.details.push(record),
                    None => {
                        log::warn!("[{}] No detail captured for {}", term, business_id);
                        harvest.details_failed += 1;
                    }
                }
                if !outcome.returned {
                    lost_grid = true;
                    break;
                }
            }

            harvest.pages.push(PageVisit {
                page,
                rows_on_page: rows.len(),
            });
            harvest.rows.extend(rows);
            harvest.model.pages.push(ModelPage {
                page_index: page,
                business_list: entities,
            });

            if lost_grid {
                log::error!("[{}] Lost the results grid on page {}", term, page);
                harvest.error = Some(format!("lost the results grid on page {}", page));
                break;
            }

            let Some(pager) = read_live_pager(self.browser, &self.options.pager_retry).await? else {
                log::error!("[{}] Pager never resolved on page {}", term, page);
                harvest.error = Some(format!("pager never resolved on page {}", page));
                break;
            };
            if pager.is_last_page() {
                break;
            }

            let target = pager.page + 1;
            if !turn_page(self.browser, target, self.options).await? {
                log::error!("[{}] Stuck on page {} of {}", term, page, pager.total_pages);
                harvest.error = Some(format!("stuck on page {}", page));
                break;
            }
            page = target;
        }

        Ok(harvest)
    }

    fn write_artifacts(
        &self,
        term: &SearchTerm,
        mut summary: KeywordRunSummary,
        harvest: &Harvest,
        started: Instant,
    ) -> KeywordRunSummary {
        match artifact_db::write_model_capture(&self.out_dir, term, &harvest.model) {
            Ok(path) => summary.api_file = Some(path.display().to_string()),
            Err(e) => log::error!("[{}] Could not write model capture: {}", term, e),
        }
        match artifact_db::write_details(&self.out_dir, &self.group, term, &harvest.details) {
            Ok(path) => summary.details_file = Some(path.display().to_string()),
            Err(e) => log::error!("[{}] Could not write details: {}", term, e),
        }

        let with_documents = harvest
            .details
            .iter()
            .filter(|record| !record.documents.is_empty())
            .count() as u32;

        summary.pages_visited = harvest.pages.len() as u32;
        summary.records_scraped = harvest.rows.len() as u32;
        summary.api_records = harvest.model.record_count() as u32;
        summary.details_success = harvest.details.len() as u32;
        summary.details_failed = harvest.details_failed;
        summary.pdf_success = with_documents;
        summary.pdf_fail = summary.details_success - with_documents;
        summary.error = harvest.error.clone();
        summary.duration_sec = started.elapsed().as_secs_f64();
        summary
    }
}
