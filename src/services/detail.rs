use std::{path::PathBuf, time::Duration};

use serde_json::{json, Value};
use tokio::time::sleep;

use crate::{
    configuration::PipelineOptions,
    domain::{
        parse_business_information, BusinessSummary, EntityDetailRecord, FilingDocument, FilingRow,
    },
};

use super::{
    await_clear, back_to_detail, dismiss_any_alert, open_filing_history, return_to_results,
    scripts, wait_for_element, Browser, BrowserError, DocumentCollector, Soften,
};

pub const DETAIL_CONTAINER: &str = "#divBusinessInformation";
const NAME_POLL: Duration = Duration::from_secs(1);

/// How the detail view gets opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenPath {
    /// The grid scope's own detail handler.
    ScopeCall,
    /// A simulated click on the entity's grid row.
    RowClick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailStage {
    Idle,
    Opening(OpenPath),
    AwaitingRender(OpenPath),
    FilingHistory { next: usize },
    DocumentModal { index: usize },
    Captured,
    Returning,
}

/// One entity from the results grid, ready to be opened.
#[derive(Debug, Clone)]
pub struct EntityTarget<'a> {
    pub business_id: &'a str,
    pub summary: &'a BusinessSummary,
    /// Position in the rendered grid, for the row-click path.
    pub row_index: usize,
    pub first_on_page: bool,
    pub document_dir: PathBuf,
}

#[derive(Debug)]
pub struct CaptureOutcome {
    pub record: Option<EntityDetailRecord>,
    /// Whether the session ended back on the results grid.
    pub returned: bool,
}

/// Case-insensitive containment either way round.
pub fn name_matches(actual: &str, expected: &str) -> bool {
    let actual = actual.trim().to_lowercase();
    let expected = expected.trim().to_lowercase();
    !actual.is_empty()
        && !expected.is_empty()
        && (actual.contains(&expected) || expected.contains(&actual))
}

struct DetailCapture<'a> {
    browser: &'a dyn Browser,
    options: &'a PipelineOptions,
    collector: &'a DocumentCollector,
    target: &'a EntityTarget<'a>,
    filings: Option<Vec<FilingRow>>,
    documents: Vec<FilingDocument>,
    attempted: usize,
    record: Option<EntityDetailRecord>,
    returned: bool,
}

impl DetailCapture<'_> {
    async fn step(&mut self, stage: DetailStage) -> Result<DetailStage, BrowserError> {
        let next = match stage {
            DetailStage::Idle => DetailStage::Idle,
            DetailStage::Opening(path) => self.open(path).await?,
            DetailStage::AwaitingRender(path) => self.await_render(path).await?,
            DetailStage::FilingHistory { next } => self.filing_history(next).await?,
            DetailStage::DocumentModal { index } => self.document(index).await?,
            DetailStage::Captured => self.capture().await?,
            DetailStage::Returning => {
                self.returned = return_to_results(self.browser, self.options).await?;
                DetailStage::Idle
            }
        };
        log::debug!(
            "Entity {}: {:?} -> {:?}",
            self.target.business_id,
            stage,
            next
        );
        Ok(next)
    }

    async fn open(&mut self, path: OpenPath) -> Result<DetailStage, BrowserError> {
        match path {
            OpenPath::ScopeCall => {
                let status = self
                    .browser
                    .execute(scripts::OPEN_DETAIL, vec![json!(self.target.business_id)])
                    .await
                    .soft()?;
                match status.as_ref().and_then(Value::as_str) {
                    Some("OK") => Ok(DetailStage::AwaitingRender(OpenPath::ScopeCall)),
                    other => {
                        log::debug!("Detail handler unavailable ({:?}), clicking the row", other);
                        Ok(DetailStage::Opening(OpenPath::RowClick))
                    }
                }
            }
            OpenPath::RowClick => {
                let clicked = self
                    .browser
                    .execute(scripts::CLICK_RESULT_ROW, vec![json!(self.target.row_index)])
                    .await
                    .soft()?;
                if clicked == Some(Value::Bool(true)) {
                    Ok(DetailStage::AwaitingRender(OpenPath::RowClick))
                } else {
                    log::warn!(
                        "No grid row {} to click for entity {}",
                        self.target.row_index,
                        self.target.business_id
                    );
                    Ok(DetailStage::Returning)
                }
            }
        }
    }

    async fn await_render(&mut self, path: OpenPath) -> Result<DetailStage, BrowserError> {
        let wait = match path {
            OpenPath::ScopeCall if self.target.first_on_page => self.options.first_detail_wait,
            OpenPath::ScopeCall => self.options.detail_wait,
            OpenPath::RowClick => self.options.row_click_wait,
        };

        let mut rendered = wait_for_element(self.browser, DETAIL_CONTAINER, wait).await?;
        if !rendered && await_clear(self.browser, self.options.challenge_wait_budget).await? {
            rendered = wait_for_element(
                self.browser,
                DETAIL_CONTAINER,
                self.options.detail_retry_wait,
            )
            .await?;
        }

        if rendered {
            dismiss_any_alert(self.browser).await?;
            return Ok(match self.options.fetch_filing_documents {
                true => DetailStage::FilingHistory { next: 0 },
                false => DetailStage::Captured,
            });
        }

        match path {
            OpenPath::ScopeCall => {
                log::debug!("Detail view did not render, falling back to a row click");
                Ok(DetailStage::Opening(OpenPath::RowClick))
            }
            OpenPath::RowClick => {
                log::warn!("Detail view for {} never rendered", self.target.business_id);
                Ok(DetailStage::Returning)
            }
        }
    }

    async fn filing_history(&mut self, next: usize) -> Result<DetailStage, BrowserError> {
        if self.filings.is_none() {
            match open_filing_history(self.browser, self.options).await? {
                Some(filings) => self.filings = Some(filings),
                None => {
                    self.filings = Some(vec![]);
                    return Ok(DetailStage::Captured);
                }
            }
        }

        let candidate = match self.attempted < self.options.max_documents_per_entity {
            true => self
                .filings
                .iter()
                .flatten()
                .enumerate()
                .skip(next)
                .find(|(_, filing)| !filing.filing_number.is_empty())
                .map(|(index, _)| index),
            false => None,
        };
        if let Some(index) = candidate {
            return Ok(DetailStage::DocumentModal { index });
        }

        if back_to_detail(self.browser, self.options).await? {
            Ok(DetailStage::Captured)
        } else {
            log::warn!(
                "Lost the detail view of {} after its filings",
                self.target.business_id
            );
            Ok(DetailStage::Returning)
        }
    }

    async fn document(&mut self, index: usize) -> Result<DetailStage, BrowserError> {
        self.attempted += 1;
        let filing = self
            .filings
            .as_ref()
            .and_then(|filings| filings.get(index))
            .cloned();

        if let Some(filing) = filing {
            let document = self
                .collector
                .fetch_document(
                    self.browser,
                    &filing,
                    index,
                    &self.target.document_dir,
                    self.options,
                )
                .await?;
            self.documents.extend(document);
        }

        Ok(DetailStage::FilingHistory { next: index + 1 })
    }

    async fn poll_name(&self) -> Result<String, BrowserError> {
        for attempt in 1..=self.options.name_poll_attempts {
            let name = self
                .browser
                .execute(scripts::DETAIL_NAME, vec![])
                .await
                .soft()?
                .and_then(|value| value.as_str().map(|s| s.trim().to_string()))
                .unwrap_or_default();
            if !name.is_empty() {
                return Ok(name);
            }
            if attempt < self.options.name_poll_attempts {
                sleep(NAME_POLL).await;
            }
        }
        Ok(String::new())
    }

    async fn capture(&mut self) -> Result<DetailStage, BrowserError> {
        let name = self.poll_name().await?;
        if name.is_empty() {
            log::warn!("Detail name for {} never bound", self.target.business_id);
            return Ok(DetailStage::Returning);
        }

        let name_confirmed = match self.target.summary.display_name() {
            Some(expected) if name_matches(&name, expected) => true,
            Some(expected) => {
                log::warn!(
                    "Detail shows {:?} while {:?} was expected (similarity {:.2})",
                    name,
                    expected,
                    strsim::jaro_winkler(&name.to_lowercase(), &expected.to_lowercase())
                );
                false
            }
            None => false,
        };

        let html = self
            .browser
            .page_source()
            .await
            .soft()?
            .unwrap_or_default();
        let detail = parse_business_information(&html);

        let mut record =
            EntityDetailRecord::new(self.target.business_id, self.target.summary, detail)
                .with_filings(
                    self.filings.take().unwrap_or_default(),
                    std::mem::take(&mut self.documents),
                );
        record.name_confirmed = name_confirmed;
        self.record = Some(record);

        Ok(DetailStage::Returning)
    }
}

/// Opens one entity's detail view, captures it (with its filing documents
/// when enabled) and walks back to the results grid. A failure anywhere
/// short-circuits to the return walk and yields no record.
pub async fn capture_entity(
    browser: &dyn Browser,
    target: &EntityTarget<'_>,
    collector: &DocumentCollector,
    options: &PipelineOptions,
) -> Result<CaptureOutcome, BrowserError> {
    let mut capture = DetailCapture {
        browser,
        options,
        collector,
        target,
        filings: None,
        documents: vec![],
        attempted: 0,
        record: None,
        returned: false,
    };

    let mut stage = DetailStage::Opening(OpenPath::ScopeCall);
    while stage != DetailStage::Idle {
        stage = capture.step(stage).await?;
    }

    Ok(CaptureOutcome {
        record: capture.record,
        returned: capture.returned,
    })
}
