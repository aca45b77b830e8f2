use std::fmt;

use serde::{Deserialize, Serialize};

use super::{business::BusinessSummary, result_row::ResultRow};

/// One unit of search input. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchTerm(String);

impl SearchTerm {
    pub fn parse(raw: &str) -> Option<SearchTerm> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(SearchTerm(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-name-safe form used inside artifact paths.
    pub fn slug(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for SearchTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordRunSummary {
    pub group: String,
    pub keyword: String,
    pub pages_visited: u32,
    pub records_scraped: u32,
    pub details_file: Option<String>,
    pub details_success: u32,
    pub details_failed: u32,
    pub api_file: Option<String>,
    pub api_records: u32,
    pub pdf_success: u32,
    pub pdf_fail: u32,
    pub form_failed: bool,
    pub duration_sec: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl KeywordRunSummary {
    pub fn new(group: &str, term: &SearchTerm) -> Self {
        KeywordRunSummary {
            group: group.to_string(),
            keyword: term.as_str().to_string(),
            ..Default::default()
        }
    }

    pub fn failed(group: &str, term: &SearchTerm, error: String) -> Self {
        KeywordRunSummary {
            error: Some(error),
            ..KeywordRunSummary::new(group, term)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageVisit {
    pub page: u32,
    pub rows_on_page: usize,
}

/// Grid-channel audit trail of one keyword.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordResult {
    #[serde(flatten)]
    pub summary: KeywordRunSummary,
    pub pages: Vec<PageVisit>,
    pub rows: Vec<ResultRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPage {
    pub page_index: u32,
    pub business_list: Vec<BusinessSummary>,
}

/// Model-channel capture of one keyword, page by page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCapture {
    pub group: String,
    pub keyword: String,
    pub pages: Vec<ModelPage>,
}

impl ModelCapture {
    pub fn new(group: &str, term: &SearchTerm) -> Self {
        ModelCapture {
            group: group.to_string(),
            keyword: term.as_str().to_string(),
            pages: vec![],
        }
    }

    pub fn record_count(&self) -> usize {
        self.pages.iter().map(|p| p.business_list.len()).sum()
    }
}
