use scraper::{Html, Selector};
use serde::Serialize;

use super::{filing::has_filing_table, pager::read_pager};

/// What the live document currently represents. Always derived from a fresh
/// snapshot, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PageState {
    SearchForm,
    ResultsGrid,
    DetailView,
    FilingHistory,
    DocumentModal,
    InterstitialChallenge,
    Unknown,
}

/// Read-only view of the browser document at one instant.
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub url: String,
    pub html: String,
    pub modal_visible: bool,
}

const CHALLENGE_MARKERS: [&str; 4] = [
    "#cf-chl-widget",
    ".cf-turnstile",
    "#challenge-form",
    "#challenge-stage",
];

fn any_present(document: &Html, selectors: &[&str]) -> bool {
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .any(|selector| document.select(&selector).next().is_some())
}

fn title_text(document: &Html) -> String {
    let selector = Selector::parse("title").unwrap();
    document
        .select(&selector)
        .next()
        .map(|t| t.text().collect::<String>())
        .unwrap_or_default()
}

fn has_results_marker(document: &Html, html: &str) -> bool {
    any_present(document, &["tbody[ng-show*='businessList']", "tr[ng-repeat]"])
        || read_pager(html).is_some()
        || html.contains("Business Search Results")
}

impl PageState {
    /// Applies the probes in priority order. A challenge is checked first since
    /// stale markup from the previous view often stays in the DOM beneath it.
    pub fn classify(snapshot: &PageSnapshot) -> PageState {
        let document = Html::parse_document(&snapshot.html);
        let url = snapshot.url.as_str();

        if any_present(&document, &CHALLENGE_MARKERS)
            || title_text(&document).contains("Just a moment")
        {
            return PageState::InterstitialChallenge;
        }

        if snapshot.modal_visible {
            return PageState::DocumentModal;
        }

        if has_filing_table(&snapshot.html) {
            return PageState::FilingHistory;
        }

        if any_present(&document, &["#divBusinessInformation"])
            || url.contains("BusinessInformation")
            || snapshot.html.contains(">Business Information<")
        {
            return PageState::DetailView;
        }

        if url.contains("BusinessSearch") && has_results_marker(&document, &snapshot.html) {
            return PageState::ResultsGrid;
        }

        if any_present(&document, &["#txtOrgname"]) || url.contains("AdvancedSearch") {
            return PageState::SearchForm;
        }

        PageState::Unknown
    }
}
