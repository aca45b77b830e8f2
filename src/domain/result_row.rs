use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// One row of the rendered results grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    #[serde(rename = "businessID")]
    pub business_id: Option<String>,
    pub name: String,
    pub columns: Vec<String>,
}

fn row_action_regex() -> &'static Regex {
    static ACTION: OnceLock<Regex> = OnceLock::new();
    ACTION.get_or_init(|| Regex::new(r"showBusineInfo\((\d+),").expect("row action pattern"))
}

pub(crate) fn cell_text(element: ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn results_table(document: &Html) -> Option<ElementRef<'_>> {
    ["table.table.table-striped.table-responsive", "table.table-striped"]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| document.select(&selector).next())
}

/// Parses the visible grid. Rows whose action handler cannot be read keep
/// `business_id: None`.
pub fn parse_rows(html: &str) -> Vec<ResultRow> {
    let document = Html::parse_document(html);
    let Some(table) = results_table(&document) else {
        return vec![];
    };

    let tr_selector = Selector::parse("tr[ng-repeat]").unwrap();
    let td_selector = Selector::parse("td").unwrap();
    let link_selector = Selector::parse("a.btn-link").unwrap();

    table
        .select(&tr_selector)
        .filter_map(|tr| {
            let columns: Vec<String> = tr.select(&td_selector).map(cell_text).collect();
            let name = columns.first()?.clone();

            let business_id = tr
                .select(&link_selector)
                .next()
                .and_then(|link| link.value().attr("ng-click"))
                .and_then(|handler| row_action_regex().captures(handler))
                .map(|caps| caps[1].to_string());

            Some(ResultRow {
                business_id,
                name,
                columns,
            })
        })
        .collect()
}
