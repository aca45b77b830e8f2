use scraper::{node::Node, ElementRef, Html, Selector};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::{
    filing::{FilingDocument, FilingRow},
    result_row::cell_text,
};

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// One entry of the SPA's client-side `businessList`. Known keys are typed,
/// everything else is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessSummary {
    #[serde(
        rename = "BusinessID",
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub business_id: Option<String>,
    #[serde(
        rename = "ID",
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(
        rename = "UBINumber",
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub ubi_number: Option<String>,
    #[serde(rename = "BusinessName", default, skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
    #[serde(rename = "EntityName", default, skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    #[serde(rename = "BusinessStatus", default, skip_serializing_if = "Option::is_none")]
    pub business_status: Option<String>,
    #[serde(rename = "Status", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "BusinessType", default, skip_serializing_if = "Option::is_none")]
    pub business_type: Option<String>,
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BusinessSummary {
    pub fn identifier(&self) -> Option<&str> {
        self.business_id.as_deref().or(self.id.as_deref())
    }

    pub fn display_name(&self) -> Option<&str> {
        self.business_name
            .as_deref()
            .or(self.entity_name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Governor {
    pub title: String,
    pub entity_type: String,
    pub entity_name: String,
    pub first_name: String,
    pub last_name: String,
}

/// Fields captured from the detail view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessInformation {
    pub business_name: Option<String>,
    pub ubi_number: Option<String>,
    pub business_type: Option<String>,
    pub business_status: Option<String>,
    pub principal_office_street: Option<String>,
    pub principal_office_mailing: Option<String>,
    pub expiration_date: Option<String>,
    pub jurisdiction: Option<String>,
    pub formation_date: Option<String>,
    pub duration: Option<String>,
    pub business_nature: Option<String>,
    pub inactive_date: Option<String>,
    pub agent_name: Option<String>,
    pub agent_street: Option<String>,
    pub agent_mailing: Option<String>,
    pub governors: Vec<Governor>,
}

/// One captured entity: identifiers from the model channel, the detail
/// payload and any validated filing documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDetailRecord {
    #[serde(rename = "BusinessID")]
    pub business_id: String,
    #[serde(rename = "UBINumber")]
    pub ubi_number: Option<String>,
    #[serde(rename = "BusinessName")]
    pub business_name: Option<String>,
    #[serde(rename = "BusinessStatus")]
    pub business_status: Option<String>,
    #[serde(rename = "BusinessType")]
    pub business_type: Option<String>,
    #[serde(rename = "BusinessInformationHTML")]
    pub detail: BusinessInformation,
    #[serde(rename = "FilingHistoryRecords")]
    pub filing_history: Vec<FilingRow>,
    #[serde(rename = "PDFSummaries")]
    pub documents: Vec<FilingDocument>,
    #[serde(rename = "PDFDownloadedCount")]
    pub documents_downloaded: usize,
    #[serde(rename = "NameConfirmed")]
    pub name_confirmed: bool,
}

impl EntityDetailRecord {
    pub fn new(business_id: &str, summary: &BusinessSummary, detail: BusinessInformation) -> Self {
        EntityDetailRecord {
            business_id: business_id.to_string(),
            ubi_number: summary.ubi_number.clone(),
            business_name: summary.display_name().map(str::to_string),
            business_status: summary
                .business_status
                .clone()
                .or_else(|| summary.status.clone()),
            business_type: summary.business_type.clone().or_else(|| summary.kind.clone()),
            detail,
            filing_history: vec![],
            documents: vec![],
            documents_downloaded: 0,
            name_confirmed: false,
        }
    }

    pub fn with_filings(mut self, filings: Vec<FilingRow>, documents: Vec<FilingDocument>) -> Self {
        self.documents_downloaded = documents.len();
        self.filing_history = filings;
        self.documents = documents;
        self
    }
}

fn has_col_md_class(element: &ElementRef) -> bool {
    element.value().classes().any(|c| c.starts_with("col-md-"))
}

fn own_text_matches(element: &ElementRef, label: &str) -> bool {
    let mut children = element.children();
    match (children.next(), children.next()) {
        (Some(only), None) => matches!(only.value(), Node::Text(t) if t.trim() == label),
        _ => false,
    }
}

/// Finds the column next to a `col-md-*` label column, preferring bold text.
fn value_next_to_label(root: ElementRef, label: &str) -> Option<String> {
    let label_selector = Selector::parse("div, span").unwrap();
    let label_tag = root
        .select(&label_selector)
        .find(|el| own_text_matches(el, label))?;

    let label_col = std::iter::successors(Some(label_tag), |el| {
        el.parent().and_then(ElementRef::wrap)
    })
    .find(has_col_md_class)?;

    let value_col = label_col
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "div")
        .find(has_col_md_class)?;

    for emphasis in ["strong", "b"] {
        let selector = Selector::parse(emphasis).unwrap();
        if let Some(el) = value_col.select(&selector).next() {
            return Some(cell_text(el));
        }
    }

    Some(cell_text(value_col)).filter(|t| !t.is_empty())
}

fn header_containing<'a>(document: &'a Html, text: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse("div.div_header").unwrap();
    document
        .select(&selector)
        .find(|el| el.text().collect::<String>().contains(text))
}

fn parse_governors(document: &Html) -> Vec<Governor> {
    let Some(header) = header_containing(document, "Governors") else {
        return vec![];
    };

    // First table after the header in document order.
    let anchor = header.id();
    let selector = Selector::parse("div.div_header, table").unwrap();
    let table = document
        .select(&selector)
        .skip_while(|el| el.id() != anchor)
        .find(|el| el.value().name() == "table");
    let Some(table) = table else {
        return vec![];
    };

    let row_selector = Selector::parse("tbody tr").unwrap();
    let td_selector = Selector::parse("td").unwrap();

    table
        .select(&row_selector)
        .filter_map(|row| {
            let cells: Vec<String> = row.select(&td_selector).map(cell_text).collect();
            match cells.as_slice() {
                [title, entity_type, entity_name, first_name, last_name, ..] => Some(Governor {
                    title: title.clone(),
                    entity_type: entity_type.clone(),
                    entity_name: entity_name.clone(),
                    first_name: first_name.clone(),
                    last_name: last_name.clone(),
                }),
                _ => None,
            }
        })
        .collect()
}

/// Parses the detail container. Returns the default (all empty) record when
/// `#divBusinessInformation` is absent.
pub fn parse_business_information(html: &str) -> BusinessInformation {
    let document = Html::parse_document(html);
    let main_selector = Selector::parse("div#divBusinessInformation").unwrap();
    let Some(main) = document.select(&main_selector).next() else {
        return BusinessInformation::default();
    };

    let field = |label: &str| value_next_to_label(main, label);

    let mut info = BusinessInformation {
        business_name: field("Business Name:"),
        ubi_number: field("UBI Number:"),
        business_type: field("Business Type:"),
        business_status: field("Business Status:"),
        principal_office_street: field("Principal Office Street Address:"),
        principal_office_mailing: field("Principal Office Mailing Address:"),
        expiration_date: field("Expiration Date:"),
        jurisdiction: field("Jurisdiction:"),
        formation_date: field("Formation/ Registration Date:"),
        duration: field("Period of Duration:"),
        business_nature: field("Nature of Business:"),
        inactive_date: field("Inactive Date:"),
        governors: parse_governors(&document),
        ..Default::default()
    };

    let agent_block = header_containing(&document, "Registered Agent Information").and_then(
        |header| {
            std::iter::successors(header.parent().and_then(ElementRef::wrap), |el| {
                el.parent().and_then(ElementRef::wrap)
            })
            .find(|el| el.value().name() == "div" && el.value().classes().any(|c| c == "ng-scope"))
        },
    );
    if let Some(block) = agent_block {
        info.agent_name = value_next_to_label(block, "Registered Agent Name:");
        info.agent_street = value_next_to_label(block, "Street Address:");
        info.agent_mailing = value_next_to_label(block, "Mailing Address:");
    }

    info
}
