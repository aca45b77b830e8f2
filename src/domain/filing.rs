use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use super::{filing_text::Executor, result_row::cell_text};

pub const PDF_SIGNATURE: &[u8] = b"%PDF";
pub const MIN_DOCUMENT_BYTES: u64 = 2048;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingRow {
    pub filing_number: String,
    pub filing_date_time: String,
    pub effective_date: String,
    pub filing_type: String,
}

fn is_filing_table(table: &ElementRef) -> bool {
    let header_selector = Selector::parse("thead td, thead th").unwrap();
    let header = table
        .select(&header_selector)
        .map(|cell| cell_text(cell).to_uppercase())
        .collect::<Vec<_>>()
        .join(" ");
    header.contains("FILING NUMBER") && header.contains("FILING TYPE")
}

fn filing_table(document: &Html) -> Option<ElementRef<'_>> {
    let selector = Selector::parse("table.table-striped").unwrap();
    document.select(&selector).find(is_filing_table)
}

pub fn has_filing_table(html: &str) -> bool {
    filing_table(&Html::parse_document(html)).is_some()
}

/// Rows of the filing-history table. Empty when the table is absent.
pub fn parse_filing_history(html: &str) -> Vec<FilingRow> {
    let document = Html::parse_document(html);
    let Some(table) = filing_table(&document) else {
        return vec![];
    };

    let row_selector = Selector::parse("tbody tr").unwrap();
    let td_selector = Selector::parse("td").unwrap();

    table
        .select(&row_selector)
        .filter_map(|tr| {
            let cells: Vec<String> = tr.select(&td_selector).map(cell_text).collect();
            match cells.as_slice() {
                [number, date_time, effective, kind, ..] => Some(FilingRow {
                    filing_number: number.clone(),
                    filing_date_time: date_time.clone(),
                    effective_date: effective.clone(),
                    filing_type: kind.clone(),
                }),
                _ => None,
            }
        })
        .collect()
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum DocumentRejection {
    #[error("file missing")]
    Missing,
    #[error("file truncated ({0} bytes)")]
    Undersized(u64),
    #[error("not a pdf document")]
    BadSignature,
}

/// A downloaded file that passed size and signature checks. Only
/// `ValidatedDocument::check` can produce one.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedDocument {
    path: PathBuf,
    size: u64,
}

impl ValidatedDocument {
    pub fn check(path: &Path, min_size: u64) -> Result<Self, DocumentRejection> {
        let metadata = std::fs::metadata(path).map_err(|_| DocumentRejection::Missing)?;
        if !metadata.is_file() {
            return Err(DocumentRejection::Missing);
        }
        if metadata.len() < min_size {
            return Err(DocumentRejection::Undersized(metadata.len()));
        }

        let mut header = [0u8; 5];
        let read = File::open(path)
            .and_then(|mut f| f.read(&mut header))
            .map_err(|_| DocumentRejection::Missing)?;
        if !header[..read].starts_with(PDF_SIGNATURE) {
            return Err(DocumentRejection::BadSignature);
        }

        Ok(ValidatedDocument {
            path: path.to_path_buf(),
            size: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Contact and personnel fields pulled from a document's text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentFields {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub executors: Vec<Executor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingDocument {
    pub filing_number: String,
    pub filing_type: String,
    pub filing_date_time: String,
    pub effective_date: String,
    pub pdf_path: PathBuf,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub executors: Vec<Executor>,
}

impl FilingDocument {
    pub fn new(filing: &FilingRow, document: &ValidatedDocument, fields: DocumentFields) -> Self {
        FilingDocument {
            filing_number: filing.filing_number.clone(),
            filing_type: filing.filing_type.clone(),
            filing_date_time: filing.filing_date_time.clone(),
            effective_date: filing.effective_date.clone(),
            pdf_path: document.path().to_path_buf(),
            phone: fields.phone,
            email: fields.email,
            executors: fields.executors,
        }
    }
}
