use std::path::{Path, PathBuf};

use crate::{
    domain::{KeywordRunSummary, SearchTerm},
    error::ScoutError,
};

use super::artifact_db::write_json;

pub fn tracking_path(out_dir: &Path, group: &str) -> PathBuf {
    out_dir.join(format!("wa_tracking_{}.json", group))
}

/// Per-group run summaries, doubling as the resume checkpoint.
#[derive(Debug)]
pub struct TrackingLedger {
    path: PathBuf,
    entries: Vec<KeywordRunSummary>,
}

impl TrackingLedger {
    pub fn open(out_dir: &Path, group: &str) -> Result<Self, ScoutError> {
        let path = tracking_path(out_dir, group);
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) if !content.trim().is_empty() => serde_json::from_str(&content)?,
            Ok(_) => vec![],
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => vec![],
            Err(e) => return Err(e.into()),
        };

        let ledger = TrackingLedger { path, entries };
        if !ledger.entries.is_empty() {
            log::info!(
                "Resuming group {}: {} keywords already tracked",
                group,
                ledger.entries.len()
            );
        }
        Ok(ledger)
    }

    pub fn is_done(&self, term: &SearchTerm) -> bool {
        self.entries.iter().any(|e| e.keyword == term.as_str())
    }

    /// Adds `summary`, replacing an earlier entry for the same keyword.
    pub fn record(&mut self, summary: KeywordRunSummary) {
        self.entries.retain(|e| e.keyword != summary.keyword);
        self.entries.push(summary);
    }

    pub fn flush(&self) -> Result<(), ScoutError> {
        write_json(&self.path, &self.entries)
    }

    pub fn entries(&self) -> &[KeywordRunSummary] {
        &self.entries
    }
}
