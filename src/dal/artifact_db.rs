use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    domain::{EntityDetailRecord, KeywordResult, ModelCapture, SearchTerm},
    error::ScoutError,
};

#[derive(Serialize, Deserialize)]
struct GroupResults {
    group: String,
    keywords: Vec<KeywordResult>,
}

pub fn results_path(out_dir: &Path, group: &str) -> PathBuf {
    out_dir.join(format!("wa_results_{}.json", group))
}

pub fn model_path(out_dir: &Path, group: &str, term: &SearchTerm) -> PathBuf {
    out_dir
        .join("api")
        .join(format!("wa_api_{}_{}.json", group, term.slug()))
}

pub fn details_path(out_dir: &Path, group: &str, term: &SearchTerm) -> PathBuf {
    out_dir
        .join("bi_html")
        .join(format!("wa_bi_{}_{}.json", group, term.slug()))
}

pub fn rerun_path(out_dir: &Path, group: &str) -> PathBuf {
    out_dir.join("rerun").join(format!("rerun_{}.txt", group))
}

pub fn document_dir(
    out_dir: &Path,
    group: &str,
    term: &SearchTerm,
    page: u32,
    business_id: &str,
) -> PathBuf {
    out_dir
        .join("pdf")
        .join(group)
        .join(term.slug())
        .join(format!("page_{}", page))
        .join(format!("bid_{}", business_id))
}

/// Compact JSON, written to a sibling temp file and renamed into place so a
/// crash never leaves a half-written artifact.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ScoutError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec(value)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ScoutError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn write_model_capture(
    out_dir: &Path,
    term: &SearchTerm,
    capture: &ModelCapture,
) -> Result<PathBuf, ScoutError> {
    let path = model_path(out_dir, &capture.group, term);
    write_json(&path, capture)?;
    Ok(path)
}

pub fn write_details(
    out_dir: &Path,
    group: &str,
    term: &SearchTerm,
    records: &[EntityDetailRecord],
) -> Result<PathBuf, ScoutError> {
    let path = details_path(out_dir, group, term);
    write_json(&path, records)?;
    Ok(path)
}

/// Earlier keywords of this group, so a resumed run extends the file instead
/// of replacing it.
pub fn read_group_results(out_dir: &Path, group: &str) -> Result<Vec<KeywordResult>, ScoutError> {
    Ok(read_json::<GroupResults>(&results_path(out_dir, group))?
        .map(|results| results.keywords)
        .unwrap_or_default())
}

pub fn write_group_results(
    out_dir: &Path,
    group: &str,
    keywords: &[KeywordResult],
) -> Result<(), ScoutError> {
    #[derive(Serialize)]
    struct View<'a> {
        group: &'a str,
        keywords: &'a [KeywordResult],
    }
    write_json(&results_path(out_dir, group), &View { group, keywords })
}

pub fn read_rerun(out_dir: &Path, group: &str) -> Result<Vec<String>, ScoutError> {
    match std::fs::read_to_string(rerun_path(out_dir, group)) {
        Ok(content) => Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(vec![]),
        Err(e) => Err(e.into()),
    }
}

/// Appends `term` to the group's rerun list unless it is already there.
pub fn append_rerun(out_dir: &Path, group: &str, term: &SearchTerm) -> Result<(), ScoutError> {
    if read_rerun(out_dir, group)?
        .iter()
        .any(|existing| existing == term.as_str())
    {
        return Ok(());
    }

    let path = rerun_path(out_dir, group);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    writeln!(file, "{}", term)?;
    log::info!("[{}] Queued for rerun in {}", term, path.display());
    Ok(())
}
