use std::path::{Path, PathBuf};

use itertools::Itertools;

use crate::{domain::SearchTerm, error::ScoutError};

pub fn keywords_path(keywords_dir: &Path, group: &str) -> PathBuf {
    keywords_dir.join(format!("{}.txt", group))
}

/// One term per line; blank lines and repeats are dropped, order is kept.
pub fn load_keywords(keywords_dir: &Path, group: &str) -> Result<Vec<SearchTerm>, ScoutError> {
    let path = keywords_path(keywords_dir, group);
    let content = std::fs::read_to_string(&path)?;

    let keywords: Vec<SearchTerm> = content
        .lines()
        .filter_map(SearchTerm::parse)
        .unique()
        .collect();

    log::info!("Loaded {} keywords from {}", keywords.len(), path.display());
    Ok(keywords)
}

#[cfg(test)]
mod tests {
    use super::load_keywords;

    #[test]
    fn load_keywords_skips_blanks_and_repeats() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A.txt"), "ACME\n\n  AB  \nACME\nAZURE\n").unwrap();

        let keywords = load_keywords(dir.path(), "A").unwrap();
        let keywords: Vec<&str> = keywords.iter().map(|k| k.as_str()).collect();
        assert_eq!(keywords, vec!["ACME", "AB", "AZURE"]);
    }

    #[test]
    fn load_keywords_missing_group() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_keywords(dir.path(), "Q").is_err());
    }
}
