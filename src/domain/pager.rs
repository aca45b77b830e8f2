use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Grid chrome: "Page X of Y, records A to B of C".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagerInfo {
    pub page: u32,
    pub total_pages: u32,
    pub first_record: u32,
    pub last_record: u32,
    pub total_records: u32,
}

impl PagerInfo {
    pub fn is_last_page(&self) -> bool {
        self.page >= self.total_pages
    }
}

fn pager_regex() -> &'static Regex {
    static PAGER: OnceLock<Regex> = OnceLock::new();
    PAGER.get_or_init(|| {
        Regex::new(r"(?i)Page\s+(\d+)\s+of\s+(\d+),\s*records\s+(\d+)\s+to\s+(\d+)\s+of\s+(\d+)")
            .expect("pager pattern is valid")
    })
}

/// `None` for unparseable text and for the all-zero placeholder the grid
/// shows before its data binding completes.
pub fn read_pager(html: &str) -> Option<PagerInfo> {
    let caps = pager_regex().captures(html)?;
    let num = |i: usize| caps.get(i)?.as_str().parse::<u32>().ok();

    let pager = PagerInfo {
        page: num(1)?,
        total_pages: num(2)?,
        first_record: num(3)?,
        last_record: num(4)?,
        total_records: num(5)?,
    };

    if pager.total_pages == 0 || pager.total_records == 0 {
        return None;
    }

    Some(pager)
}
