pub mod challenge;
pub mod classifier;
pub mod detail;
pub mod document_fetcher;
pub mod droid;
pub mod extraction;
pub mod filing_history;
pub mod keyword_scraper;
pub mod navigator;
pub mod pagination;
pub mod pdf_text;
pub mod proxy_pool;
pub mod retry;
pub mod scripts;
pub mod search_form;

pub use challenge::*;
pub use classifier::*;
pub use detail::*;
pub use document_fetcher::*;
pub use droid::*;
pub use extraction::*;
pub use filing_history::*;
pub use keyword_scraper::*;
pub use navigator::*;
pub use pagination::*;
pub use pdf_text::*;
pub use proxy_pool::*;
pub use retry::*;
pub use search_form::*;
