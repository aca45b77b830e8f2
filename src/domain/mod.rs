pub mod business;
pub mod filing;
pub mod filing_text;
pub mod page_state;
pub mod pager;
pub mod result_row;
pub mod summary;

pub use business::*;
pub use filing::*;
pub use filing_text::*;
pub use page_state::*;
pub use pager::*;
pub use result_row::*;
pub use summary::*;
