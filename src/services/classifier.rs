use crate::domain::{PageSnapshot, PageState};

use super::{Browser, BrowserError, Soften};

pub const MODAL_SELECTOR: &str = ".modal-dialog";

/// Reads the live document. Transient probe failures degrade to empty fields.
pub async fn capture_snapshot(browser: &dyn Browser) -> Result<PageSnapshot, BrowserError> {
    let url = browser.current_url().await.soft()?.unwrap_or_default();
    let html = browser.page_source().await.soft()?.unwrap_or_default();
    let modal_visible = browser
        .is_visible(MODAL_SELECTOR)
        .await
        .soft()?
        .unwrap_or(false);

    Ok(PageSnapshot {
        url,
        html,
        modal_visible,
    })
}

/// Current page state. Anything short of a lost session yields a state,
/// `Unknown` when nothing matches.
pub async fn classify(browser: &dyn Browser) -> Result<PageState, BrowserError> {
    let snapshot = capture_snapshot(browser).await?;
    let state = PageState::classify(&snapshot);
    log::debug!("Classified {} as {:?}", snapshot.url, state);
    Ok(state)
}
