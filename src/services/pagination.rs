use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::{sleep, Instant};

use crate::{
    configuration::PipelineOptions,
    domain::{read_pager, PagerInfo},
};

use super::{await_clear, retry, scripts, Browser, BrowserError, RetryPolicy, Soften, StepError};

const PAGE_TURN_POLL: Duration = Duration::from_millis(500);

async fn invoke(browser: &dyn Browser, script: &str, args: Vec<Value>) -> Result<bool, BrowserError> {
    Ok(browser.execute(script, args).await.soft()? == Some(Value::Bool(true)))
}

/// Best-effort move to `target_page`: the "next" control first, then the
/// numbered control. `Ok(false)` only when neither could be invoked; arrival
/// is confirmed by the caller re-reading the pager.
pub async fn advance(browser: &dyn Browser, target_page: u32) -> Result<bool, BrowserError> {
    if invoke(browser, scripts::NEXT_PAGE, vec![]).await? {
        log::debug!("Advanced to page {} via next control", target_page);
        return Ok(true);
    }

    if invoke(browser, scripts::GOTO_PAGE_NUMBER, vec![json!(target_page)]).await? {
        log::debug!("Advanced to page {} via numbered control", target_page);
        return Ok(true);
    }

    log::warn!("No pager control available for page {}", target_page);
    Ok(false)
}

async fn await_pager_page(
    browser: &dyn Browser,
    target_page: u32,
    max_wait: Duration,
) -> Result<bool, BrowserError> {
    let deadline = Instant::now() + max_wait;
    loop {
        let html = browser.page_source().await.soft()?.unwrap_or_default();
        if read_pager(&html).is_some_and(|pager| pager.page == target_page) {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(PAGE_TURN_POLL).await;
    }
}

/// Moves the grid to `target_page` and waits for the pager to show it. A turn
/// that has not landed within `page_turn_wait` is issued once more, through
/// the numbered control when there is one so a slow first click cannot skip
/// a page. `Ok(false)` when the pager never confirms the target.
pub async fn turn_page(
    browser: &dyn Browser,
    target_page: u32,
    options: &PipelineOptions,
) -> Result<bool, BrowserError> {
    if !advance(browser, target_page).await? {
        return Ok(false);
    }

    for attempt in 1..=2 {
        sleep(options.advance_settle_delay).await;
        await_clear(browser, options.list_challenge_wait).await?;
        if await_pager_page(browser, target_page, options.page_turn_wait).await? {
            return Ok(true);
        }
        if attempt == 2 {
            break;
        }

        log::warn!("Pager has not reached page {}, clicking again", target_page);
        if !invoke(browser, scripts::GOTO_PAGE_NUMBER, vec![json!(target_page)]).await?
            && !advance(browser, target_page).await?
        {
            break;
        }
    }

    log::warn!("Pager never reached page {}", target_page);
    Ok(false)
}

/// Reads the pager off the live grid, re-reading while only the all-zero
/// placeholder is bound. `Ok(None)` once the retry budget is spent.
pub async fn read_live_pager(
    browser: &dyn Browser,
    policy: &RetryPolicy,
) -> Result<Option<PagerInfo>, BrowserError> {
    let outcome = retry(policy, move |_| async move {
        let html = browser.page_source().await?;
        read_pager(&html).ok_or_else(|| StepError::not_ready("pager placeholder"))
    })
    .await;

    match outcome {
        Ok(pager) => Ok(Some(pager)),
        Err(failure) => {
            failure.fatal()?;
            Ok(None)
        }
    }
}
