use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::{configuration::PipelineOptions, domain::PageState};

use super::{await_clear, classify, scripts, Browser, BrowserError, Soften, MODAL_SELECTOR};

const MODAL_POLL: Duration = Duration::from_millis(500);

/// Closes the document overlay if one is showing, then strips any backdrop
/// left behind.
pub async fn close_modal(browser: &dyn Browser, options: &PipelineOptions) -> Result<(), BrowserError> {
    let deadline = Instant::now() + options.modal_close_wait;

    while browser.is_visible(MODAL_SELECTOR).await.soft()? == Some(true) {
        if Instant::now() >= deadline {
            log::warn!("Modal still open after {:?}", options.modal_close_wait);
            break;
        }
        browser.execute(scripts::CLOSE_MODAL, vec![]).await.soft()?;
        sleep(MODAL_POLL).await;
    }

    browser
        .execute(scripts::CLEAR_MODAL_BACKDROP, vec![])
        .await
        .soft()?;
    Ok(())
}

/// What to do from each state to move one step closer to the results grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackControl {
    Arrived,
    Overshot,
    CloseModal,
    AwaitChallenge,
    /// First present selector wins; history back when none is.
    Controls(&'static [&'static str]),
    /// Filing tab to detail; `btn-back` there jumps to the grid.
    BusinessInformation,
    HistoryBack,
}

const FILING_BACK_CONTROLS: &[&str] = &[
    "button[ng-click*='BusinessInformation']",
    "a[ng-click*='BusinessInformation']",
    "button[ng-click*='showBusineInfo']",
    "a[ng-click*='showBusineInfo']",
];

const DETAIL_BACK_CONTROLS: &[&str] = &["button.btn-back"];

fn back_control(state: PageState) -> BackControl {
    match state {
        PageState::ResultsGrid => BackControl::Arrived,
        PageState::SearchForm => BackControl::Overshot,
        PageState::DocumentModal => BackControl::CloseModal,
        PageState::InterstitialChallenge => BackControl::AwaitChallenge,
        PageState::FilingHistory => BackControl::BusinessInformation,
        PageState::DetailView => BackControl::Controls(DETAIL_BACK_CONTROLS),
        PageState::Unknown => BackControl::HistoryBack,
    }
}

pub(crate) async fn click_first_present(
    browser: &dyn Browser,
    selectors: &[&str],
) -> Result<bool, BrowserError> {
    for selector in selectors {
        if browser.is_present(selector).await.soft()? != Some(true) {
            continue;
        }
        if browser.click(selector).await.soft()?.is_some() {
            log::debug!("Clicked back control {}", selector);
            return Ok(true);
        }
    }
    Ok(false)
}

/// From the filing tab to the entity's detail view: the bound controls first,
/// then anything labelled "Business Information".
pub(crate) async fn click_business_information(browser: &dyn Browser) -> Result<bool, BrowserError> {
    if click_first_present(browser, FILING_BACK_CONTROLS).await? {
        return Ok(true);
    }
    let clicked = browser
        .execute(scripts::CLICK_BUSINESS_INFORMATION, vec![])
        .await
        .soft()?
        == Some(serde_json::Value::Bool(true));
    if clicked {
        log::debug!("Clicked the Business Information label");
    }
    Ok(clicked)
}

/// Polls until the page leaves `from` for a recognisable state.
async fn await_transition(
    browser: &dyn Browser,
    from: PageState,
    max_wait: Duration,
) -> Result<PageState, BrowserError> {
    let deadline = Instant::now() + max_wait;
    loop {
        let state = classify(browser).await?;
        if (state != from && state != PageState::Unknown) || Instant::now() >= deadline {
            return Ok(state);
        }
        sleep(MODAL_POLL).await;
    }
}

async fn step_back(
    browser: &dyn Browser,
    control: BackControl,
    options: &PipelineOptions,
) -> Result<(), BrowserError> {
    match control {
        BackControl::Arrived | BackControl::Overshot => {}
        BackControl::CloseModal => close_modal(browser, options).await?,
        BackControl::AwaitChallenge => {
            await_clear(browser, options.challenge_wait_budget).await?;
        }
        BackControl::Controls(selectors) => {
            if !click_first_present(browser, selectors).await? {
                log::debug!("No back control present, using history");
                browser.history_back().await.soft()?;
            }
        }
        BackControl::BusinessInformation => {
            if !click_business_information(browser).await? {
                log::debug!("No Business Information control, using history");
                browser.history_back().await.soft()?;
            }
        }
        BackControl::HistoryBack => {
            browser.history_back().await.soft()?;
        }
    }
    Ok(())
}

/// Walks back to the results grid in at most `return_max_steps` steps.
/// Reaching the search form stops the walk and reports `false`; going further
/// back would leave the keyword's workflow entirely.
pub async fn return_to_results(
    browser: &dyn Browser,
    options: &PipelineOptions,
) -> Result<bool, BrowserError> {
    close_modal(browser, options).await?;

    let mut state = classify(browser).await?;
    for step in 1..=options.return_max_steps {
        let control = back_control(state);
        match control {
            BackControl::Arrived => return Ok(true),
            BackControl::Overshot => {
                log::warn!("Return overshot to the search form at step {}", step);
                return Ok(false);
            }
            _ => log::debug!("Return step {} from {:?}", step, state),
        }

        step_back(browser, control, options).await?;
        state = await_transition(browser, state, options.return_poll).await?;

        if !await_clear(browser, options.challenge_wait_budget).await? {
            log::warn!("Challenge blocked the return to results");
            return Ok(false);
        }
    }

    let arrived = classify(browser).await? == PageState::ResultsGrid;
    if !arrived {
        log::warn!(
            "Could not reach the results grid within {} steps",
            options.return_max_steps
        );
    }
    Ok(arrived)
}
