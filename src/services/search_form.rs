use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;

use crate::{configuration::PipelineOptions, domain::SearchTerm};

use super::{
    dismiss_any_alert, retry, scripts, wait_for_element, Browser, BrowserError, FailureKind,
    Soften,
};

pub const SEARCH_INPUT: &str = "#txtOrgname";
pub const MATCH_MODE_SELECT: &str = "#ddlSelection";
pub const SEARCH_BUTTON: &str = "#btnSearch";
pub const RETURN_TO_SEARCH: &str = "#btnReturnToSearch";

/// "Starts With" in the match-mode dropdown.
const STARTS_WITH: &str = "3";
const FORM_WAIT: Duration = Duration::from_secs(10);

/// Brings the session to the search form: already there, via the results
/// page's return control, or by reloading the search URL.
pub async fn ensure_search_form(
    browser: &dyn Browser,
    options: &PipelineOptions,
) -> Result<bool, BrowserError> {
    if browser.is_present(SEARCH_INPUT).await.soft()? == Some(true) {
        return Ok(true);
    }

    if browser.is_present(RETURN_TO_SEARCH).await.soft()? == Some(true) {
        log::debug!("Returning to the search form from the results grid");
        if browser.click(RETURN_TO_SEARCH).await.soft()?.is_some()
            && wait_for_element(browser, SEARCH_INPUT, FORM_WAIT).await?
        {
            return Ok(true);
        }
    }

    log::debug!("Reloading {}", options.search_url);
    if browser.goto(&options.search_url).await.soft()?.is_none() {
        return Ok(false);
    }
    sleep(Duration::from_secs(2)).await;
    wait_for_element(browser, SEARCH_INPUT, FORM_WAIT).await
}

async fn clear_search_input(browser: &dyn Browser) -> Result<(), BrowserError> {
    match browser.clear(SEARCH_INPUT).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            log::debug!("Native clear failed ({}), clearing via script", e);
            browser
                .execute(scripts::CLEAR_INPUT, vec![json!(SEARCH_INPUT)])
                .await?;
            Ok(())
        }
    }
}

async fn fill_and_submit(browser: &dyn Browser, term: &SearchTerm) -> Result<(), BrowserError> {
    clear_search_input(browser).await?;
    browser.select_by_value(MATCH_MODE_SELECT, STARTS_WITH).await?;
    browser.send_keys(SEARCH_INPUT, term.as_str()).await?;
    browser.click(SEARCH_BUTTON).await?;
    dismiss_any_alert(browser).await
}

/// Fills and submits the search form. `Ok(false)` once the attempt budget is
/// spent; the term is then recorded as failed and not retried this run.
pub async fn submit_search(
    browser: &dyn Browser,
    term: &SearchTerm,
    options: &PipelineOptions,
) -> Result<bool, BrowserError> {
    let outcome = retry(&options.form_retry, move |attempt| async move {
        if attempt > 1 {
            ensure_search_form(browser, options).await?;
        }
        fill_and_submit(browser, term).await
    })
    .await;

    match outcome {
        Ok(()) => Ok(true),
        Err(FailureKind::Aborted(e)) => Err(e),
        Err(FailureKind::Exhausted { attempts, last }) => {
            log::error!(
                "[{}] Giving up on the search form after {} attempts: {}",
                term,
                attempts,
                last
            );
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::{ensure_search_form, submit_search};
    use crate::{
        configuration::PipelineOptions,
        domain::SearchTerm,
        test_support::{FakeRegistry, View},
    };

    fn term() -> SearchTerm {
        SearchTerm::parse("ACME").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn submit_search_gives_up_after_three_attempts() {
        let site = FakeRegistry::with_pages(vec![vec![("100", "ACME INC")]]);
        site.fail_search_clicks(10);
        let start = Instant::now();

        let submitted = submit_search(&site, &term(), &PipelineOptions::default())
            .await
            .unwrap();

        assert!(!submitted);
        assert_eq!(site.count("click:#btnSearch"), 3);
        assert_eq!(site.view(), View::Search);
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn submit_search_recovers_from_one_failure() {
        let site = FakeRegistry::with_pages(vec![vec![("100", "ACME INC")]]);
        site.fail_search_clicks(1);

        let submitted = submit_search(&site, &term(), &PipelineOptions::default())
            .await
            .unwrap();

        assert!(submitted);
        assert_eq!(site.count("click:#btnSearch"), 2);
        assert_eq!(site.view(), View::Results);
        assert_eq!(site.typed(), "ACME");
        assert_eq!(site.count("select:#ddlSelection=3"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_search_propagates_lost_session() {
        let site = FakeRegistry::with_pages(vec![]);
        site.lose_session();

        assert!(submit_search(&site, &term(), &PipelineOptions::default())
            .await
            .is_err());
        assert_eq!(site.count("clear:#txtOrgname"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ensure_search_form_uses_return_control() {
        let site = FakeRegistry::with_pages(vec![vec![("100", "ACME INC")]]);
        site.set_view(View::Results);

        assert!(ensure_search_form(&site, &PipelineOptions::default())
            .await
            .unwrap());
        assert_eq!(site.count("click:#btnReturnToSearch"), 1);
        assert_eq!(site.view(), View::Search);
    }

    #[tokio::test(start_paused = true)]
    async fn ensure_search_form_reloads_from_elsewhere() {
        let site = FakeRegistry::with_pages(vec![]);
        site.set_view(View::Blank);

        assert!(ensure_search_form(&site, &PipelineOptions::default())
            .await
            .unwrap());
        assert_eq!(site.count("goto:https://ccfs.sos.wa.gov/#/AdvancedSearch"), 1);
    }
}
