use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::domain::PageState;

use super::{classify, Browser, BrowserError};

pub const CHALLENGE_POLL: Duration = Duration::from_secs(1);

pub async fn is_blocked(browser: &dyn Browser) -> Result<bool, BrowserError> {
    Ok(classify(browser).await? == PageState::InterstitialChallenge)
}

/// Waits while an interstitial challenge is showing. `Ok(false)` means it was
/// still up when `max_wait` ran out; the caller decides what that costs.
pub async fn await_clear(browser: &dyn Browser, max_wait: Duration) -> Result<bool, BrowserError> {
    let started = Instant::now();
    let deadline = started + max_wait;
    let mut announced = false;

    loop {
        if !is_blocked(browser).await? {
            if announced {
                log::info!("Challenge cleared after {:?}", started.elapsed());
            }
            return Ok(true);
        }
        if !announced {
            log::warn!("Challenge detected, waiting up to {:?}", max_wait);
            announced = true;
        }
        if Instant::now() >= deadline {
            log::warn!("Challenge still present after {:?}", max_wait);
            return Ok(false);
        }
        sleep(CHALLENGE_POLL.min(deadline - Instant::now())).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::await_clear;
    use crate::test_support::{FakeRegistry, View};

    #[tokio::test(start_paused = true)]
    async fn await_clear_times_out_at_budget() {
        let site = FakeRegistry::with_pages(vec![vec![("100", "ACME INC")]]);
        site.set_view(View::Results);
        site.set_challenge(u32::MAX);

        let start = Instant::now();
        let cleared = await_clear(&site, Duration::from_secs(5)).await.unwrap();

        assert!(!cleared);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn await_clear_returns_once_challenge_lifts() {
        let site = FakeRegistry::with_pages(vec![vec![("100", "ACME INC")]]);
        site.set_view(View::Results);
        site.set_challenge(3);

        let start = Instant::now();
        assert!(await_clear(&site, Duration::from_secs(60)).await.unwrap());
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn await_clear_without_challenge_is_immediate() {
        let site = FakeRegistry::with_pages(vec![]);

        let start = Instant::now();
        assert!(await_clear(&site, Duration::from_secs(30)).await.unwrap());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
