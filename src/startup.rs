use std::{collections::VecDeque, future::Future, path::PathBuf, sync::Arc};

use tokio::{task::JoinSet, time::sleep};

use crate::{
    configuration::{PipelineOptions, Settings},
    dal::{artifact_db, keyword_db, tracking_db::TrackingLedger},
    domain::{KeywordResult, KeywordRunSummary, SearchTerm},
    error::ScoutError,
    services::{
        Browser, BrowserError, DocumentCollector, Droid, KeywordScraper, ProxyPool, SessionOptions,
    },
};

fn failed_result(group: &str, term: &SearchTerm, error: String) -> KeywordResult {
    KeywordResult {
        summary: KeywordRunSummary::failed(group, term, error),
        ..Default::default()
    }
}

/// Tracking ledger and group results of one run, flushed after every keyword.
struct GroupProgress {
    out_dir: PathBuf,
    group: String,
    ledger: TrackingLedger,
    results: Vec<KeywordResult>,
}

impl GroupProgress {
    fn open(out_dir: PathBuf, group: &str) -> Result<Self, ScoutError> {
        let ledger = TrackingLedger::open(&out_dir, group)?;
        let results = artifact_db::read_group_results(&out_dir, group)?;
        Ok(GroupProgress {
            out_dir,
            group: group.to_string(),
            ledger,
            results,
        })
    }

    fn pending(&self, keywords: Vec<SearchTerm>) -> Vec<SearchTerm> {
        keywords
            .into_iter()
            .filter(|term| !self.ledger.is_done(term))
            .collect()
    }

    fn complete(&mut self, result: KeywordResult) -> Result<(), ScoutError> {
        if let Some(error) = &result.summary.error {
            log::warn!("[{}] Finished with error: {}", result.summary.keyword, error);
        }

        self.ledger.record(result.summary.clone());
        self.results.retain(|r| r.summary.keyword != result.summary.keyword);
        self.results.push(result);

        self.ledger.flush()?;
        artifact_db::write_group_results(&self.out_dir, &self.group, &self.results)
    }
}

/// What every unit of work needs, shared between concurrent units.
#[derive(Clone)]
struct Worker {
    settings: Arc<Settings>,
    options: Arc<PipelineOptions>,
    collector: Arc<DocumentCollector>,
    out_dir: PathBuf,
    group: String,
}

impl Worker {
    /// A fresh session parked on the search page.
    async fn open_session(&self, proxy: Option<String>) -> Result<Droid, BrowserError> {
        let droid = Droid::launch(&SessionOptions {
            webdriver_url: self.settings.application.webdriver_url.clone(),
            headless: self.settings.application.headless,
            proxy,
            download_dir: self.out_dir.join("pdf").join(&self.group),
        })
        .await?;

        if let Err(e) = droid.goto(&self.options.search_url).await {
            droid.quit().await;
            return Err(e);
        }
        sleep(self.settings.initial_settle_delay()).await;
        Ok(droid)
    }

    async fn scrape(
        &self,
        browser: &dyn Browser,
        term: &SearchTerm,
    ) -> Result<KeywordResult, BrowserError> {
        KeywordScraper::new(
            browser,
            &self.options,
            &self.collector,
            self.out_dir.as_path(),
            &self.group,
        )
        .scrape(term)
        .await
    }

    /// One keyword in its own session, torn down afterwards.
    async fn run_unit(self, proxy: String, term: SearchTerm) -> KeywordResult {
        let droid = match self.open_session(Some(proxy.clone())).await {
            Ok(droid) => droid,
            Err(e) => {
                log::error!("[{}] Could not start session via {}: {}", term, proxy, e);
                return failed_result(&self.group, &term, e.to_string());
            }
        };

        let result = match self.scrape(&droid, &term).await {
            Ok(result) => result,
            Err(e) => {
                log::error!("[{}] Session lost: {}", term, e);
                failed_result(&self.group, &term, e.to_string())
            }
        };
        droid.quit().await;
        result
    }
}

/// Runs every pending keyword of `group`. With a proxy list, keywords run in a
/// sliding window of `batch_size` units, each owning a session and a proxy;
/// otherwise one session works through them in order.
pub async fn run_group(settings: Settings, group: &str) -> Result<(), ScoutError> {
    let out_dir = settings.application.output_dir.clone();
    std::fs::create_dir_all(&out_dir)?;

    let keywords = keyword_db::load_keywords(&settings.application.keywords_dir, group)?;
    let mut progress = GroupProgress::open(out_dir.clone(), group)?;
    let pending = progress.pending(keywords);
    if pending.is_empty() {
        log::info!("Group {} has nothing left to scrape", group);
        return Ok(());
    }
    log::info!("Group {}: {} keywords pending", group, pending.len());

    let options = settings.pipeline_options();
    let worker = Worker {
        collector: Arc::new(DocumentCollector::from_options(&options)),
        options: Arc::new(options),
        settings: Arc::new(settings),
        out_dir,
        group: group.to_string(),
    };

    match worker.settings.proxy.list_file.clone() {
        Some(list_file) => {
            let pool = ProxyPool::load(&list_file, &worker.settings.proxy)?;
            let batch_size = worker.settings.application.batch_size;
            run_pooled(group, pool, batch_size, pending, &mut progress, move |proxy, term| {
                worker.clone().run_unit(proxy, term)
            })
            .await
        }
        None => run_sequential(worker, pending, &mut progress).await,
    }
}

/// Sliding window over `pending`: a keyword starts only once a proxy is free,
/// and is recorded as failed only when nothing is running and every proxy
/// has been denied.
async fn run_pooled<F, Fut>(
    group: &str,
    mut pool: ProxyPool,
    batch_size: usize,
    pending: Vec<SearchTerm>,
    progress: &mut GroupProgress,
    run_unit: F,
) -> Result<(), ScoutError>
where
    F: Fn(String, SearchTerm) -> Fut,
    Fut: Future<Output = KeywordResult> + Send + 'static,
{
    let batch_size = batch_size.max(1);
    let mut queue: VecDeque<SearchTerm> = pending.into();
    let mut running = JoinSet::new();

    loop {
        while running.len() < batch_size && pool.available() > 0 {
            let Some(term) = queue.pop_front() else {
                break;
            };
            match pool.acquire().await {
                Ok(proxy) => {
                    // Own task, so a panicking unit still hands its proxy back.
                    let unit = tokio::spawn(run_unit(proxy.clone(), term.clone()));
                    running.spawn(async move { (proxy, term, unit.await) });
                }
                Err(e) => {
                    log::warn!("[{}] Waiting for a free proxy: {}", term, e);
                    queue.push_front(term);
                    break;
                }
            }
        }

        if running.is_empty() {
            while let Some(term) = queue.pop_front() {
                let error = ScoutError::NoProxyAvailable("every proxy has been denied".to_string());
                log::error!("[{}] {}", term, error);
                progress.complete(failed_result(group, &term, error.to_string()))?;
            }
            break;
        }

        match running.join_next().await {
            Some(Ok((proxy, term, outcome))) => {
                pool.release(&proxy);
                match outcome {
                    Ok(result) => progress.complete(result)?,
                    // The keyword stays untracked and is picked up by the next run.
                    Err(e) => log::error!("[{}] {}", term, ScoutError::Worker(e.to_string())),
                }
            }
            Some(Err(e)) => log::error!("{}", ScoutError::Worker(e.to_string())),
            None => break,
        }
    }
    Ok(())
}

async fn run_sequential(
    worker: Worker,
    pending: Vec<SearchTerm>,
    progress: &mut GroupProgress,
) -> Result<(), ScoutError> {
    let proxy = worker.settings.proxy.url.clone();
    let mut session: Option<Droid> = None;

    for term in pending {
        if session.is_none() {
            match worker.open_session(proxy.clone()).await {
                Ok(droid) => session = Some(droid),
                Err(e) => {
                    log::error!("[{}] Could not start session: {}", term, e);
                    progress.complete(failed_result(&worker.group, &term, e.to_string()))?;
                    continue;
                }
            }
        }
        let Some(droid) = session.as_ref() else {
            continue;
        };

        match worker.scrape(droid, &term).await {
            Ok(result) => progress.complete(result)?,
            Err(e) => {
                log::error!("[{}] Session lost, starting a new one: {}", term, e);
                progress.complete(failed_result(&worker.group, &term, e.to_string()))?;
                if let Some(droid) = session.take() {
                    droid.quit().await;
                }
            }
        }
    }

    if let Some(droid) = session {
        droid.quit().await;
    }
    Ok(())
}
