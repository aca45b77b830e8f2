use std::{
    collections::HashSet,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use rand::seq::SliceRandom;

use crate::{configuration::ProxySettings, error::ScoutError};

/// `host:port` gets an `http://` scheme; blank and `#` lines are dropped.
pub fn normalize_proxy(raw: &str) -> Option<String> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    match line.contains("://") {
        true => Some(line.to_string()),
        false => Some(format!("http://{}", line)),
    }
}

fn read_proxy_file(path: &Path) -> Result<Vec<String>, ScoutError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content.lines().filter_map(normalize_proxy).collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(vec![]),
        Err(e) => Err(e.into()),
    }
}

/// Egress proxies handed out one per concurrent unit. A proxy that fails its
/// probe goes on the deny list for good.
#[derive(Debug)]
pub struct ProxyPool {
    candidates: Vec<String>,
    denied: HashSet<String>,
    in_use: HashSet<String>,
    deny_list_file: PathBuf,
    probe_url: String,
    probe_timeout: Duration,
}

impl ProxyPool {
    pub fn new(candidates: Vec<String>, settings: &ProxySettings) -> Result<Self, ScoutError> {
        let denied: HashSet<String> = read_proxy_file(&settings.deny_list_file)?
            .into_iter()
            .collect();
        let candidates: Vec<String> = candidates
            .into_iter()
            .filter(|proxy| !denied.contains(proxy))
            .collect();

        log::info!(
            "Proxy pool: {} candidates, {} denied",
            candidates.len(),
            denied.len()
        );
        Ok(ProxyPool {
            candidates,
            denied,
            in_use: HashSet::new(),
            deny_list_file: settings.deny_list_file.clone(),
            probe_url: settings.probe_url.clone(),
            probe_timeout: Duration::from_secs(settings.probe_timeout_secs),
        })
    }

    pub fn load(list_file: &Path, settings: &ProxySettings) -> Result<Self, ScoutError> {
        let candidates = std::fs::read_to_string(list_file)?
            .lines()
            .filter_map(normalize_proxy)
            .collect();
        ProxyPool::new(candidates, settings)
    }

    pub fn available(&self) -> usize {
        self.candidates
            .iter()
            .filter(|p| !self.denied.contains(*p) && !self.in_use.contains(*p))
            .count()
    }

    fn pick(&self) -> Option<String> {
        let free: Vec<&String> = self
            .candidates
            .iter()
            .filter(|p| !self.denied.contains(*p) && !self.in_use.contains(*p))
            .collect();
        free.choose(&mut rand::thread_rng()).map(|p| p.to_string())
    }

    /// A random free proxy that passes its probe, held until `release`.
    pub async fn acquire(&mut self) -> Result<String, ScoutError> {
        while let Some(proxy) = self.pick() {
            if self.probe(&proxy).await {
                log::info!("Using proxy {}", proxy);
                self.in_use.insert(proxy.clone());
                return Ok(proxy);
            }
            self.deny(&proxy);
        }
        Err(ScoutError::NoProxyAvailable(format!(
            "{} candidates, {} denied, {} in use",
            self.candidates.len(),
            self.denied.len(),
            self.in_use.len()
        )))
    }

    pub fn release(&mut self, proxy: &str) {
        self.in_use.remove(proxy);
    }

    async fn probe(&self, proxy: &str) -> bool {
        let client = reqwest::Proxy::all(proxy).and_then(|proxy| {
            reqwest::Client::builder()
                .proxy(proxy)
                .timeout(self.probe_timeout)
                .user_agent(fake_user_agent::get_rua())
                .build()
        });
        let client = match client {
            Ok(client) => client,
            Err(e) => {
                log::warn!("Unusable proxy {}: {}", proxy, e);
                return false;
            }
        };

        match client.get(&self.probe_url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let alive = (200..400).contains(&status);
                if !alive {
                    log::warn!("Proxy {} answered {}", proxy, status);
                }
                alive
            }
            Err(e) => {
                log::warn!("Proxy {} failed its probe: {}", proxy, e);
                false
            }
        }
    }

    fn deny(&mut self, proxy: &str) {
        self.denied.insert(proxy.to_string());
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.deny_list_file)
            .and_then(|mut file| writeln!(file, "{}", proxy));
        if let Err(e) = appended {
            log::error!(
                "Could not persist {} to {}: {}",
                proxy,
                self.deny_list_file.display(),
                e
            );
        }
    }
}
