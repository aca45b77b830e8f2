use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{json, Value};
use thirtyfour::{
    components::SelectElement, error::WebDriverError, extensions::cdp::ChromeDevTools, By,
    CapabilitiesHelper, ChromiumLikeCapabilities, DesiredCapabilities, Proxy, WebDriver,
};
use tokio::time::{sleep, Instant};

use super::scripts;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(thiserror::Error, Debug)]
pub enum BrowserError {
    #[error("webdriver: {0}")]
    WebDriver(#[from] WebDriverError),
    #[error("element not found: {0}")]
    NoSuchElement(String),
    #[error("script failed: {0}")]
    Script(String),
    #[error("session lost: {0}")]
    SessionLost(String),
}

impl BrowserError {
    /// Session-level faults the worker must see. Everything else is a transient UI fault.
    pub fn is_fatal(&self) -> bool {
        match self {
            BrowserError::SessionLost(_) => true,
            BrowserError::WebDriver(e) => {
                let msg = e.to_string().to_lowercase();
                [
                    "invalid session id",
                    "no such window",
                    "session deleted",
                    "chrome not reachable",
                    "disconnected",
                    "connection refused",
                ]
                .iter()
                .any(|marker| msg.contains(marker))
            }
            BrowserError::NoSuchElement(_) | BrowserError::Script(_) => false,
        }
    }
}

/// Absorbs transient faults into `None` while letting fatal ones through.
pub trait Soften<T> {
    fn soft(self) -> Result<Option<T>, BrowserError>;
}

impl<T> Soften<T> for Result<T, BrowserError> {
    fn soft(self) -> Result<Option<T>, BrowserError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                log::debug!("Transient browser fault: {}", e);
                Ok(None)
            }
        }
    }
}

/// The live document of one session, driven through CSS selectors and scripts.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;
    async fn current_url(&self) -> Result<String, BrowserError>;
    async fn page_source(&self) -> Result<String, BrowserError>;
    async fn is_present(&self, selector: &str) -> Result<bool, BrowserError>;
    async fn is_visible(&self, selector: &str) -> Result<bool, BrowserError>;
    async fn click(&self, selector: &str) -> Result<(), BrowserError>;
    async fn clear(&self, selector: &str) -> Result<(), BrowserError>;
    async fn send_keys(&self, selector: &str, text: &str) -> Result<(), BrowserError>;
    async fn select_by_value(&self, selector: &str, value: &str) -> Result<(), BrowserError>;
    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError>;
    async fn execute_async(&self, script: &str, args: Vec<Value>)
        -> Result<Value, BrowserError>;
    /// Accepts a pending JS alert. Returns false when none was open.
    async fn accept_alert(&self) -> Result<bool, BrowserError>;
    async fn history_back(&self) -> Result<(), BrowserError>;
    async fn set_download_dir(&self, dir: &Path) -> Result<(), BrowserError>;
    async fn cookies(&self) -> Result<Vec<(String, String)>, BrowserError>;

    async fn user_agent(&self) -> Result<String, BrowserError> {
        let value = self.execute(scripts::NAVIGATOR_USER_AGENT, vec![]).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

pub async fn wait_for_element<B: Browser + ?Sized>(
    browser: &B,
    selector: &str,
    timeout: Duration,
) -> Result<bool, BrowserError> {
    let deadline = Instant::now() + timeout;
    loop {
        if browser.is_present(selector).await.soft()? == Some(true) {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(POLL_INTERVAL).await;
    }
}

pub async fn wait_for_visible<B: Browser + ?Sized>(
    browser: &B,
    selector: &str,
    timeout: Duration,
) -> Result<bool, BrowserError> {
    let deadline = Instant::now() + timeout;
    loop {
        if browser.is_visible(selector).await.soft()? == Some(true) {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Best-effort: a missing alert is the normal case.
pub async fn dismiss_any_alert<B: Browser + ?Sized>(browser: &B) -> Result<(), BrowserError> {
    if let Some(true) = browser.accept_alert().await.soft()? {
        log::debug!("Accepted stray alert");
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub webdriver_url: String,
    pub headless: bool,
    pub proxy: Option<String>,
    pub download_dir: PathBuf,
}

pub struct Droid {
    pub driver: WebDriver,
}

impl Droid {
    pub async fn launch(options: &SessionOptions) -> Result<Self, BrowserError> {
        let mut caps = DesiredCapabilities::chrome();

        if options.headless {
            caps.set_headless()?;
        }
        caps.add_arg("--window-size=1600,1000")?;
        caps.add_arg("--lang=en")?;
        caps.add_experimental_option(
            "prefs",
            json!({
                "download.default_directory": options.download_dir.to_string_lossy(),
                "download.prompt_for_download": false,
                "plugins.always_open_pdf_externally": true,
            }),
        )?;

        if let Some(proxy_url) = &options.proxy {
            let proxy = Proxy::Manual {
                ftp_proxy: None,
                http_proxy: Some(proxy_url.clone()),
                ssl_proxy: Some(proxy_url.clone()),
                socks_proxy: None,
                socks_version: None,
                socks_username: None,
                socks_password: None,
                no_proxy: Some("127.0.0.1,localhost".to_string()),
            };
            caps.set_proxy(proxy)?;
        }

        let driver = WebDriver::new(&options.webdriver_url, caps).await?;
        if !options.headless {
            driver.maximize_window().await?;
        }

        log::info!(
            "Browser session started (proxy: {})",
            options.proxy.as_deref().unwrap_or("direct")
        );

        Ok(Droid { driver })
    }

    pub async fn quit(self) {
        if let Err(e) = self.driver.quit().await {
            log::warn!("Failed to quit browser session cleanly: {}", e);
        }
    }
}

#[async_trait]
impl Browser for Droid {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        Ok(self.driver.goto(url).await?)
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.driver.current_url().await?.to_string())
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        Ok(self.driver.source().await?)
    }

    async fn is_present(&self, selector: &str) -> Result<bool, BrowserError> {
        Ok(!self.driver.find_all(By::Css(selector)).await?.is_empty())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool, BrowserError> {
        for element in self.driver.find_all(By::Css(selector)).await? {
            if element.is_displayed().await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let element = self
            .driver
            .find(By::Css(selector))
            .await
            .map_err(|_| BrowserError::NoSuchElement(selector.to_string()))?;
        Ok(element.click().await?)
    }

    async fn clear(&self, selector: &str) -> Result<(), BrowserError> {
        let element = self
            .driver
            .find(By::Css(selector))
            .await
            .map_err(|_| BrowserError::NoSuchElement(selector.to_string()))?;
        Ok(element.clear().await?)
    }

    async fn send_keys(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        let element = self
            .driver
            .find(By::Css(selector))
            .await
            .map_err(|_| BrowserError::NoSuchElement(selector.to_string()))?;
        Ok(element.send_keys(text).await?)
    }

    async fn select_by_value(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let element = self
            .driver
            .find(By::Css(selector))
            .await
            .map_err(|_| BrowserError::NoSuchElement(selector.to_string()))?;
        let select = SelectElement::new(&element).await?;
        Ok(select.select_by_value(value).await?)
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError> {
        let ret = self.driver.execute(script, args).await?;
        Ok(ret.json().clone())
    }

    async fn execute_async(
        &self,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value, BrowserError> {
        let ret = self.driver.execute_async(script, args).await?;
        Ok(ret.json().clone())
    }

    async fn accept_alert(&self) -> Result<bool, BrowserError> {
        match self.driver.accept_alert().await {
            Ok(()) => Ok(true),
            Err(e) => {
                let err = BrowserError::from(e);
                if err.is_fatal() {
                    Err(err)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn history_back(&self) -> Result<(), BrowserError> {
        Ok(self.driver.back().await?)
    }

    async fn set_download_dir(&self, dir: &Path) -> Result<(), BrowserError> {
        let dev_tools = ChromeDevTools::new(self.driver.handle.clone());
        dev_tools
            .execute_cdp_with_params(
                "Page.setDownloadBehavior",
                json!({
                    "behavior": "allow",
                    "downloadPath": dir.to_string_lossy(),
                }),
            )
            .await?;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<(String, String)>, BrowserError> {
        Ok(self
            .driver
            .get_all_cookies()
            .await?
            .into_iter()
            .map(|c| (c.name, c.value))
            .collect())
    }
}
